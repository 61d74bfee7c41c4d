//! TCP transport — framed message exchange with storage and key manager.
//!
//! Every message on every connection is a 16-byte header followed by exactly
//! `data_size` payload bytes. The header is read first and sized reads do
//! the rest; nothing is scanned or delimited.

use anyhow::{bail, Context, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use zerocopy::{AsBytes, FromBytes};

use sealstore_core::wire::{MessageHeader, MessageType, MESSAGE_HEADER_SIZE};

/// Upper bound on a single message payload. A header claiming more than
/// this is treated as a framing error rather than an allocation request.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// One parsed inbound message.
#[derive(Debug)]
pub struct Message {
    pub client_id: u32,
    pub message_type: MessageType,
    pub item_count: u32,
    pub payload: Bytes,
}

/// A framed connection to the storage server or the key manager.
pub struct Connection {
    stream: TcpStream,
    peer: String,
    client_id: u32,
}

impl Connection {
    /// Open a TCP connection to `host:port`.
    pub async fn connect(host: &str, port: u16, client_id: u32) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let stream = TcpStream::connect(&peer)
            .await
            .with_context(|| format!("failed to connect to {peer}"))?;
        stream.set_nodelay(true).ok();
        tracing::debug!(%peer, client_id, "connected");
        Ok(Self {
            stream,
            peer,
            client_id,
        })
    }

    /// Wrap an accepted stream. Used by in-process test servers.
    pub fn from_stream(stream: TcpStream, client_id: u32) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            stream,
            peer,
            client_id,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one message: header, then payload.
    pub async fn send(
        &mut self,
        message_type: MessageType,
        item_count: u32,
        payload: &[u8],
    ) -> Result<()> {
        let header = MessageHeader::new(
            self.client_id,
            message_type,
            item_count,
            payload.len() as u32,
        );
        self.stream
            .write_all(header.as_bytes())
            .await
            .with_context(|| format!("failed to send header to {}", self.peer))?;
        if !payload.is_empty() {
            self.stream
                .write_all(payload)
                .await
                .with_context(|| format!("failed to send payload to {}", self.peer))?;
        }
        Ok(())
    }

    /// Receive one message, sized by its header.
    pub async fn recv(&mut self) -> Result<Message> {
        let mut header_bytes = [0u8; MESSAGE_HEADER_SIZE];
        self.stream
            .read_exact(&mut header_bytes)
            .await
            .with_context(|| format!("connection to {} closed mid-header", self.peer))?;
        let header = MessageHeader::read_from(&header_bytes[..])
            .with_context(|| format!("peer {} sent a malformed header", self.peer))?;

        let message_type = MessageType::try_from(header.message_type)
            .with_context(|| format!("peer {} sent an unroutable message", self.peer))?;

        let data_size = header.data_size as usize;
        if data_size > MAX_MESSAGE_SIZE {
            bail!(
                "peer {} announced a {data_size}-byte payload, refusing to read it",
                self.peer
            );
        }
        let mut payload = BytesMut::zeroed(data_size);
        self.stream
            .read_exact(&mut payload)
            .await
            .with_context(|| format!("connection to {} closed mid-payload", self.peer))?;

        Ok(Message {
            client_id: header.client_id,
            message_type,
            item_count: header.item_count,
            payload: payload.freeze(),
        })
    }

    /// Flush and close the write half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .with_context(|| format!("failed to close connection to {}", self.peer))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

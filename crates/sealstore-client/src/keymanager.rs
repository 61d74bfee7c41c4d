//! Key manager client — batched key-generation round trips.
//!
//! One request carries `item_count` fixed-size blocks; the reply must be a
//! KeyGenReply carrying exactly as many blocks of the same size, positionally
//! aligned with the request. Anything else on the wire is fatal.

use anyhow::{bail, Context, Result};
use bytes::Bytes;

use sealstore_core::wire::MessageType;

use crate::transport::Connection;

pub struct KeyManagerClient {
    conn: Connection,
    block_size: usize,
}

impl KeyManagerClient {
    /// Connect with the block size this strategy's requests and replies use.
    pub async fn connect(
        host: &str,
        port: u16,
        client_id: u32,
        block_size: usize,
    ) -> Result<Self> {
        let conn = Connection::connect(host, port, client_id)
            .await
            .context("key manager is unreachable")?;
        Ok(Self { conn, block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// One blocking round trip: `count` request blocks out, `count` reply
    /// blocks back.
    pub async fn key_gen(&mut self, blocks: &[u8], count: u32) -> Result<Bytes> {
        debug_assert_eq!(blocks.len(), count as usize * self.block_size);

        self.conn
            .send(MessageType::KeyGenRequest, count, blocks)
            .await?;
        let reply = self
            .conn
            .recv()
            .await
            .context("key manager closed during key generation")?;

        if reply.message_type != MessageType::KeyGenReply {
            bail!(
                "key manager answered {:?} to a key-gen request",
                reply.message_type
            );
        }
        if reply.item_count != count {
            bail!(
                "key manager returned {} blocks for a {count}-block request",
                reply.item_count
            );
        }
        let expected = count as usize * self.block_size;
        if reply.payload.len() != expected {
            bail!(
                "key-gen reply payload is {} bytes, expected {expected}",
                reply.payload.len()
            );
        }
        Ok(reply.payload)
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.conn.shutdown().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

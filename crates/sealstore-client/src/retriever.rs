//! Download worker — streams ciphertext batches from storage and restores
//! plaintext in order.
//!
//! Keys come back from the local recipe strictly front to back; the chunk
//! at stream position i is opened with the key at recipe position i. The
//! stored file header's counters are checked after the final batch, and a
//! mismatch fails the restore.

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;
use zerocopy::{AsBytes, FromBytes};

use sealstore_core::batch::chunk_entries;
use sealstore_core::crypto::decrypt_chunk;
use sealstore_core::recipe::KeyRecipeReader;
use sealstore_core::wire::{FileRecipeHeader, MessageType, HASH_SIZE};

use crate::transport::Connection;

/// End-of-run restore counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct DownloadStats {
    pub chunks: u64,
    pub plain_bytes: u64,
    pub cipher_bytes: u64,
    pub batches: u64,
}

pub struct Retriever {
    conn: Connection,
    recipe: Option<KeyRecipeReader>,
    tx: mpsc::Sender<Bytes>,
    stats: DownloadStats,
}

impl Retriever {
    /// `recipe` is None only for plain uploads, which stored chunks as-is.
    pub fn new(conn: Connection, recipe: Option<KeyRecipeReader>, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            conn,
            recipe,
            tx,
            stats: DownloadStats::default(),
        }
    }

    pub async fn run(mut self, file_name_hash: [u8; HASH_SIZE]) -> Result<DownloadStats> {
        let stored = self.login(file_name_hash).await?;
        let expected_chunks = stored.total_chunk_num;
        let expected_bytes = stored.file_size;

        self.conn.send(MessageType::RestoreReady, 0, &[]).await?;

        loop {
            let msg = self.conn.recv().await.context("storage closed mid-restore")?;
            match msg.message_type {
                MessageType::RestoreChunk => self.restore_batch(&msg.payload).await?,
                MessageType::RestoreFinal => {
                    self.restore_batch(&msg.payload).await?;
                    break;
                }
                other => bail!("storage sent {other:?} during restore"),
            }
        }

        if self.stats.chunks != expected_chunks {
            bail!(
                "storage delivered {} chunks, the stored recipe says {expected_chunks}",
                self.stats.chunks
            );
        }
        if self.stats.plain_bytes != expected_bytes {
            bail!(
                "restored {} bytes, the stored recipe says {expected_bytes}",
                self.stats.plain_bytes
            );
        }

        tracing::info!(
            chunks = self.stats.chunks,
            plain_bytes = self.stats.plain_bytes,
            cipher_bytes = self.stats.cipher_bytes,
            batches = self.stats.batches,
            "restore complete"
        );
        Ok(self.stats)
    }

    async fn login(&mut self, file_name_hash: [u8; HASH_SIZE]) -> Result<FileRecipeHeader> {
        let login = FileRecipeHeader {
            file_size: 0,
            total_chunk_num: 0,
            file_name_hash,
        };
        self.conn
            .send(MessageType::LoginDownload, 0, login.as_bytes())
            .await?;
        let reply = self
            .conn
            .recv()
            .await
            .context("storage closed during download login")?;
        match reply.message_type {
            MessageType::LoginResponse => {}
            MessageType::FileNonExistent => bail!(
                "storage has no file for hash {}",
                hex::encode(file_name_hash)
            ),
            other => bail!("storage answered {other:?} to a download login"),
        }
        let stored = FileRecipeHeader::read_from(reply.payload.as_ref())
            .context("download login response did not carry a file recipe header")?;

        let file_size = stored.file_size;
        let total_chunk_num = stored.total_chunk_num;
        tracing::info!(
            file_name_hash = hex::encode(file_name_hash),
            file_size,
            chunks = total_chunk_num,
            "download session open"
        );
        Ok(stored)
    }

    async fn restore_batch(&mut self, payload: &[u8]) -> Result<()> {
        for entry in chunk_entries(payload) {
            let cipher = entry?;
            self.stats.cipher_bytes += cipher.len() as u64;

            let plain = match self.recipe.as_mut() {
                Some(reader) => {
                    let key = reader.next_key()?;
                    decrypt_chunk(&key, cipher)?
                }
                None => cipher.to_vec(),
            };

            self.stats.chunks += 1;
            self.stats.plain_bytes += plain.len() as u64;
            self.tx
                .send(Bytes::from(plain))
                .await
                .map_err(|_| anyhow!("restore writer stopped accepting chunks"))?;
        }
        self.stats.batches += 1;
        Ok(())
    }
}

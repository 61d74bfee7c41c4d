//! Upload worker — seals chunk batches and streams them to storage.
//!
//! Session shape: log in, stream, drain, close. Plaintext accumulates to
//! the chunk batch size so each keyed strategy pays one key manager round
//! trip per batch. Chunk batches and recipe batches fill and flush
//! independently; the local key recipe is appended in the same order the
//! ciphertexts go out, so position pairs them forever.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::sync::mpsc;
use zerocopy::AsBytes;

use sealstore_core::batch::BatchBuffer;
use sealstore_core::crypto::hash;
use sealstore_core::recipe::KeyRecipeWriter;
use sealstore_core::wire::{
    FileRecipeHeader, MessageType, CIPHER_TAG_SIZE, HASH_SIZE, MAX_CHUNK_SIZE,
};

use crate::chunker::WorkItem;
use crate::strategy::KeyDerivation;
use crate::transport::Connection;

/// End-of-run upload counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadStats {
    pub chunks: u64,
    pub plain_bytes: u64,
    pub cipher_bytes: u64,
    pub chunk_batches: u64,
    pub recipe_batches: u64,
    pub keys_written: u64,
}

pub struct Sender {
    conn: Connection,
    strategy: KeyDerivation,
    recipe: Option<KeyRecipeWriter>,
    rx: mpsc::Receiver<WorkItem>,
    batch_items: u32,
    chunk_batch: BatchBuffer,
    recipe_batch: BatchBuffer,
    stats: UploadStats,
}

impl Sender {
    pub fn new(
        conn: Connection,
        strategy: KeyDerivation,
        recipe: Option<KeyRecipeWriter>,
        rx: mpsc::Receiver<WorkItem>,
        chunk_batch_items: u32,
        recipe_batch_items: u32,
    ) -> Self {
        Self {
            conn,
            strategy,
            recipe,
            rx,
            batch_items: chunk_batch_items,
            chunk_batch: BatchBuffer::for_chunks(chunk_batch_items, MAX_CHUNK_SIZE + CIPHER_TAG_SIZE),
            recipe_batch: BatchBuffer::for_records(recipe_batch_items, HASH_SIZE),
            stats: UploadStats::default(),
        }
    }

    pub async fn run(mut self, file_name_hash: [u8; HASH_SIZE]) -> Result<UploadStats> {
        self.login(file_name_hash).await?;
        let final_header = self.stream_chunks().await?;
        self.finish(final_header).await
    }

    async fn login(&mut self, file_name_hash: [u8; HASH_SIZE]) -> Result<()> {
        let login = FileRecipeHeader {
            file_size: 0,
            total_chunk_num: 0,
            file_name_hash,
        };
        self.conn
            .send(MessageType::LoginUpload, 0, login.as_bytes())
            .await?;
        let reply = self
            .conn
            .recv()
            .await
            .context("storage closed during upload login")?;
        if reply.message_type != MessageType::LoginResponse {
            bail!(
                "storage answered {:?} to an upload login",
                reply.message_type
            );
        }
        tracing::info!(
            file_name_hash = hex::encode(file_name_hash),
            strategy = %self.strategy.kind(),
            "upload session open"
        );
        Ok(())
    }

    async fn stream_chunks(&mut self) -> Result<FileRecipeHeader> {
        let mut pending: Vec<Bytes> = Vec::with_capacity(self.batch_items as usize);
        loop {
            match self.rx.recv().await {
                Some(WorkItem::Chunk(chunk)) => {
                    pending.push(chunk);
                    if pending.len() >= self.batch_items as usize {
                        self.seal_and_send(&pending).await?;
                        pending.clear();
                    }
                }
                Some(WorkItem::End(header)) => {
                    if !pending.is_empty() {
                        self.seal_and_send(&pending).await?;
                        pending.clear();
                    }
                    return Ok(header);
                }
                None => bail!("chunker stopped before the end of input"),
            }
        }
    }

    async fn seal_and_send(&mut self, plain: &[Bytes]) -> Result<()> {
        let sealed = self.strategy.seal_batch(plain).await?;

        // keys land on disk before their ciphertexts go out: an interrupted
        // upload must never have sent a chunk whose key was not recorded
        if let Some(recipe) = self.recipe.as_mut() {
            for key in &sealed.keys {
                recipe.append(key)?;
                self.stats.keys_written += 1;
            }
        }

        for (chunk, cipher) in plain.iter().zip(&sealed.ciphertexts) {
            self.stats.chunks += 1;
            self.stats.plain_bytes += chunk.len() as u64;
            self.stats.cipher_bytes += cipher.len() as u64;
            self.chunk_batch.append_chunk(cipher)?;
            self.recipe_batch.append_record(&hash(cipher))?;
            if self.chunk_batch.is_full() {
                self.flush_chunks().await?;
            }
            if self.recipe_batch.is_full() {
                self.flush_recipes().await?;
            }
        }
        Ok(())
    }

    async fn flush_chunks(&mut self) -> Result<()> {
        if self.chunk_batch.is_empty() {
            return Ok(());
        }
        self.conn
            .send(
                MessageType::UploadChunk,
                self.chunk_batch.item_count(),
                self.chunk_batch.payload(),
            )
            .await?;
        self.stats.chunk_batches += 1;
        tracing::debug!(
            items = self.chunk_batch.item_count(),
            bytes = self.chunk_batch.data_size(),
            "chunk batch sent"
        );
        self.chunk_batch.reset();
        Ok(())
    }

    async fn flush_recipes(&mut self) -> Result<()> {
        if self.recipe_batch.is_empty() {
            return Ok(());
        }
        self.conn
            .send(
                MessageType::UploadRecipe,
                self.recipe_batch.item_count(),
                self.recipe_batch.payload(),
            )
            .await?;
        self.stats.recipe_batches += 1;
        tracing::debug!(items = self.recipe_batch.item_count(), "recipe batch sent");
        self.recipe_batch.reset();
        Ok(())
    }

    async fn finish(mut self, header: FileRecipeHeader) -> Result<UploadStats> {
        self.flush_chunks().await?;
        self.flush_recipes().await?;
        self.conn
            .send(MessageType::UploadRecipeEnd, 0, header.as_bytes())
            .await?;

        self.strategy.close().await?;
        if let Some(recipe) = self.recipe.take() {
            recipe.finish()?;
        }
        self.conn.shutdown().await?;

        let file_size = header.file_size;
        let total_chunk_num = header.total_chunk_num;
        tracing::info!(
            file_size,
            chunks = total_chunk_num,
            plain_bytes = self.stats.plain_bytes,
            cipher_bytes = self.stats.cipher_bytes,
            chunk_batches = self.stats.chunk_batches,
            recipe_batches = self.stats.recipe_batches,
            keys_written = self.stats.keys_written,
            "upload complete"
        );
        Ok(self.stats)
    }
}

//! File chunking — reads the input file and feeds fixed-size chunks into
//! the upload pipeline.
//!
//! Reads happen in large configurable units; chunks are carved out of the
//! read buffer without copying. The final chunk may be shorter than
//! MAX_CHUNK_SIZE and is followed by an End item carrying the measured
//! file size and chunk count.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use sealstore_core::wire::{FileRecipeHeader, HASH_SIZE, MAX_CHUNK_SIZE};

/// One unit of work flowing from the chunker to the upload worker.
#[derive(Debug)]
pub enum WorkItem {
    /// A plaintext chunk, at most MAX_CHUNK_SIZE bytes.
    Chunk(Bytes),
    /// End of input, carrying the final per-file metadata.
    End(FileRecipeHeader),
}

pub struct Chunker {
    path: PathBuf,
    file_name_hash: [u8; HASH_SIZE],
    read_unit_bytes: u64,
    tx: mpsc::Sender<WorkItem>,
}

impl Chunker {
    pub fn new(
        path: PathBuf,
        file_name_hash: [u8; HASH_SIZE],
        read_unit_bytes: u64,
        tx: mpsc::Sender<WorkItem>,
    ) -> Self {
        Self {
            path,
            file_name_hash,
            read_unit_bytes,
            tx,
        }
    }

    /// Read the whole input, emitting chunks in file order and then End.
    pub async fn run(self) -> Result<()> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let read_unit = self.read_unit_bytes.max(MAX_CHUNK_SIZE as u64) as usize;
        let mut read_buf = vec![0u8; read_unit];
        let mut pending = BytesMut::new();
        let mut file_size: u64 = 0;
        let mut total_chunk_num: u64 = 0;

        loop {
            let n = file
                .read(&mut read_buf)
                .await
                .with_context(|| format!("failed to read {}", self.path.display()))?;
            if n == 0 {
                break;
            }
            file_size += n as u64;
            pending.extend_from_slice(&read_buf[..n]);

            while pending.len() >= MAX_CHUNK_SIZE {
                let chunk = pending.split_to(MAX_CHUNK_SIZE).freeze();
                total_chunk_num += 1;
                self.send(WorkItem::Chunk(chunk)).await?;
            }
        }

        if !pending.is_empty() {
            total_chunk_num += 1;
            self.send(WorkItem::Chunk(pending.freeze())).await?;
        }

        tracing::info!(
            file = %self.path.display(),
            file_size,
            chunks = total_chunk_num,
            "input fully chunked"
        );

        let header = FileRecipeHeader {
            file_size,
            total_chunk_num,
            file_name_hash: self.file_name_hash,
        };
        self.send(WorkItem::End(header)).await
    }

    async fn send(&self, item: WorkItem) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| anyhow!("upload worker stopped accepting chunks"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Restore output — writes decrypted chunks to the output file in order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

pub struct RestoreWriter {
    path: PathBuf,
    rx: mpsc::Receiver<Bytes>,
}

impl RestoreWriter {
    pub fn new(path: PathBuf, rx: mpsc::Receiver<Bytes>) -> Self {
        Self { path, rx }
    }

    /// Write chunks until the restore side closes the channel.
    /// Returns the number of bytes written.
    pub async fn run(mut self) -> Result<u64> {
        let file = tokio::fs::File::create(&self.path)
            .await
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        let mut out = BufWriter::new(file);
        let mut bytes_written: u64 = 0;

        while let Some(chunk) = self.rx.recv().await {
            out.write_all(&chunk)
                .await
                .with_context(|| format!("failed to write {}", self.path.display()))?;
            bytes_written += chunk.len() as u64;
        }

        out.flush()
            .await
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), bytes = bytes_written, "restore written");
        Ok(bytes_written)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Local key recipe files.
//!
//! One file per uploaded file, named `hex(file_name_hash) + suffix`, holding
//! a flat sequence of 32-byte derived keys in upload order. This file is the
//! only path from stored ciphertext back to plaintext keys: it never leaves
//! the client, and its ordering must match the server's chunk delivery order
//! exactly. There is no random access — upload appends, restore reads
//! front to back, and position is the pairing.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::wire::HASH_SIZE;

/// File name of the key recipe for a given file name hash.
pub fn recipe_file_name(file_name_hash: &[u8; HASH_SIZE], suffix: &str) -> String {
    format!("{}{}", hex::encode(file_name_hash), suffix)
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Append-only writer for one upload session's derived keys.
///
/// Keys must be appended in chunk order; the writer does not reorder,
/// deduplicate, or seek. Call `finish` to flush before dropping.
pub struct KeyRecipeWriter {
    inner: BufWriter<File>,
    path: PathBuf,
    keys_written: u64,
}

impl KeyRecipeWriter {
    /// Create (or truncate) the recipe file for a new upload session.
    pub fn create(dir: &Path, file_name_hash: &[u8; HASH_SIZE], suffix: &str) -> Result<Self, RecipeError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| RecipeError::Open(dir.to_path_buf(), e))?;
        let path = dir.join(recipe_file_name(file_name_hash, suffix));
        let file = File::create(&path).map_err(|e| RecipeError::Open(path.clone(), e))?;
        Ok(Self {
            inner: BufWriter::new(file),
            path,
            keys_written: 0,
        })
    }

    /// Append one derived key. Position in the file is the chunk index.
    pub fn append(&mut self, key: &[u8; HASH_SIZE]) -> Result<(), RecipeError> {
        self.inner
            .write_all(key)
            .map_err(|e| RecipeError::Write(self.path.clone(), e))?;
        self.keys_written += 1;
        Ok(())
    }

    pub fn keys_written(&self) -> u64 {
        self.keys_written
    }

    /// Flush buffered keys to disk.
    pub fn finish(mut self) -> Result<(), RecipeError> {
        self.inner
            .flush()
            .map_err(|e| RecipeError::Write(self.path.clone(), e))
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Strictly sequential reader for a restore session.
///
/// `next_key` returns keys in the order they were appended. Running past
/// the end means the server delivered more chunks than were uploaded,
/// which callers treat as fatal.
#[derive(Debug)]
pub struct KeyRecipeReader {
    inner: BufReader<File>,
    path: PathBuf,
}

impl KeyRecipeReader {
    pub fn open(dir: &Path, file_name_hash: &[u8; HASH_SIZE], suffix: &str) -> Result<Self, RecipeError> {
        let path = dir.join(recipe_file_name(file_name_hash, suffix));
        let file = File::open(&path).map_err(|e| RecipeError::Open(path.clone(), e))?;
        Ok(Self {
            inner: BufReader::new(file),
            path,
        })
    }

    /// Read the next 32-byte key.
    pub fn next_key(&mut self) -> Result<[u8; HASH_SIZE], RecipeError> {
        let mut key = [0u8; HASH_SIZE];
        self.inner.read_exact(&mut key).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                RecipeError::Exhausted(self.path.clone())
            } else {
                RecipeError::Read(self.path.clone(), e)
            }
        })?;
        Ok(key)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to open key recipe {0}: {1}")]
    Open(PathBuf, std::io::Error),
    #[error("failed to write key recipe {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to read key recipe {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("key recipe {0} has no more keys")]
    Exhausted(PathBuf),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

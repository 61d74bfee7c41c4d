//! Threshold key derivation.
//!
//! The manager sees only a short Murmur3 hash of each plaintext chunk.
//! Its reply folds a popularity-dependent secret into the key: chunks the
//! manager has counted past its threshold derive the same key everywhere
//! and deduplicate, rare chunks get a reply salted per request and stay
//! unguessable offline.

use std::io::Cursor;

use anyhow::{Context, Result};
use bytes::Bytes;

use sealstore_core::crypto::{encrypt_chunk, hash, hash_pair};
use sealstore_core::wire::{HASH_SIZE, SHORT_HASH_SIZE};

use super::SealedBatch;
use crate::keymanager::KeyManagerClient;

pub struct ThresholdKeygen {
    km: KeyManagerClient,
}

impl ThresholdKeygen {
    pub fn new(km: KeyManagerClient) -> Self {
        Self { km }
    }

    /// Murmur3 x64_128 of the plaintext chunk, left-aligned in a HASH_SIZE
    /// slot so request and reply blocks share one schema.
    pub fn short_hash_block(chunk: &[u8]) -> Result<[u8; HASH_SIZE]> {
        let short =
            murmur3::murmur3_x64_128(&mut Cursor::new(chunk), 0).context("short hash failed")?;
        let mut block = [0u8; HASH_SIZE];
        block[..SHORT_HASH_SIZE].copy_from_slice(&short.to_le_bytes());
        Ok(block)
    }

    pub async fn seal_batch(&mut self, plain: &[Bytes]) -> Result<SealedBatch> {
        let mut request = Vec::with_capacity(plain.len() * HASH_SIZE);
        for chunk in plain {
            request.extend_from_slice(&Self::short_hash_block(chunk)?);
        }
        let reply = self.km.key_gen(&request, plain.len() as u32).await?;

        let mut ciphertexts = Vec::with_capacity(plain.len());
        let mut keys = Vec::with_capacity(plain.len());
        for (chunk, secret) in plain.iter().zip(reply.chunks_exact(HASH_SIZE)) {
            // key = hash(fingerprint || manager reply slot)
            let fingerprint = hash(chunk);
            let key = hash_pair(&fingerprint, secret);
            ciphertexts.push(encrypt_chunk(&key, chunk)?);
            keys.push(key);
        }
        Ok(SealedBatch { ciphertexts, keys })
    }

    pub async fn close(self) -> Result<()> {
        self.km.shutdown().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Key derivation strategies.
//!
//! A strategy turns a batch of plaintext chunks into a positionally aligned
//! batch of ciphertexts plus the derived keys that encrypted them. All key
//! material stays on the client; the keyed strategies differ only in where
//! the per-chunk key comes from:
//!
//!   plain       no encryption, chunks pass through untouched
//!   convergent  key = BLAKE3(chunk)
//!   threshold   key = BLAKE3(fingerprint || manager reply)
//!   blinded     key = BLAKE3(unblinded RSA signature of the fingerprint)

mod blinded;
mod threshold;

pub use blinded::BlindedKeygen;
pub use threshold::ThresholdKeygen;

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use bytes::Bytes;

use sealstore_core::config::SealConfig;
use sealstore_core::crypto::{encrypt_chunk, hash};
use sealstore_core::wire::{HASH_SIZE, RSA_KEY_SIZE};

use crate::blind::BlindingContext;
use crate::keymanager::KeyManagerClient;

// ── Strategy selection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Plain,
    Convergent,
    Threshold,
    Blinded,
}

impl StrategyKind {
    /// Whether uploads under this strategy produce a local key recipe.
    /// Plain uploads store chunks as-is and have nothing to record.
    pub fn writes_keys(self) -> bool {
        !matches!(self, StrategyKind::Plain)
    }
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(StrategyKind::Plain),
            "convergent" => Ok(StrategyKind::Convergent),
            "threshold" => Ok(StrategyKind::Threshold),
            "blinded" => Ok(StrategyKind::Blinded),
            other => bail!(
                "unknown strategy {other:?} (expected plain, convergent, threshold, or blinded)"
            ),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Plain => "plain",
            StrategyKind::Convergent => "convergent",
            StrategyKind::Threshold => "threshold",
            StrategyKind::Blinded => "blinded",
        })
    }
}

// ── Sealed batches ────────────────────────────────────────────────────────────

/// The output of sealing one batch of plaintext chunks.
///
/// `ciphertexts[i]` is chunk i sealed; for keyed strategies `keys[i]` is the
/// key that sealed it, in the same order. Plain produces no keys.
pub struct SealedBatch {
    pub ciphertexts: Vec<Vec<u8>>,
    pub keys: Vec<[u8; HASH_SIZE]>,
}

// ── KeyDerivation ─────────────────────────────────────────────────────────────

/// A live upload-side strategy, holding its key manager connection where
/// one is needed.
pub enum KeyDerivation {
    Plain,
    Convergent,
    Threshold(ThresholdKeygen),
    Blinded(BlindedKeygen),
}

impl KeyDerivation {
    /// Build the strategy for an upload, connecting to the key manager when
    /// the strategy calls for one.
    pub async fn for_upload(kind: StrategyKind, config: &SealConfig) -> Result<Self> {
        match kind {
            StrategyKind::Plain => Ok(Self::Plain),
            StrategyKind::Convergent => Ok(Self::Convergent),
            StrategyKind::Threshold => {
                let km = KeyManagerClient::connect(
                    &config.key_manager.host,
                    config.key_manager.port,
                    config.client.client_id,
                    HASH_SIZE,
                )
                .await?;
                Ok(Self::Threshold(ThresholdKeygen::new(km)))
            }
            StrategyKind::Blinded => {
                let ctx = BlindingContext::from_pem_file(&config.key_manager.public_key_path)?;
                let km = KeyManagerClient::connect(
                    &config.key_manager.host,
                    config.key_manager.port,
                    config.client.client_id,
                    RSA_KEY_SIZE,
                )
                .await?;
                Ok(Self::Blinded(BlindedKeygen::new(km, ctx)))
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Plain => StrategyKind::Plain,
            Self::Convergent => StrategyKind::Convergent,
            Self::Threshold(_) => StrategyKind::Threshold,
            Self::Blinded(_) => StrategyKind::Blinded,
        }
    }

    /// Seal one batch of plaintext chunks.
    ///
    /// Always returns exactly `plain.len()` ciphertexts, positionally
    /// aligned, and one key per chunk for every keyed strategy.
    pub async fn seal_batch(&mut self, plain: &[Bytes]) -> Result<SealedBatch> {
        match self {
            Self::Plain => Ok(SealedBatch {
                ciphertexts: plain.iter().map(|chunk| chunk.to_vec()).collect(),
                keys: Vec::new(),
            }),
            Self::Convergent => {
                let mut ciphertexts = Vec::with_capacity(plain.len());
                let mut keys = Vec::with_capacity(plain.len());
                for chunk in plain {
                    let key = hash(chunk);
                    ciphertexts.push(encrypt_chunk(&key, chunk)?);
                    keys.push(key);
                }
                Ok(SealedBatch { ciphertexts, keys })
            }
            Self::Threshold(keygen) => keygen.seal_batch(plain).await,
            Self::Blinded(keygen) => keygen.seal_batch(plain).await,
        }
    }

    /// Close the key manager connection, if the strategy holds one.
    pub async fn close(self) -> Result<()> {
        match self {
            Self::Plain | Self::Convergent => Ok(()),
            Self::Threshold(keygen) => keygen.close().await,
            Self::Blinded(keygen) => keygen.close().await,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Blinded key derivation.
//!
//! Fingerprints cross the wire only in blinded form; the key is the hash
//! of the manager's unblinded signature, so the key space is anchored to
//! the manager's private key without the manager ever seeing a chunk
//! fingerprint.

use anyhow::Result;
use bytes::Bytes;

use sealstore_core::crypto::{encrypt_chunk, hash};
use sealstore_core::wire::{HASH_SIZE, RSA_KEY_SIZE};

use super::SealedBatch;
use crate::blind::BlindingContext;
use crate::keymanager::KeyManagerClient;

pub struct BlindedKeygen {
    km: KeyManagerClient,
    ctx: BlindingContext,
}

impl BlindedKeygen {
    pub fn new(km: KeyManagerClient, ctx: BlindingContext) -> Self {
        Self { km, ctx }
    }

    pub async fn seal_batch(&mut self, plain: &[Bytes]) -> Result<SealedBatch> {
        let fingerprints: Vec<[u8; HASH_SIZE]> = plain.iter().map(|chunk| hash(chunk)).collect();

        let mut blinded = Vec::with_capacity(fingerprints.len());
        let mut request = Vec::with_capacity(fingerprints.len() * RSA_KEY_SIZE);
        for fingerprint in &fingerprints {
            let b = self.ctx.blind(fingerprint)?;
            request.extend_from_slice(&b.block);
            blinded.push(b);
        }
        let reply = self.km.key_gen(&request, fingerprints.len() as u32).await?;

        let mut ciphertexts = Vec::with_capacity(plain.len());
        let mut keys = Vec::with_capacity(plain.len());
        for ((chunk, b), signature) in plain
            .iter()
            .zip(blinded.iter())
            .zip(reply.chunks_exact(RSA_KEY_SIZE))
        {
            let unblinded = self.ctx.unblind(signature, b)?;
            let key = hash(&unblinded);
            ciphertexts.push(encrypt_chunk(&key, chunk)?);
            keys.push(key);
        }
        Ok(SealedBatch { ciphertexts, keys })
    }

    pub async fn close(self) -> Result<()> {
        self.km.shutdown().await
    }
}

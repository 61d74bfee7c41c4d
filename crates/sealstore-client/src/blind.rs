//! Blind RSA fingerprint exchange.
//!
//! The client never shows the key manager a raw chunk fingerprint. Each
//! fingerprint is multiplied by r^e mod n for a fresh random r before it
//! goes on the wire; the manager signs the product with its private
//! exponent and the client divides the blinding factor back out:
//!
//!   blinded   = fp * r^e   (mod n)
//!   signature = blinded^d  (mod n)
//!   unblinded = signature * r^-1 = fp^d  (mod n)
//!
//! The unblinded value depends only on fp and the manager's key, so equal
//! chunks still derive equal keys, but the manager learns nothing about fp
//! and cannot link two requests for the same chunk.

use std::path::Path;

use anyhow::{bail, Context, Result};
use num_bigint_dig::{BigUint, ModInverse, RandBigInt};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;

use sealstore_core::wire::{HASH_SIZE, RSA_KEY_SIZE};

/// Draws of the blinding factor before giving up. A draw only fails when
/// gcd(r, n) != 1, which for a sound RSA modulus is vanishingly rare.
const MAX_BLINDING_DRAWS: usize = 8;

/// The key manager's public RSA parameters.
pub struct BlindingContext {
    n: BigUint,
    e: BigUint,
}

/// A blinded fingerprint ready for the wire, plus the factor needed to
/// undo the blinding once the signature comes back.
pub struct BlindedFingerprint {
    pub block: [u8; RSA_KEY_SIZE],
    unblinder: BigUint,
}

impl BlindingContext {
    /// Load the manager's public key from a PEM file (SPKI or PKCS#1).
    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read public key {}", path.display()))?;
        let key = RsaPublicKey::from_public_key_pem(&text)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(&text))
            .with_context(|| format!("{} is not an RSA public key", path.display()))?;
        Ok(Self {
            n: key.n().clone(),
            e: key.e().clone(),
        })
    }

    pub fn from_components(n: BigUint, e: BigUint) -> Self {
        Self { n, e }
    }

    /// Blind one fingerprint under a fresh random factor.
    pub fn blind(&self, fingerprint: &[u8; HASH_SIZE]) -> Result<BlindedFingerprint> {
        let fp = BigUint::from_bytes_be(fingerprint) % &self.n;
        let mut rng = OsRng;
        for _ in 0..MAX_BLINDING_DRAWS {
            let r = rng.gen_biguint_below(&self.n);
            let inverse = match (&r).mod_inverse(&self.n).and_then(|i| i.to_biguint()) {
                Some(inverse) => inverse,
                None => continue,
            };
            let blinded = &fp * r.modpow(&self.e, &self.n) % &self.n;
            return Ok(BlindedFingerprint {
                block: to_wire_block(&blinded)?,
                unblinder: inverse,
            });
        }
        bail!("no invertible blinding factor after {MAX_BLINDING_DRAWS} draws, modulus is unsound");
    }

    /// Strip the blinding factor from a signature block, recovering
    /// fp^d mod n as a fixed-size block.
    pub fn unblind(
        &self,
        signature: &[u8],
        blinded: &BlindedFingerprint,
    ) -> Result<[u8; RSA_KEY_SIZE]> {
        if signature.len() != RSA_KEY_SIZE {
            bail!(
                "signature block is {} bytes, expected {RSA_KEY_SIZE}",
                signature.len()
            );
        }
        let s = BigUint::from_bytes_be(signature) % &self.n;
        let unblinded = s * &blinded.unblinder % &self.n;
        to_wire_block(&unblinded)
    }
}

/// Left-pad a value into a fixed RSA_KEY_SIZE big-endian block.
fn to_wire_block(value: &BigUint) -> Result<[u8; RSA_KEY_SIZE]> {
    let bytes = value.to_bytes_be();
    if bytes.len() > RSA_KEY_SIZE {
        bail!(
            "value of {} bytes does not fit a {RSA_KEY_SIZE}-byte block",
            bytes.len()
        );
    }
    let mut block = [0u8; RSA_KEY_SIZE];
    block[RSA_KEY_SIZE - bytes.len()..].copy_from_slice(&bytes);
    Ok(block)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

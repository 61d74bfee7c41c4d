//! Cryptographic primitives for sealstore.
//!
//! Provides two things:
//!   1. BLAKE3 hashing — chunk fingerprints, file name hashes, key derivation
//!   2. Deterministic chunk encryption — AES-256-SIV with a zero nonce
//!
//! Determinism is the point: the same plaintext under the same key must
//! produce the same ciphertext, or server-side deduplication of encrypted
//! chunks cannot work. AES-SIV gives that property with authentication;
//! a decrypt under the wrong key or over tampered bytes fails loudly.
//!
//! There is no unsafe code in this module.

use aes_siv::{
    aead::{Aead, KeyInit},
    Aes256SivAead, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::wire::{CIPHER_TAG_SIZE, HASH_SIZE};

// ── BLAKE3 ────────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
///
/// Used for chunk fingerprints, ciphertext fingerprints, file name hashes,
/// and the final step of every key derivation.
pub fn hash(data: &[u8]) -> [u8; HASH_SIZE] {
    *blake3::hash(data).as_bytes()
}

/// Hash of two concatenated inputs without an intermediate allocation.
///
///   derive = BLAKE3(left || right)
pub fn hash_pair(left: &[u8], right: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// The hash naming a file on the server and naming its local key recipe.
///
///   file_name_hash = BLAKE3(file_name || decimal client_id)
///
/// Including the client id keeps two clients' uploads of the same path
/// from colliding on the server.
pub fn file_name_hash(file_name: &str, client_id: u32) -> [u8; HASH_SIZE] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_name.as_bytes());
    hasher.update(client_id.to_string().as_bytes());
    *hasher.finalize().as_bytes()
}

// ── Chunk encryption ──────────────────────────────────────────────────────────

/// HKDF domain string for expanding a 32-byte chunk key into the 64-byte
/// AES-256-SIV key (two 32-byte sub-keys). Must never change once data
/// has been uploaded.
const SIV_KEY_DOMAIN: &[u8] = b"sealstore-chunk-aes-siv";

fn siv_cipher(key: &[u8; HASH_SIZE]) -> Result<Aes256SivAead, CryptoError> {
    let mut double_key = [0u8; 64];
    let hkdf = Hkdf::<Sha256>::new(None, key);
    hkdf.expand(SIV_KEY_DOMAIN, &mut double_key)
        .map_err(|_| CryptoError::KeyExpansion)?;
    Ok(Aes256SivAead::new((&double_key).into()))
}

/// Encrypt one chunk under its derived key.
///
/// Deterministic: SIV with a zero nonce, so identical (key, plaintext)
/// pairs always produce identical ciphertext. Output length is
/// `plaintext.len() + CIPHER_TAG_SIZE`.
pub fn encrypt_chunk(key: &[u8; HASH_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = siv_cipher(key)?;
    let nonce = Nonce::default();
    cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)
}

/// Decrypt one chunk. Fails if the key is wrong or the bytes were altered.
pub fn decrypt_chunk(key: &[u8; HASH_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < CIPHER_TAG_SIZE {
        return Err(CryptoError::CiphertextTooShort(ciphertext.len()));
    }
    let cipher = siv_cipher(key)?;
    let nonce = Nonce::default();
    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("HKDF key expansion failed — this is a bug")]
    KeyExpansion,

    #[error("chunk encryption failed")]
    Encrypt,

    #[error("ciphertext of {0} bytes is shorter than the authentication tag")]
    CiphertextTooShort(usize),

    #[error("chunk authentication failed: wrong key or corrupted data")]
    Authentication,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

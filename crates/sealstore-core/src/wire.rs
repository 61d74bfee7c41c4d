//! sealstore wire format — on-wire types for client/server and
//! client/key-manager traffic.
//!
//! These types ARE the protocol. Every message starts with a MessageHeader;
//! the header's `message_type` discriminates the payload schema and
//! `data_size` gives the exact payload byte count that follows.
//!
//! All types are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for safe, allocation-free serialization. There is no
//! unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Message Header ────────────────────────────────────────────────────────────

/// Fixed header preceding every payload on every sealstore connection.
///
/// The receiver can size its payload read and route the message before
/// touching a single payload byte.
///
/// Wire size: 16 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct MessageHeader {
    /// Identifier of the client that opened the connection.
    /// Assigned by configuration, echoed on every message.
    pub client_id: u32,

    /// One of the MessageType discriminants. An unknown value causes the
    /// receiver to abort the session.
    pub message_type: u32,

    /// Number of packed items in the payload (chunks, recipe entries,
    /// key-gen blocks). Zero for pure control messages.
    pub item_count: u32,

    /// Payload length in bytes, not including this header.
    pub data_size: u32,
}

assert_eq_size!(MessageHeader, [u8; 16]);

impl MessageHeader {
    pub fn new(client_id: u32, message_type: MessageType, item_count: u32, data_size: u32) -> Self {
        Self {
            client_id,
            message_type: message_type.into(),
            item_count,
            data_size,
        }
    }
}

// ── File Recipe Header ────────────────────────────────────────────────────────

/// Per-file metadata record.
///
/// Sent as the payload of LoginUpload, LoginDownload, LoginResponse, and
/// UploadRecipeEnd. On upload login the counters are zero (the file has not
/// been measured yet); the terminal UploadRecipeEnd carries the final values.
///
/// Wire size: 48 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FileRecipeHeader {
    /// Logical (plaintext) file size in bytes.
    pub file_size: u64,

    /// Total number of chunks the file was split into.
    pub total_chunk_num: u64,

    /// BLAKE3 hash of the file name concatenated with the decimal client id.
    /// Names the file on the server and names the local key recipe file.
    pub file_name_hash: [u8; 32],
}

assert_eq_size!(FileRecipeHeader, [u8; 48]);

// ── Message Types ─────────────────────────────────────────────────────────────

/// Discriminants for MessageHeader.message_type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    /// Client → storage: open an upload session. Payload: FileRecipeHeader.
    LoginUpload = 0x01,
    /// Client → storage: open a download session. Payload: FileRecipeHeader.
    LoginDownload = 0x02,
    /// Client → storage: a batch of length-prefixed ciphertext chunks.
    UploadChunk = 0x03,
    /// Client → storage: a batch of fixed 32-byte ciphertext fingerprints.
    UploadRecipe = 0x04,
    /// Client → storage: terminal marker. Payload: final FileRecipeHeader.
    UploadRecipeEnd = 0x05,
    /// Client → storage: download login accepted, start streaming chunks.
    RestoreReady = 0x06,

    /// Storage → client: login accepted. Download payload: stored
    /// FileRecipeHeader. Upload payload: empty.
    LoginResponse = 0x10,
    /// Storage → client: no recipe for the requested file name hash.
    FileNonExistent = 0x11,
    /// Storage → client: a batch of ciphertext chunks, more to follow.
    RestoreChunk = 0x12,
    /// Storage → client: the last batch of ciphertext chunks.
    RestoreFinal = 0x13,

    /// Client → key manager: a batch of fixed-size key-gen blocks.
    KeyGenRequest = 0x20,
    /// Key manager → client: key-gen blocks, positionally aligned with the
    /// request. Any other reply type to a KeyGenRequest is fatal.
    KeyGenReply = 0x21,
}

impl TryFrom<u32> for MessageType {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageType::LoginUpload),
            0x02 => Ok(MessageType::LoginDownload),
            0x03 => Ok(MessageType::UploadChunk),
            0x04 => Ok(MessageType::UploadRecipe),
            0x05 => Ok(MessageType::UploadRecipeEnd),
            0x06 => Ok(MessageType::RestoreReady),
            0x10 => Ok(MessageType::LoginResponse),
            0x11 => Ok(MessageType::FileNonExistent),
            0x12 => Ok(MessageType::RestoreChunk),
            0x13 => Ok(MessageType::RestoreFinal),
            0x20 => Ok(MessageType::KeyGenRequest),
            0x21 => Ok(MessageType::KeyGenReply),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u32 {
    fn from(t: MessageType) -> u32 {
        t as u32
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// BLAKE3 digest size. Also the derived key size and the recipe entry size.
pub const HASH_SIZE: usize = 32;

/// Upper bound on a plaintext chunk's payload.
/// Larger input is split by the chunker before it reaches the wire.
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Authentication tag overhead added by chunk encryption.
/// A ciphertext chunk is at most MAX_CHUNK_SIZE + CIPHER_TAG_SIZE bytes.
pub const CIPHER_TAG_SIZE: usize = 16;

/// Byte length of the key manager's RSA modulus (2048-bit).
/// Blinded fingerprints and signatures travel as blocks of this size.
pub const RSA_KEY_SIZE: usize = 256;

/// Murmur3 x64_128 output size. Short hashes are transmitted left-aligned
/// inside a HASH_SIZE-byte slot so the key-gen reply schema stays uniform.
pub const SHORT_HASH_SIZE: usize = 16;

/// Wire size of MessageHeader.
pub const MESSAGE_HEADER_SIZE: usize = 16;

/// Wire size of FileRecipeHeader.
pub const FILE_RECIPE_HEADER_SIZE: usize = 48;

/// Capacity of the bounded channels between pipeline stages.
pub const CHUNK_QUEUE_DEPTH: usize = 8192;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown message type: 0x{0:02x}")]
    UnknownMessageType(u32),

    #[error("payload length {got} does not match header data_size {expected}")]
    PayloadSizeMismatch { expected: u32, got: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

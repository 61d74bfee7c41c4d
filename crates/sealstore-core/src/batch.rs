//! Batch framing — fixed-capacity buffers aggregating items into one message.
//!
//! A BatchBuffer owns its payload bytes and two cursors (item count, byte
//! length). Appends are capacity-checked; a full buffer must be flushed
//! (sent, then reset) by the caller before further appends. Reset is O(1)
//! and does not release the allocation, so one buffer serves a whole
//! session without reallocating.
//!
//! Two payload schemas exist:
//!   * chunk entries — `u32 LE length` followed by that many bytes
//!   * record entries — fixed-size blocks, no length prefix

use crate::wire::{MessageHeader, MessageType};

// ── BatchBuffer ───────────────────────────────────────────────────────────────

/// Reusable fixed-capacity batch container.
///
/// `item_count` equals the number of appends since the last reset and
/// `data_size` equals the sum of the appended items' encoded byte lengths.
/// Capacity is fixed at construction and never grows.
pub struct BatchBuffer {
    payload: Vec<u8>,
    capacity: usize,
    batch_items: u32,
    max_item_bytes: usize,
    item_count: u32,
}

impl BatchBuffer {
    /// A buffer for length-prefixed chunk entries.
    /// Capacity: `batch_items * (4 + max_chunk_bytes)`.
    pub fn for_chunks(batch_items: u32, max_chunk_bytes: usize) -> Self {
        let capacity = batch_items as usize * (4 + max_chunk_bytes);
        Self {
            payload: Vec::with_capacity(capacity),
            capacity,
            batch_items,
            max_item_bytes: max_chunk_bytes,
            item_count: 0,
        }
    }

    /// A buffer for fixed-size record entries.
    /// Capacity: `batch_items * record_bytes`.
    pub fn for_records(batch_items: u32, record_bytes: usize) -> Self {
        let capacity = batch_items as usize * record_bytes;
        Self {
            payload: Vec::with_capacity(capacity),
            capacity,
            batch_items,
            max_item_bytes: record_bytes,
            item_count: 0,
        }
    }

    /// Append one length-prefixed chunk entry.
    pub fn append_chunk(&mut self, data: &[u8]) -> Result<(), BatchError> {
        if data.len() > self.max_item_bytes {
            return Err(BatchError::OversizedItem {
                size: data.len(),
                max: self.max_item_bytes,
            });
        }
        let needed = 4 + data.len();
        self.check_capacity(needed)?;
        self.payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.payload.extend_from_slice(data);
        self.item_count += 1;
        Ok(())
    }

    /// Append one fixed-size record entry.
    pub fn append_record(&mut self, record: &[u8]) -> Result<(), BatchError> {
        if record.len() != self.max_item_bytes {
            return Err(BatchError::OversizedItem {
                size: record.len(),
                max: self.max_item_bytes,
            });
        }
        self.check_capacity(record.len())?;
        self.payload.extend_from_slice(record);
        self.item_count += 1;
        Ok(())
    }

    fn check_capacity(&self, needed: usize) -> Result<(), BatchError> {
        let remaining = self.capacity - self.payload.len();
        if needed > remaining {
            return Err(BatchError::Overflow { needed, remaining });
        }
        Ok(())
    }

    /// Zero the cursors. The payload bytes are logically discarded, the
    /// allocation is kept.
    pub fn reset(&mut self) {
        self.payload.clear();
        self.item_count = 0;
    }

    /// The configured batch size has been reached and the buffer must be
    /// flushed before the next append.
    pub fn is_full(&self) -> bool {
        self.item_count >= self.batch_items
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    pub fn data_size(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Assemble the wire header describing the current contents.
    pub fn header(&self, client_id: u32, message_type: MessageType) -> MessageHeader {
        MessageHeader::new(client_id, message_type, self.item_count, self.data_size())
    }
}

// ── Payload parsing ───────────────────────────────────────────────────────────

/// Iterate the chunk entries of a received chunk-batch payload.
///
/// Yields one `Ok(&[u8])` per entry; a length prefix pointing past the end
/// of the payload yields `Err(BatchError::Truncated)` and ends iteration.
pub fn chunk_entries(payload: &[u8]) -> ChunkEntries<'_> {
    ChunkEntries { rest: payload }
}

pub struct ChunkEntries<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for ChunkEntries<'a> {
    type Item = Result<&'a [u8], BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < 4 {
            self.rest = &[];
            return Some(Err(BatchError::Truncated));
        }
        let len = u32::from_le_bytes(self.rest[..4].try_into().unwrap()) as usize;
        if self.rest.len() < 4 + len {
            self.rest = &[];
            return Some(Err(BatchError::Truncated));
        }
        let (entry, rest) = self.rest[4..].split_at(len);
        self.rest = rest;
        Some(Ok(entry))
    }
}

/// Split a received record-batch payload into fixed-size entries.
/// The payload length must be an exact multiple of `record_bytes`.
pub fn record_entries(payload: &[u8], record_bytes: usize) -> Result<Vec<&[u8]>, BatchError> {
    if payload.len() % record_bytes != 0 {
        return Err(BatchError::Truncated);
    }
    Ok(payload.chunks_exact(record_bytes).collect())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A violated batch contract. Callers treat these as fatal: the buffer
/// sizing and flush discipline are supposed to make them impossible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("append of {needed} bytes exceeds remaining capacity {remaining}")]
    Overflow { needed: usize, remaining: usize },

    #[error("item of {size} bytes exceeds the per-item maximum {max}")]
    OversizedItem { size: usize, max: usize },

    #[error("batch payload is truncated mid-entry")]
    Truncated,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

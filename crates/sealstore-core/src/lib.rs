//! sealstore-core — shared types, wire format, batch framing, and crypto.
//! All other sealstore crates depend on this one.

pub mod batch;
pub mod config;
pub mod crypto;
pub mod recipe;
pub mod wire;

pub use batch::{BatchBuffer, BatchError};
pub use wire::{FileRecipeHeader, MessageHeader, MessageType};

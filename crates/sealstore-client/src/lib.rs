//! sealstore-client — upload and restore pipelines for sealed chunk storage.
//!
//! The client splits files into fixed-size chunks, derives per-chunk keys
//! under a chosen strategy, encrypts, and streams batches to the storage
//! server. Restores run the pipeline in reverse, with keys read back from
//! the local recipe in stream order.

pub mod blind;
pub mod chunker;
pub mod keymanager;
pub mod retriever;
pub mod sender;
pub mod strategy;
pub mod transport;
pub mod writer;

pub use chunker::{Chunker, WorkItem};
pub use retriever::{DownloadStats, Retriever};
pub use sender::{Sender, UploadStats};
pub use strategy::{KeyDerivation, StrategyKind};
pub use transport::Connection;
pub use writer::RestoreWriter;

//! sealstore integration test harness.
//!
//! Everything runs in-process on the loopback interface: an in-memory
//! storage server that retains what clients upload and streams it back,
//! plus the two key manager variants (threshold counting and blind
//! signing). No external processes or fixtures are required; each test
//! starts the servers it needs on an ephemeral port.
//!
//! Temp state (recipe dirs, PEM files) lives under the system temp dir,
//! keyed by test tag and process id. Tests clean up after themselves.

mod failures;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use num_bigint_dig::BigUint;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use zerocopy::{AsBytes, FromBytes};

use sealstore_client::{
    Connection, DownloadStats, KeyDerivation, Retriever, Sender, StrategyKind, UploadStats,
    WorkItem,
};
use sealstore_core::batch::{chunk_entries, record_entries, BatchBuffer};
use sealstore_core::config::SealConfig;
use sealstore_core::crypto::{file_name_hash, hash_pair};
use sealstore_core::recipe::{KeyRecipeReader, KeyRecipeWriter};
use sealstore_core::wire::{
    FileRecipeHeader, MessageType, CHUNK_QUEUE_DEPTH, CIPHER_TAG_SIZE, HASH_SIZE, MAX_CHUNK_SIZE,
    RSA_KEY_SIZE,
};

// ── In-memory storage server ──────────────────────────────────────────────────

/// One uploaded file as the storage server retains it.
#[derive(Debug, Default, Clone)]
pub struct StoredFile {
    pub file_size: u64,
    pub total_chunk_num: u64,
    pub chunks: Vec<Vec<u8>>,
    pub recipe: Vec<[u8; HASH_SIZE]>,
}

pub type Store = Arc<Mutex<HashMap<[u8; HASH_SIZE], StoredFile>>>;

/// Loopback storage server keeping everything in memory.
///
/// The backing store is shared with the test, so tests can inspect what
/// was uploaded and tamper with it before a restore.
pub struct MockStorage {
    pub addr: SocketAddr,
    pub store: Store,
}

/// Chunks per batch on the restore path. Small on purpose, so even tiny
/// test files exercise the multi-batch streaming code.
pub const RESTORE_BATCH_ITEMS: u32 = 2;

impl MockStorage {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let accept_store = store.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let store = accept_store.clone();
                tokio::spawn(async move {
                    let _ = serve_storage(stream, store).await;
                });
            }
        });
        Ok(Self { addr, store })
    }

    /// Wait for an upload to land in the store.
    ///
    /// The server inserts the file on its own task after the client's
    /// terminal message, so the upload call can return a beat earlier.
    pub async fn stored(&self, name: &[u8; HASH_SIZE]) -> StoredFile {
        for _ in 0..100 {
            if let Some(file) = self.store.lock().unwrap().get(name).cloned() {
                return file;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("upload did not reach the store within a second");
    }
}

async fn serve_storage(stream: TcpStream, store: Store) -> Result<()> {
    let mut conn = Connection::from_stream(stream, 0);
    let login = conn.recv().await?;
    let header = FileRecipeHeader::read_from(login.payload.as_ref())
        .context("login without a file recipe header")?;
    let name = header.file_name_hash;

    match login.message_type {
        MessageType::LoginUpload => {
            conn.send(MessageType::LoginResponse, 0, &[]).await?;
            let mut file = StoredFile::default();
            loop {
                let msg = conn.recv().await?;
                match msg.message_type {
                    MessageType::UploadChunk => {
                        for entry in chunk_entries(&msg.payload) {
                            file.chunks.push(entry?.to_vec());
                        }
                    }
                    MessageType::UploadRecipe => {
                        for entry in record_entries(&msg.payload, HASH_SIZE)? {
                            let mut record = [0u8; HASH_SIZE];
                            record.copy_from_slice(entry);
                            file.recipe.push(record);
                        }
                    }
                    MessageType::UploadRecipeEnd => {
                        let end = FileRecipeHeader::read_from(msg.payload.as_ref())
                            .context("recipe end without a file recipe header")?;
                        file.file_size = end.file_size;
                        file.total_chunk_num = end.total_chunk_num;
                        break;
                    }
                    other => bail!("unexpected upload message {other:?}"),
                }
            }
            store.lock().unwrap().insert(name, file);
        }
        MessageType::LoginDownload => {
            let stored = store.lock().unwrap().get(&name).cloned();
            let Some(file) = stored else {
                conn.send(MessageType::FileNonExistent, 0, &[]).await?;
                return Ok(());
            };
            let reply = FileRecipeHeader {
                file_size: file.file_size,
                total_chunk_num: file.total_chunk_num,
                file_name_hash: name,
            };
            conn.send(MessageType::LoginResponse, 0, reply.as_bytes())
                .await?;
            let ready = conn.recv().await?;
            if ready.message_type != MessageType::RestoreReady {
                bail!("expected RestoreReady, got {:?}", ready.message_type);
            }
            stream_stored_chunks(&mut conn, &file.chunks).await?;
        }
        other => bail!("unexpected login {other:?}"),
    }
    Ok(())
}

async fn stream_stored_chunks(conn: &mut Connection, chunks: &[Vec<u8>]) -> Result<()> {
    let groups: Vec<&[Vec<u8>]> = chunks.chunks(RESTORE_BATCH_ITEMS as usize).collect();
    if groups.is_empty() {
        conn.send(MessageType::RestoreFinal, 0, &[]).await?;
        return Ok(());
    }
    let mut batch =
        BatchBuffer::for_chunks(RESTORE_BATCH_ITEMS, MAX_CHUNK_SIZE + CIPHER_TAG_SIZE);
    for (i, group) in groups.iter().enumerate() {
        batch.reset();
        for chunk in *group {
            batch.append_chunk(chunk)?;
        }
        let message_type = if i + 1 == groups.len() {
            MessageType::RestoreFinal
        } else {
            MessageType::RestoreChunk
        };
        conn.send(message_type, batch.item_count(), batch.payload())
            .await?;
    }
    Ok(())
}

// ── Key managers ──────────────────────────────────────────────────────────────

/// Key manager answering blinded fingerprints with raw RSA signatures.
pub async fn start_blind_signer(key: RsaPrivateKey) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let key = key.clone();
            tokio::spawn(async move {
                let _ = serve_blind_signer(stream, key).await;
            });
        }
    });
    Ok(addr)
}

async fn serve_blind_signer(stream: TcpStream, key: RsaPrivateKey) -> Result<()> {
    let mut conn = Connection::from_stream(stream, 0);
    loop {
        let Ok(msg) = conn.recv().await else {
            // client hung up, session over
            return Ok(());
        };
        if msg.message_type != MessageType::KeyGenRequest {
            bail!("unexpected key manager message {:?}", msg.message_type);
        }
        let mut reply = Vec::with_capacity(msg.payload.len());
        for block in msg.payload.chunks_exact(RSA_KEY_SIZE) {
            let m = BigUint::from_bytes_be(block);
            let s = m.modpow(key.d(), key.n());
            let bytes = s.to_bytes_be();
            let mut out = [0u8; RSA_KEY_SIZE];
            out[RSA_KEY_SIZE - bytes.len()..].copy_from_slice(&bytes);
            reply.extend_from_slice(&out);
        }
        conn.send(MessageType::KeyGenReply, msg.item_count, &reply)
            .await?;
    }
}

/// Key manager handing out the shared secret only once a fingerprint
/// slot has been seen `threshold` times; rare slots get a reply salted
/// by their current count.
pub async fn start_threshold_manager(threshold: u32) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let counts: Arc<Mutex<HashMap<[u8; HASH_SIZE], u32>>> = Arc::new(Mutex::new(HashMap::new()));
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let counts = counts.clone();
            tokio::spawn(async move {
                let _ = serve_threshold_manager(stream, counts, threshold).await;
            });
        }
    });
    Ok(addr)
}

async fn serve_threshold_manager(
    stream: TcpStream,
    counts: Arc<Mutex<HashMap<[u8; HASH_SIZE], u32>>>,
    threshold: u32,
) -> Result<()> {
    let mut conn = Connection::from_stream(stream, 0);
    loop {
        let Ok(msg) = conn.recv().await else {
            return Ok(());
        };
        if msg.message_type != MessageType::KeyGenRequest {
            bail!("unexpected key manager message {:?}", msg.message_type);
        }
        let mut reply = Vec::with_capacity(msg.payload.len());
        for block in msg.payload.chunks_exact(HASH_SIZE) {
            let mut slot = [0u8; HASH_SIZE];
            slot.copy_from_slice(block);
            let count = {
                let mut counts = counts.lock().unwrap();
                let c = counts.entry(slot).or_insert(0);
                *c += 1;
                *c
            };
            let secret = if count >= threshold {
                hash_pair(&slot, b"popular-secret")
            } else {
                hash_pair(&slot, &count.to_le_bytes())
            };
            reply.extend_from_slice(&secret);
        }
        conn.send(MessageType::KeyGenReply, msg.item_count, &reply)
            .await?;
    }
}

// ── Client drivers ────────────────────────────────────────────────────────────

/// Upload a sequence of pre-split chunks under the given strategy,
/// wiring up the sender exactly as the binary does.
pub async fn upload_chunks(
    config: &SealConfig,
    kind: StrategyKind,
    file_name: &str,
    chunks: &[Vec<u8>],
) -> Result<UploadStats> {
    let name = file_name_hash(file_name, config.client.client_id);
    let conn = Connection::connect(
        &config.storage.host,
        config.storage.port,
        config.client.client_id,
    )
    .await?;
    let strategy = KeyDerivation::for_upload(kind, config).await?;
    let recipe = if kind.writes_keys() {
        Some(KeyRecipeWriter::create(
            &config.paths.recipe_dir,
            &name,
            &config.paths.key_recipe_suffix,
        )?)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let sender = Sender::new(
        conn,
        strategy,
        recipe,
        rx,
        config.client.chunk_batch_items,
        config.client.recipe_batch_items,
    );

    let file_size: u64 = chunks.iter().map(|c| c.len() as u64).sum();
    let end = FileRecipeHeader {
        file_size,
        total_chunk_num: chunks.len() as u64,
        file_name_hash: name,
    };
    for chunk in chunks {
        tx.send(WorkItem::Chunk(Bytes::copy_from_slice(chunk)))
            .await
            .map_err(|_| anyhow!("sender stopped accepting work items"))?;
    }
    tx.send(WorkItem::End(end))
        .await
        .map_err(|_| anyhow!("sender stopped accepting work items"))?;
    drop(tx);

    sender.run(name).await
}

/// Restore a file under the given strategy, collecting the plaintext.
pub async fn download_chunks(
    config: &SealConfig,
    kind: StrategyKind,
    file_name: &str,
) -> Result<(DownloadStats, Vec<u8>)> {
    let name = file_name_hash(file_name, config.client.client_id);
    let conn = Connection::connect(
        &config.storage.host,
        config.storage.port,
        config.client.client_id,
    )
    .await?;
    let recipe = if kind.writes_keys() {
        Some(KeyRecipeReader::open(
            &config.paths.recipe_dir,
            &name,
            &config.paths.key_recipe_suffix,
        )?)
    } else {
        None
    };

    let (tx, mut rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let retriever = Retriever::new(conn, recipe, tx);
    let collector = tokio::spawn(async move {
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.extend_from_slice(&chunk);
        }
        out
    });

    let stats = retriever.run(name).await?;
    let bytes = collector.await?;
    Ok((stats, bytes))
}

// ── Config and paths ──────────────────────────────────────────────────────────

pub fn test_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sealstore-it-{tag}-{}", std::process::id()))
}

/// Config pointing at the loopback servers, with batch sizes small
/// enough that a handful of chunks spans several batches.
pub fn test_config(storage: SocketAddr, key_manager: Option<SocketAddr>, tag: &str) -> SealConfig {
    let mut config = SealConfig::default();
    config.client.client_id = 7;
    config.client.chunk_batch_items = 2;
    config.client.recipe_batch_items = 3;
    config.client.read_unit_bytes = 64 * 1024;
    config.storage.host = storage.ip().to_string();
    config.storage.port = storage.port();
    if let Some(km) = key_manager {
        config.key_manager.host = km.ip().to_string();
        config.key_manager.port = km.port();
    }
    config.key_manager.public_key_path = test_dir(tag).join("key-manager.pem");
    config.paths.recipe_dir = test_dir(tag).join("recipes");
    config
}

/// Write the signer's public half where the blinded strategy expects it.
pub fn write_public_key_pem(config: &SealConfig, key: &RsaPrivateKey) -> Result<()> {
    let pem = key.to_public_key().to_public_key_pem(LineEnding::LF)?;
    if let Some(parent) = config.key_manager.public_key_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config.key_manager.public_key_path, pem)?;
    Ok(())
}

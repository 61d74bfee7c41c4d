//! Failure-path tests: tampered or short-changed stores, and peers that
//! break the session protocol. Every one must fail the transfer loudly
//! rather than hand back wrong bytes.

use tokio::net::TcpListener;
use zerocopy::AsBytes;

use sealstore_client::{Connection, StrategyKind};
use sealstore_core::crypto::file_name_hash;
use sealstore_core::wire::{FileRecipeHeader, MessageType, HASH_SIZE};

use crate::{download_chunks, test_config, test_dir, upload_chunks, MockStorage};

async fn seeded_storage(
    tag: &str,
) -> (MockStorage, sealstore_core::config::SealConfig, [u8; HASH_SIZE]) {
    let storage = MockStorage::start().await.unwrap();
    let config = test_config(storage.addr, None, tag);
    let chunks = vec![vec![0xaa; 300], vec![0xbb; 300], vec![0xcc; 300]];
    upload_chunks(&config, StrategyKind::Convergent, tag, &chunks)
        .await
        .unwrap();
    let name = file_name_hash(tag, config.client.client_id);
    storage.stored(&name).await;
    (storage, config, name)
}

#[tokio::test]
async fn extra_chunk_exhausts_the_key_recipe() {
    let (storage, config, name) = seeded_storage("fail-extra").await;

    // the server delivering a chunk that was never uploaded means the
    // local recipe runs dry at that position
    {
        let mut store = storage.store.lock().unwrap();
        let file = store.get_mut(&name).unwrap();
        let duplicate = file.chunks.last().unwrap().clone();
        file.chunks.push(duplicate);
        file.total_chunk_num += 1;
    }

    let err = download_chunks(&config, StrategyKind::Convergent, "fail-extra")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no more keys"), "got: {err:#}");

    let _ = std::fs::remove_dir_all(test_dir("fail-extra"));
}

#[tokio::test]
async fn missing_chunk_fails_the_count_check() {
    let (storage, config, name) = seeded_storage("fail-missing").await;

    {
        let mut store = storage.store.lock().unwrap();
        let file = store.get_mut(&name).unwrap();
        file.chunks.pop();
    }

    let err = download_chunks(&config, StrategyKind::Convergent, "fail-missing")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("delivered 2 chunks"), "got: {err:#}");

    let _ = std::fs::remove_dir_all(test_dir("fail-missing"));
}

#[tokio::test]
async fn tampered_ciphertext_fails_authentication() {
    let (storage, config, name) = seeded_storage("fail-tamper").await;

    {
        let mut store = storage.store.lock().unwrap();
        let file = store.get_mut(&name).unwrap();
        file.chunks[0][5] ^= 0xff;
    }

    let err = download_chunks(&config, StrategyKind::Convergent, "fail-tamper")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("authentication"), "got: {err:#}");

    let _ = std::fs::remove_dir_all(test_dir("fail-tamper"));
}

#[tokio::test]
async fn overstated_file_size_fails_the_restore() {
    let (storage, config, name) = seeded_storage("fail-size").await;

    {
        let mut store = storage.store.lock().unwrap();
        let file = store.get_mut(&name).unwrap();
        file.file_size += 1;
    }

    let err = download_chunks(&config, StrategyKind::Convergent, "fail-size")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("restored"), "got: {err:#}");

    let _ = std::fs::remove_dir_all(test_dir("fail-size"));
}

#[tokio::test]
async fn unexpected_login_reply_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::from_stream(stream, 0);
        let _ = conn.recv().await;
        let _ = conn.send(MessageType::RestoreChunk, 0, &[]).await;
    });

    let config = test_config(addr, None, "fail-login");
    let err = upload_chunks(&config, StrategyKind::Plain, "fail-login", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("upload login"), "got: {err:#}");
}

#[tokio::test]
async fn stray_message_mid_restore_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::from_stream(stream, 0);
        let _ = conn.recv().await;
        let stored = FileRecipeHeader {
            file_size: 0,
            total_chunk_num: 0,
            file_name_hash: [0; HASH_SIZE],
        };
        let _ = conn
            .send(MessageType::LoginResponse, 0, stored.as_bytes())
            .await;
        let _ = conn.recv().await; // RestoreReady
        let _ = conn.send(MessageType::UploadChunk, 0, &[]).await;
    });

    let config = test_config(addr, None, "fail-stray");
    let err = download_chunks(&config, StrategyKind::Plain, "fail-stray")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("during restore"), "got: {err:#}");
}

//! sealstore — command-line client for sealed chunk storage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use sealstore_client::{
    Chunker, Connection, KeyDerivation, Retriever, RestoreWriter, Sender, StrategyKind,
};
use sealstore_core::config::SealConfig;
use sealstore_core::crypto::file_name_hash;
use sealstore_core::recipe::{KeyRecipeReader, KeyRecipeWriter};
use sealstore_core::wire::CHUNK_QUEUE_DEPTH;

const DEFAULT_STRATEGY: StrategyKind = StrategyKind::Convergent;

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_upload(config: &SealConfig, kind: StrategyKind, file: &str) -> Result<()> {
    let hash = file_name_hash(file, config.client.client_id);
    let started = std::time::Instant::now();

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
            &hash,
            &config.paths.key_recipe_suffix,
        )?)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let chunker = Chunker::new(
        PathBuf::from(file),
        hash,
        config.client.read_unit_bytes,
        tx,
    );
    let sender = Sender::new(
        conn,
        strategy,
        recipe,
        rx,
        config.client.chunk_batch_items,
        config.client.recipe_batch_items,
    );

    let chunker_task = tokio::spawn(chunker.run());
    let send_result = sender.run(hash).await;
    // surface the chunker's error first: a dead chunker is usually why
    // the sender failed
    chunker_task.await.context("chunker task failed")??;
    let stats = send_result?;

    let seconds = started.elapsed().as_secs_f64();
    println!(
        "Uploaded {} with {} strategy: {} chunks, {} bytes in, {} bytes sealed, {:.2}s, {:.2} MiB/s",
        file,
        kind,
        stats.chunks,
        stats.plain_bytes,
        stats.cipher_bytes,
        seconds,
        mib_per_sec(stats.plain_bytes, seconds)
    );
    Ok(())
}

async fn cmd_download(
    config: &SealConfig,
    kind: StrategyKind,
    file: &str,
    output: &str,
) -> Result<()> {
    let hash = file_name_hash(file, config.client.client_id);
    let started = std::time::Instant::now();

    let conn = Connection::connect(
        &config.storage.host,
        config.storage.port,
        config.client.client_id,
    )
    .await?;
    let recipe = if kind.writes_keys() {
        Some(KeyRecipeReader::open(
            &config.paths.recipe_dir,
            &hash,
            &config.paths.key_recipe_suffix,
        )?)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
    let writer = RestoreWriter::new(PathBuf::from(output), rx);
    let retriever = Retriever::new(conn, recipe, tx);

    let writer_task = tokio::spawn(writer.run());
    let stats = retriever.run(hash).await?;
    let bytes_written = writer_task.await.context("writer task failed")??;

    let seconds = started.elapsed().as_secs_f64();
    println!(
        "Restored {} to {}: {} chunks, {} bytes, {:.2}s, {:.2} MiB/s",
        file,
        output,
        stats.chunks,
        bytes_written,
        seconds,
        mib_per_sec(bytes_written, seconds)
    );
    Ok(())
}

fn mib_per_sec(bytes: u64, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    bytes as f64 / (1024.0 * 1024.0) / seconds
}

fn print_usage() {
    println!("Usage: sealstore [--strategy <name>] <command>");
    println!();
    println!("Commands:");
    println!("  upload <file>              Seal and upload a file");
    println!("  download <file> <output>   Restore a file to <output>");
    println!();
    println!("Options:");
    println!("  --strategy <name>   plain, convergent, threshold, or blinded");
    println!("                      (default: {DEFAULT_STRATEGY})");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = SealConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = SealConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SealConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --strategy option
    let mut kind = DEFAULT_STRATEGY;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--strategy" {
            i += 1;
            kind = args
                .get(i)
                .context("--strategy requires a value")?
                .parse()?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["upload", file] => cmd_upload(&config, kind, file).await,
        ["download", file, output] => cmd_download(&config, kind, file, output).await,
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

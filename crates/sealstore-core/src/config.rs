//! Configuration system for sealstore.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SEALSTORE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/sealstore/config.toml
//!   3. ~/.config/sealstore/config.toml
//!
//! The loaded value is constructed once in the binary and passed by
//! reference into each component. No component reads configuration on
//! its own.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub client: ClientConfig,
    pub storage: StorageConfig,
    pub key_manager: KeyManagerConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client identifier echoed in every wire message.
    pub client_id: u32,
    /// Chunks accumulated before a chunk batch is flushed to the server.
    pub chunk_batch_items: u32,
    /// Recipe entries accumulated before a recipe batch is flushed.
    /// Flushes independently of the chunk batch.
    pub recipe_batch_items: u32,
    /// Bytes read from the input file per read call during chunking.
    pub read_unit_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyManagerConfig {
    pub host: String,
    pub port: u16,
    /// PEM file holding the key manager's RSA public key.
    /// Required by the blinded strategy only.
    pub public_key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding local key recipe files.
    pub recipe_dir: PathBuf,
    /// Suffix appended to the hex file name hash of each key recipe file.
    pub key_recipe_suffix: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            storage: StorageConfig::default(),
            key_manager: KeyManagerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: 1,
            chunk_batch_items: 256,
            recipe_batch_items: 1024,
            read_unit_bytes: 128 * 1024 * 1024, // 128 MiB
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 16666,
        }
    }
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 16667,
            public_key_path: config_dir().join("key-manager.pem"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            recipe_dir: data_dir().join("recipes"),
            key_recipe_suffix: "-client-key".to_string(),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("sealstore")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("sealstore")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SealConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            SealConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SEALSTORE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write the default config to the config file path if none exists.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&SealConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SEALSTORE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SEALSTORE_CLIENT__CLIENT_ID") {
            if let Ok(id) = v.parse() {
                self.client.client_id = id;
            }
        }
        if let Ok(v) = std::env::var("SEALSTORE_STORAGE__HOST") {
            self.storage.host = v;
        }
        if let Ok(v) = std::env::var("SEALSTORE_STORAGE__PORT") {
            if let Ok(p) = v.parse() {
                self.storage.port = p;
            }
        }
        if let Ok(v) = std::env::var("SEALSTORE_KEY_MANAGER__HOST") {
            self.key_manager.host = v;
        }
        if let Ok(v) = std::env::var("SEALSTORE_KEY_MANAGER__PORT") {
            if let Ok(p) = v.parse() {
                self.key_manager.port = p;
            }
        }
        if let Ok(v) = std::env::var("SEALSTORE_PATHS__RECIPE_DIR") {
            self.paths.recipe_dir = PathBuf::from(v);
        }
    }
}

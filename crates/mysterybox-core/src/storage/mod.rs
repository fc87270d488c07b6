//! Durable key-value storage and configuration.
//!
//! Everything the runtime persists (streak counters, the offline mint queue,
//! app overrides) is a string value under a string key. Reads tolerate
//! absence; callers decide what a malformed value means.

pub mod config;
mod kv;

pub use config::Config;
pub use kv::{KeyValueStore, MemoryStore, SqliteStore};

use std::path::PathBuf;

use crate::error::StorageError;

/// Returns `~/.config/mysterybox[-dev]/` based on MYSTERYBOX_ENV.
///
/// Set MYSTERYBOX_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("MYSTERYBOX_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("mysterybox-dev")
    } else {
        base_dir.join("mysterybox")
    };

    std::fs::create_dir_all(&dir).map_err(|e| StorageError::DataDir(e.to_string()))?;
    Ok(dir)
}

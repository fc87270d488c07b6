//! Core error types for mysterybox-core.
//!
//! This module defines the error hierarchy shared by every runtime
//! component, using thiserror for display and source chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for mysterybox-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad input to a component (e.g. a non-positive outcome range)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-2xx response from the ledger gateway
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Connectivity-class failure (DNS, connect, timeout)
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// HTTP failure that retrying later will not fix (bad URL, decode error)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Native idle detection could not be used
    #[error("Idle detection error: {0}")]
    Idle(#[from] IdleError),

    /// The mint endpoint answered with an application-level rejection
    #[error("Mint failed {status}: {body}")]
    MintRejected { status: u16, body: String },

    /// Connected account belongs to another network
    #[error("Connected account {address} is not on the expected network (expected {expected_prefix})")]
    WrongNetwork {
        address: String,
        expected_prefix: String,
    },

    /// An operation needs a connected wallet account
    #[error("Connect wallet first")]
    NotConnected,

    /// The OS entropy source failed
    #[error("Entropy source failed: {0}")]
    Entropy(String),

    /// Key-value storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Gateway error carrying the HTTP status and the raw response text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Gateway {status}: {body}")]
pub struct GatewayError {
    pub status: u16,
    pub body: String,
}

/// Reasons the native idle detector is not used.
///
/// The idle guard recovers from all of these by switching to the
/// activity-tracking fallback; they never reach the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdleError {
    /// Permission to observe user idleness was refused
    #[error("idle detection permission denied")]
    PermissionDenied,

    /// The host offers no native idle detector
    #[error("idle detection not available")]
    CapabilityUnavailable,

    /// The detector failed at runtime
    #[error("idle detector failed: {0}")]
    Detector(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The store is locked by another writer
    #[error("Store is locked")]
    Locked,

    /// The data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            CoreError::Http(err.to_string())
        } else if err.is_connect() || err.is_timeout() || err.is_request() {
            CoreError::NetworkUnavailable(err.to_string())
        } else if let Some(status) = err.status() {
            CoreError::Gateway(GatewayError {
                status: status.as_u16(),
                body: err.to_string(),
            })
        } else {
            CoreError::Http(err.to_string())
        }
    }
}

impl CoreError {
    /// Whether this failure means "offline" rather than "refused".
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CoreError::NetworkUnavailable(_))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

//! Error types for bucket-cache
//!
//! All modules use `CacheResult<T>` as their return type. Remote adapters
//! report failures through [`RemoteError`](crate::store::RemoteError) and
//! [`ConnectError`](crate::store::ConnectError); the client wraps those with
//! the operation, key and bucket before they reach the caller.

use crate::store::{ConnectError, RemoteError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bucket-cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in bucket-cache
#[derive(Error, Debug)]
pub enum CacheError {
    // Connection errors
    #[error("Bucket unavailable: {bucket}: {source}")]
    Configuration {
        bucket: String,
        #[source]
        source: ConnectError,
    },

    #[error("Transport error talking to bucket {bucket}: {message}")]
    Transport { bucket: String, message: String },

    // Remote operation errors
    #[error("Store of {key} into bucket {bucket} failed: {source}")]
    Store {
        key: String,
        bucket: String,
        #[source]
        source: RemoteError,
    },

    #[error("Load of {key} from bucket {bucket} failed: {source}")]
    Load {
        key: String,
        bucket: String,
        #[source]
        source: RemoteError,
    },

    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    // Credential errors
    #[error("GCP not authenticated. Run: gcloud auth login")]
    GcpNotAuthenticated,

    #[error("GCP credential error: {0}")]
    GcpCredential(String),

    // Configuration errors
    #[error("No bucket configured")]
    BucketNotConfigured,

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::GcpNotAuthenticated
            | Self::Configuration {
                source: ConnectError::NotAuthenticated,
                ..
            } => Some("Run: gcloud auth login"),
            Self::BucketNotConfigured => {
                Some("Pass --bucket, set BUCKET_CACHE_BUCKET, or set bucket.name in the config file")
            }
            Self::Configuration { .. } => {
                Some("Check the bucket name and that the active account can read it")
            }
            Self::Store { source, .. } | Self::Load { source, .. }
                if source.is_reauthentication_likely() =>
            {
                Some("Credentials look expired; the next operation will re-authenticate")
            }
            _ => None,
        }
    }
}

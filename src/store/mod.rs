//! Remote object store abstraction
//!
//! The cache client only talks to these traits. Adapters translate their
//! backend's responses into [`RemoteError`] so the client classifies data
//! rather than library-specific error types:
//! - `gcs`: Google Cloud Storage JSON API
//! - `memory`: in-process store for tests and embedding hosts

pub mod gcs;
pub mod memory;

pub use gcs::GcsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Status codes that suggest expired or invalid credentials
const REAUTHENTICATION_STATUSES: [u16; 3] = [400, 401, 403];

/// An object read back from a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub payload: Vec<u8>,

    /// Creation time as recorded by the store; a re-upload resets it
    pub created_at: DateTime<Utc>,
}

/// Failure of an object operation on an open bucket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("object not found")]
    NotFound,

    #[error("authentication failure (status {code}): {message}")]
    AuthFailure { code: u16, message: String },

    #[error("remote failure (status {code}): {message}")]
    Other { code: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Classify a non-success response to a read.
    ///
    /// Some store clients report a missing object as an error whose text
    /// carries "404" instead of a structured empty result. On reads, any
    /// message containing that token is normalized to
    /// [`RemoteError::NotFound`] here, so the client only ever sees the clean
    /// variant.
    pub fn from_read_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if REAUTHENTICATION_STATUSES.contains(&code) {
            return Self::AuthFailure { code, message };
        }
        if code == 404 || message.contains("404") {
            return Self::NotFound;
        }
        Self::Other { code, message }
    }

    /// Classify a non-success response to a write. The status is kept as is.
    pub fn from_write_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if REAUTHENTICATION_STATUSES.contains(&code) {
            return Self::AuthFailure { code, message };
        }
        Self::Other { code, message }
    }

    /// True when the cached connection should be dropped and rebuilt
    pub fn is_reauthentication_likely(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }

    /// Status code reported by the store, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound => Some(404),
            Self::AuthFailure { code, .. } | Self::Other { code, .. } => Some(*code),
            Self::Transport(_) => None,
        }
    }
}

/// Failure to open a bucket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("bucket does not exist or is not visible with current credentials: {0}")]
    BucketUnavailable(String),

    #[error("no usable ambient credentials: {0}")]
    Credentials(String),

    #[error("not logged in to gcloud")]
    NotAuthenticated,

    #[error("invalid storage endpoint {0}")]
    InvalidEndpoint(String),

    #[error("{0}")]
    Transport(String),
}

/// A store that can resolve named buckets
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolve credentials and look up the bucket
    async fn open_bucket(&self, name: &str) -> Result<Arc<dyn Bucket>, ConnectError>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// An authenticated handle to one bucket
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Create or overwrite the object called `name`
    async fn put(&self, name: &str, payload: &[u8]) -> Result<(), RemoteError>;

    /// Read the object called `name`
    async fn get(&self, name: &str) -> Result<RemoteObject, RemoteError>;
}

//! bucket-cache - remote build-artifact cache
//!
//! Stores build outputs under content keys in a cloud storage bucket and
//! keeps entries that are still being read alive against an age-based
//! garbage collector by re-uploading them once they pass a refresh interval.

pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod key;
pub mod store;

pub use client::{BuildCacheService, CacheClient, CacheEntry, ConnectionStatus};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;

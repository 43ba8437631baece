//! Cache keys
//!
//! A key is the content fingerprint a build tool hands to the cache. It is
//! used verbatim as the remote object name, so it is restricted to characters
//! every supported object store accepts without escaping surprises.

use crate::error::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Longest object name the remote stores accept
const MAX_KEY_LEN: usize = 1024;

/// Validated, immutable cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate a caller-supplied key
    pub fn parse(raw: impl Into<String>) -> CacheResult<Self> {
        let raw = raw.into();
        let invalid = |reason: &str| CacheError::InvalidKey {
            key: raw.clone(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("key is empty"));
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(invalid("key exceeds 1024 bytes"));
        }
        if raw == "." || raw == ".." {
            return Err(invalid("'.' and '..' are not valid object names"));
        }
        if raw.starts_with('/') {
            return Err(invalid("key must not start with '/'"));
        }
        if let Some(c) = raw.chars().find(|c| !is_key_char(*c)) {
            return Err(invalid(&format!("unsupported character {:?}", c)));
        }

        Ok(Self(raw))
    }

    /// Derive a key from content: lowercase hex SHA-256
    pub fn digest(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hex::encode(hasher.finalize()))
    }

    /// The key as the remote object name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> CacheResult<Self> {
        Self::parse(s)
    }
}

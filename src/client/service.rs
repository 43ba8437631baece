//! Host-facing cache service contract
//!
//! Build tools hand the cache a reader to pull an artifact from and a writer
//! to push a hit into. The store side drains its reader into memory before
//! uploading, since the upload needs a known length.

use super::CacheClient;
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Key-value cache service consumed by a host build system
#[async_trait]
pub trait BuildCacheService: Send + Sync {
    /// Drain `source` and store it under `key`
    async fn store(
        &self,
        key: &CacheKey,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> CacheResult<()>;

    /// Write the entry for `key` into `sink`; returns false on a miss
    async fn load(
        &self,
        key: &CacheKey,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> CacheResult<bool>;

    /// End of the cache session
    async fn close(&self) -> CacheResult<()>;
}

#[async_trait]
impl BuildCacheService for CacheClient {
    async fn store(
        &self,
        key: &CacheKey,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> CacheResult<()> {
        let mut payload = Vec::new();
        source
            .read_to_end(&mut payload)
            .await
            .map_err(|e| CacheError::io(format!("reading artifact for {}", key), e))?;

        CacheClient::store(self, key, &payload).await
    }

    async fn load(
        &self,
        key: &CacheKey,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> CacheResult<bool> {
        let Some(entry) = self.fetch(key).await? else {
            return Ok(false);
        };

        sink.write_all(&entry.payload)
            .await
            .map_err(|e| CacheError::io(format!("writing artifact for {}", key), e))?;
        sink.flush()
            .await
            .map_err(|e| CacheError::io(format!("flushing artifact for {}", key), e))?;

        // The caller already has the bytes; a refresh failure still reports
        // as an error rather than a miss.
        self.refresh_if_due(key, &entry).await?;
        Ok(true)
    }

    async fn close(&self) -> CacheResult<()> {
        CacheClient::close(self).await
    }
}

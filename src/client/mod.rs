//! Cache client
//!
//! Key-addressed store and load against one remote bucket. The client keeps
//! a shared bucket handle, drops it when the store answers with a
//! reauthentication-likely status, and reopens it on the next call. Loads of
//! entries older than the refresh interval re-upload the same bytes so an
//! external age-based garbage collector keeps artifacts that are still read.

mod connection;
mod service;

pub use connection::ConnectionStatus;
pub use service::BuildCacheService;

use crate::clock::{Clock, SystemClock};
use crate::config::{BucketConfig, Config, RefreshMode};
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use crate::store::{ConnectError, GcsStore, ObjectStore, RemoteError};
use chrono::{DateTime, Utc};
use connection::{Connection, ConnectionSlot};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// A cache hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub payload: Vec<u8>,

    /// Creation time recorded by the store when the entry was read
    pub created_at: DateTime<Utc>,
}

struct ClientInner {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    refresh_after: Option<chrono::Duration>,
    refresh_mode: RefreshMode,
    clock: Arc<dyn Clock>,
    connection: ConnectionSlot,
    background: Mutex<JoinSet<()>>,
}

/// Remote build cache client
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<ClientInner>,
}

impl CacheClient {
    /// Build a GCS-backed client from configuration and connect to the bucket
    pub async fn from_config(config: &Config) -> CacheResult<Self> {
        config.validate()?;
        let store = Arc::new(GcsStore::new(config.gcs.clone()));
        Self::connect(store, &config.bucket).await
    }

    /// Create a client and connect eagerly.
    ///
    /// Fails with [`CacheError::Configuration`] when the bucket is missing or
    /// not visible, and [`CacheError::Transport`] when the store is unreachable.
    pub async fn connect(store: Arc<dyn ObjectStore>, config: &BucketConfig) -> CacheResult<Self> {
        Self::connect_with_clock(store, config, Arc::new(SystemClock)).await
    }

    /// Like [`CacheClient::connect`], reading "now" from `clock`
    pub async fn connect_with_clock(
        store: Arc<dyn ObjectStore>,
        config: &BucketConfig,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        let refresh_after = config
            .refresh_after()
            .and_then(|d| chrono::Duration::from_std(d).ok());

        let client = Self {
            inner: Arc::new(ClientInner {
                store,
                bucket: config.name.clone(),
                refresh_after,
                refresh_mode: config.refresh_mode,
                clock,
                connection: ConnectionSlot::new(),
                background: Mutex::new(JoinSet::new()),
            }),
        };

        client.ensure_connected().await?;
        Ok(client)
    }

    /// Bucket this client reads and writes
    pub fn bucket(&self) -> &str {
        &self.inner.bucket
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        self.inner.connection.status().await
    }

    /// Upload `payload` as the object named `key`, replacing any existing entry
    pub async fn store(&self, key: &CacheKey, payload: &[u8]) -> CacheResult<()> {
        let conn = self.ensure_connected().await?;

        match conn.bucket.put(key.as_str(), payload).await {
            Ok(()) => {
                debug!("Stored {} ({} bytes)", key, payload.len());
                Ok(())
            }
            Err(e) => {
                self.invalidate_on_auth_failure(&conn, &e).await;
                Err(CacheError::Store {
                    key: key.to_string(),
                    bucket: self.inner.bucket.clone(),
                    source: e,
                })
            }
        }
    }

    /// Read the entry for `key`; `Ok(None)` is a cache miss.
    ///
    /// A hit older than the refresh interval is re-uploaded before this
    /// returns (or on a background task, depending on the refresh mode).
    pub async fn load(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let Some(entry) = self.fetch(key).await? else {
            return Ok(None);
        };
        self.refresh_if_due(key, &entry).await?;
        Ok(Some(entry))
    }

    /// Wait for background refreshes started by earlier loads.
    ///
    /// Bucket handles need no teardown, so this is all `close` does.
    pub async fn close(&self) -> CacheResult<()> {
        let mut tasks = self.inner.background.lock().await;
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                warn!("Background refresh task failed: {}", e);
            }
        }
        debug!("Closed cache client for bucket {}", self.inner.bucket);
        Ok(())
    }

    /// Download without refreshing
    pub(crate) async fn fetch(&self, key: &CacheKey) -> CacheResult<Option<CacheEntry>> {
        let conn = self.ensure_connected().await?;

        match conn.bucket.get(key.as_str()).await {
            Ok(obj) => {
                debug!("Cache hit for {} ({} bytes)", key, obj.payload.len());
                Ok(Some(CacheEntry {
                    payload: obj.payload,
                    created_at: obj.created_at,
                }))
            }
            Err(RemoteError::NotFound) => {
                debug!("Cache miss for {}", key);
                Ok(None)
            }
            Err(e) => {
                self.invalidate_on_auth_failure(&conn, &e).await;
                Err(CacheError::Load {
                    key: key.to_string(),
                    bucket: self.inner.bucket.clone(),
                    source: e,
                })
            }
        }
    }

    /// True when `created_at` is strictly older than the refresh interval
    pub fn is_refresh_due(&self, created_at: DateTime<Utc>) -> bool {
        match self.inner.refresh_after {
            Some(interval) => self.inner.clock.now() - created_at > interval,
            None => false,
        }
    }

    /// Re-upload `entry` when it is old enough; returns whether a refresh ran
    pub(crate) async fn refresh_if_due(&self, key: &CacheKey, entry: &CacheEntry) -> CacheResult<bool> {
        if !self.is_refresh_due(entry.created_at) {
            return Ok(false);
        }

        match self.inner.refresh_mode {
            RefreshMode::Blocking => {
                info!("Refreshing {} (created {})", key, entry.created_at);
                self.store(key, &entry.payload)
                    .await
                    .map_err(|e| refresh_failure(&self.inner.bucket, key, e))?;
            }
            RefreshMode::Background => {
                info!(
                    "Scheduling refresh of {} (created {})",
                    key, entry.created_at
                );
                let client = self.clone();
                let key = key.clone();
                let payload = entry.payload.clone();
                let mut tasks = self.inner.background.lock().await;
                while tasks.try_join_next().is_some() {}
                tasks.spawn(async move {
                    if let Err(e) = client.store(&key, &payload).await {
                        warn!("Background refresh of {} failed: {}", key, e);
                    }
                });
            }
        }
        Ok(true)
    }

    async fn ensure_connected(&self) -> CacheResult<Connection> {
        let bucket = &self.inner.bucket;
        self.inner
            .connection
            .acquire(self.inner.store.as_ref(), bucket)
            .await
            .map_err(|e| match e {
                ConnectError::Transport(message) => CacheError::Transport {
                    bucket: bucket.clone(),
                    message,
                },
                source => CacheError::Configuration {
                    bucket: bucket.clone(),
                    source,
                },
            })
    }

    async fn invalidate_on_auth_failure(&self, conn: &Connection, err: &RemoteError) {
        if !err.is_reauthentication_likely() {
            return;
        }
        if self.inner.connection.invalidate(conn.generation).await {
            warn!(
                "Dropping connection to bucket {} after {}; next operation reconnects",
                self.inner.bucket, err
            );
        }
    }
}

/// A refresh is a store: a reconnect that fails on its way there is reported
/// as a failed store of `key`
fn refresh_failure(bucket: &str, key: &CacheKey, err: CacheError) -> CacheError {
    match err {
        CacheError::Configuration { .. } | CacheError::Transport { .. } => CacheError::Store {
            key: key.to_string(),
            bucket: bucket.to_string(),
            source: RemoteError::Transport(format!("reconnect before refresh failed: {}", err)),
        },
        other => other,
    }
}

//! In-process object store
//!
//! Behaves like a remote bucket: overwrites replace content and reset the
//! creation time, missing objects come back as [`RemoteError::NotFound`].
//! Failures can be injected one call at a time; injected failures are
//! classified by [`RemoteError::from_write_status`] and
//! [`RemoteError::from_read_status`] exactly like a real adapter's responses.

use super::{Bucket, ConnectError, ObjectStore, RemoteError, RemoteObject};
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct MemoryState {
    buckets: HashMap<String, HashMap<String, RemoteObject>>,
    hidden: HashSet<String>,
    open_failures: VecDeque<ConnectError>,
    put_failures: VecDeque<RemoteError>,
    get_failures: VecDeque<RemoteError>,
    opens: usize,
    puts: usize,
    gets: usize,
}

/// Object store held in memory
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Store with no buckets, stamping objects with the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store with no buckets, stamping objects with `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// Create an empty bucket
    pub async fn create_bucket(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.buckets.entry(name.to_string()).or_default();
    }

    /// Make an existing bucket invisible, as if credentials lost access
    pub async fn hide_bucket(&self, name: &str) {
        self.state.lock().await.hidden.insert(name.to_string());
    }

    /// Fail the next `open_bucket` call
    pub async fn fail_next_open(&self, err: ConnectError) {
        self.state.lock().await.open_failures.push_back(err);
    }

    /// Fail the next `put` with a store response
    pub async fn fail_next_put(&self, status: u16, message: &str) {
        let err = RemoteError::from_write_status(status, message);
        self.state.lock().await.put_failures.push_back(err);
    }

    /// Fail the next `get` with a store response
    pub async fn fail_next_get(&self, status: u16, message: &str) {
        let err = RemoteError::from_read_status(status, message);
        self.state.lock().await.get_failures.push_back(err);
    }

    /// Fail the next `get` below the HTTP layer
    pub async fn fail_next_get_transport(&self, message: &str) {
        let err = RemoteError::Transport(message.to_string());
        self.state.lock().await.get_failures.push_back(err);
    }

    /// Number of `open_bucket` calls that reached the store
    pub async fn open_count(&self) -> usize {
        self.state.lock().await.opens
    }

    /// Number of `put` calls that reached the store
    pub async fn put_count(&self) -> usize {
        self.state.lock().await.puts
    }

    /// Number of `get` calls that reached the store
    pub async fn get_count(&self) -> usize {
        self.state.lock().await.gets
    }

    /// Direct read that bypasses counters and injected failures
    pub async fn object(&self, bucket: &str, name: &str) -> Option<RemoteObject> {
        let state = self.state.lock().await;
        state.buckets.get(bucket)?.get(name).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn open_bucket(&self, name: &str) -> Result<Arc<dyn Bucket>, ConnectError> {
        let mut state = self.state.lock().await;
        state.opens += 1;

        if let Some(err) = state.open_failures.pop_front() {
            return Err(err);
        }
        if !state.buckets.contains_key(name) || state.hidden.contains(name) {
            return Err(ConnectError::BucketUnavailable(name.to_string()));
        }

        debug!("Opened in-memory bucket {}", name);
        Ok(Arc::new(MemoryBucket {
            name: name.to_string(),
            store: self.clone(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryBucket {
    name: String,
    store: MemoryStore,
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn put(&self, name: &str, payload: &[u8]) -> Result<(), RemoteError> {
        let created_at = self.store.clock.now();
        let mut state = self.store.state.lock().await;
        state.puts += 1;

        if let Some(err) = state.put_failures.pop_front() {
            return Err(err);
        }

        let bucket = state
            .buckets
            .get_mut(&self.name)
            .ok_or_else(|| RemoteError::from_write_status(404, "bucket deleted"))?;
        bucket.insert(
            name.to_string(),
            RemoteObject {
                payload: payload.to_vec(),
                created_at,
            },
        );
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<RemoteObject, RemoteError> {
        let mut state = self.store.state.lock().await;
        state.gets += 1;

        if let Some(err) = state.get_failures.pop_front() {
            return Err(err);
        }

        state
            .buckets
            .get(&self.name)
            .and_then(|bucket| bucket.get(name))
            .cloned()
            .ok_or(RemoteError::NotFound)
    }
}

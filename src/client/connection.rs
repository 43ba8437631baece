//! Shared connection state
//!
//! One slot per client holds the current bucket handle. The slot's mutex is
//! held only while checking for a usable handle and, when there is none,
//! opening a new one, so concurrent callers that all see a stale handle
//! reconnect once rather than once each.

use crate::store::{Bucket, ConnectError, ObjectStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Observable state of a client's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No handle has been opened yet, or opening failed
    Disconnected,

    /// A live handle is in use
    Connected { generation: u64 },

    /// The handle hit an authentication failure; the next call reconnects
    Stale { generation: u64 },
}

/// A bucket handle tagged with the connect attempt that produced it
#[derive(Clone)]
pub(crate) struct Connection {
    pub bucket: Arc<dyn Bucket>,
    pub generation: u64,
}

enum SlotState {
    Disconnected,
    Connected(Connection),
    Stale(Connection),
}

struct SlotInner {
    state: SlotState,
    generations: u64,
}

pub(crate) struct ConnectionSlot {
    inner: Mutex<SlotInner>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                state: SlotState::Disconnected,
                generations: 0,
            }),
        }
    }

    /// Return the live handle, opening a new one if there is none
    pub async fn acquire(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
    ) -> Result<Connection, ConnectError> {
        let mut inner = self.inner.lock().await;
        if let SlotState::Connected(conn) = &inner.state {
            return Ok(conn.clone());
        }

        let reconnecting = matches!(inner.state, SlotState::Stale(_));
        let handle = store.open_bucket(bucket).await?;

        inner.generations += 1;
        let conn = Connection {
            bucket: handle,
            generation: inner.generations,
        };
        inner.state = SlotState::Connected(conn.clone());

        if reconnecting {
            info!(
                "Reconnected to {} bucket {} (generation {})",
                store.backend_name(),
                bucket,
                conn.generation
            );
        } else {
            debug!(
                "Connected to {} bucket {} (generation {})",
                store.backend_name(),
                bucket,
                conn.generation
            );
        }
        Ok(conn)
    }

    /// Mark `generation` stale if it is still the current handle.
    ///
    /// Returns false when a newer handle already replaced it, in which case
    /// the newer handle is left alone.
    pub async fn invalidate(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let state = std::mem::replace(&mut inner.state, SlotState::Disconnected);
        let (state, invalidated) = match state {
            SlotState::Connected(conn) if conn.generation == generation => {
                (SlotState::Stale(conn), true)
            }
            other => (other, false),
        };
        inner.state = state;
        invalidated
    }

    pub async fn status(&self) -> ConnectionStatus {
        match &self.inner.lock().await.state {
            SlotState::Disconnected => ConnectionStatus::Disconnected,
            SlotState::Connected(c) => ConnectionStatus::Connected {
                generation: c.generation,
            },
            SlotState::Stale(c) => ConnectionStatus::Stale {
                generation: c.generation,
            },
        }
    }
}

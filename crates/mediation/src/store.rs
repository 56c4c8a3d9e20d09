//! The persistence port and its in-memory implementation.
//!
//! The domain never talks to a database or file directly: it loads a
//! [`ConfigState`] once and then hands every change to
//! [`ConfigStore::commit`] as a single [`Batch`]. Implementations must apply
//! a batch atomically: after a failed commit the stored state is exactly what
//! it was before.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::state::{Batch, ConfigState};
use crate::StoreError;

/// Durable storage for configuration records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads every record. An empty store yields [`ConfigState::default`].
    async fn load(&self) -> Result<ConfigState, StoreError>;

    /// Applies all mutations in `batch` atomically.
    async fn commit(&self, batch: &Batch) -> Result<(), StoreError>;
}

/// Volatile store for tests and throwaway instances.
///
/// [`MemoryStore::fail_commits`] makes every subsequent commit fail with
/// [`StoreError::Unavailable`] so callers can observe rollback behaviour.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<ConfigState>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing state (e.g. a fixture).
    pub fn with_state(state: ConfigState) -> Self {
        Self {
            state: Mutex::new(state),
            failing: AtomicBool::new(false),
        }
    }

    /// Toggles commit failure injection.
    pub fn fail_commits(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// A copy of the committed state.
    pub async fn snapshot(&self) -> ConfigState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<ConfigState, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn commit(&self, batch: &Batch) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "memory store is configured to fail commits".to_string(),
            });
        }
        self.state.lock().await.apply(batch);
        Ok(())
    }
}

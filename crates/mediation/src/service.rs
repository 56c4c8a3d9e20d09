//! The service facade shared by every component.
//!
//! [`MediationService`] owns the cached [`ConfigState`], the store handle and
//! the critical sections. Component operations live in their own modules
//! ([`crate::catalog`], [`crate::registry`], [`crate::binder`],
//! [`crate::deployment`], [`crate::flows`], [`crate::runtime`],
//! [`crate::exchange`]) as further `impl MediationService` blocks.
//!
//! ## Write protocol
//!
//! 1. Take the critical sections for the resources being changed
//!    (registry gate → subnode → flow, always in that order).
//! 2. Read what is needed from the cache and validate.
//! 3. Build one [`Batch`] and commit it to the store.
//! 4. Apply the batch to the cache under its write lock.
//!
//! A failed commit returns before step 4, so the cache and the store both keep
//! their pre-call state.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::locks::KeyedLocks;
use crate::state::{Batch, ConfigState};
use crate::{ConfigStore, FlowId, MediationError, SubnodeId};

/// Entry point for every configuration operation.
pub struct MediationService {
    store: Arc<dyn ConfigStore>,
    state: RwLock<ConfigState>,
    /// Serialises writes to parameters, families, versions and the activation
    /// slot. This is the one global critical section.
    pub(crate) registry_gate: Mutex<()>,
    pub(crate) subnode_locks: KeyedLocks<SubnodeId>,
    pub(crate) flow_locks: KeyedLocks<FlowId>,
}

impl std::fmt::Debug for MediationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediationService").finish_non_exhaustive()
    }
}

impl MediationService {
    /// Loads the configuration from `store` and checks its invariants.
    #[tracing::instrument(skip_all)]
    pub async fn open(store: Arc<dyn ConfigStore>) -> Result<Self, MediationError> {
        let state = store.load().await?;
        state.check_consistency()?;
        tracing::info!(
            parameters = state.parameters.len(),
            families = state.families.len(),
            versions = state.versions.len(),
            subnodes = state.subnodes.len(),
            flows = state.flows.len(),
            active_version = ?state.activation.version_id,
            "Configuration loaded"
        );
        Ok(Self {
            store,
            state: RwLock::new(state),
            registry_gate: Mutex::new(()),
            subnode_locks: KeyedLocks::new(),
            flow_locks: KeyedLocks::new(),
        })
    }

    /// Runs `f` against a consistent view of the configuration.
    pub(crate) async fn read<R>(&self, f: impl FnOnce(&ConfigState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    /// Commits `batch` to the store, then makes it visible.
    pub(crate) async fn commit(&self, batch: Batch) -> Result<(), MediationError> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Err(err) = self.store.commit(&batch).await {
            tracing::error!(error = %err, mutations = batch.len(), "Commit failed; state unchanged");
            return Err(err.into());
        }
        self.state.write().await.apply(&batch);
        tracing::debug!(mutations = batch.len(), "Batch committed");
        Ok(())
    }

    /// A copy of the whole configuration.
    pub async fn snapshot(&self) -> ConfigState {
        self.read(|state| state.clone()).await
    }
}

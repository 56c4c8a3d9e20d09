//! Deployment Coordinator: the single system-wide activation slot.
//!
//! At most one node version across the whole registry is deployed at any
//! instant. Moving the slot from one version to another is one committed
//! batch (old flag cleared, new flag set, slot rewritten), so no observer can
//! see two deployed versions, or none, mid-transition.
//!
//! Exclusivity is global, not per family: one mediation configuration is live
//! at a time. Taking the slot from another family requires `force = true`;
//! without it the call fails with a conflict naming the current holder.

use crate::state::{Mutation, Record};
use crate::{
    ActivationSlot, EntityKind, EntityRef, MediationError, MediationService, NodeVersion,
    NodeVersionId, Timestamp, VersionState,
};

impl MediationService {
    /// The deployed version, if any.
    pub async fn active_version(&self) -> Option<NodeVersion> {
        self.read(|state| state.active_version().cloned()).await
    }

    /// Deploys `version_id`, taking the activation slot from its holder.
    ///
    /// Re-activating the deployed version is a no-op. Replacing a version of
    /// the same family needs no confirmation; replacing another family's
    /// version needs `force`.
    #[tracing::instrument(skip(self))]
    pub async fn activate(
        &self,
        version_id: NodeVersionId,
        force: bool,
    ) -> Result<NodeVersion, MediationError> {
        let _gate = self.registry_gate.lock().await;
        let plan = self
            .read(|state| {
                let target = state
                    .versions
                    .get(&version_id)
                    .ok_or_else(|| MediationError::not_found(EntityKind::NodeVersion, version_id))?;
                if target.state == VersionState::Deprecated {
                    return Err(MediationError::conflict(
                        "deprecated versions cannot be activated",
                        EntityRef::new(EntityKind::NodeVersion, target.id)
                            .labelled(state.version_label(target)),
                    ));
                }

                let previous = state.active_version();
                if let Some(active) = previous {
                    if active.id == target.id {
                        return Ok(None);
                    }
                    if active.family_id != target.family_id && !force {
                        return Err(MediationError::conflict(
                            "another node is active",
                            EntityRef::new(EntityKind::NodeVersion, active.id)
                                .labelled(state.version_label(active)),
                        ));
                    }
                }
                Ok(Some((target.clone(), previous.cloned())))
            })
            .await?;

        let Some((mut target, previous)) = plan else {
            tracing::debug!(%version_id, "Version already active");
            return self.require_version(version_id).await;
        };

        let now = Timestamp::now();
        let mut batch = Vec::with_capacity(3);
        if let Some(mut previous) = previous.clone() {
            previous.is_deployed = false;
            previous.updated_at = now;
            batch.push(Mutation::Put(Record::Version(previous)));
        }
        target.is_deployed = true;
        target.state = VersionState::Active;
        target.updated_at = now;
        batch.push(Mutation::Put(Record::Version(target.clone())));
        batch.push(Mutation::Put(Record::ActivationSlot(ActivationSlot {
            version_id: Some(target.id),
            family_id: Some(target.family_id),
            changed_at: now,
        })));

        self.commit(batch).await?;
        tracing::info!(
            %version_id,
            family_id = %target.family_id,
            replaced = ?previous.as_ref().map(|p| p.id),
            forced = force,
            "Node version activated"
        );
        Ok(target)
    }

    /// Clears `is_deployed` on `version_id`. Idempotent: deactivating an
    /// inactive version returns it unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, version_id: NodeVersionId) -> Result<NodeVersion, MediationError> {
        let _gate = self.registry_gate.lock().await;
        let current = self.require_version(version_id).await?;
        if !current.is_deployed {
            return Ok(current);
        }

        let now = Timestamp::now();
        let mut updated = current;
        updated.is_deployed = false;
        updated.updated_at = now;
        self.commit(vec![
            Mutation::Put(Record::Version(updated.clone())),
            Mutation::Put(Record::ActivationSlot(ActivationSlot {
                version_id: None,
                family_id: None,
                changed_at: now,
            })),
        ])
        .await?;
        tracing::info!(%version_id, "Node version deactivated");
        Ok(updated)
    }

    async fn require_version(&self, version_id: NodeVersionId) -> Result<NodeVersion, MediationError> {
        self.read(|state| state.versions.get(&version_id).cloned())
            .await
            .ok_or_else(|| MediationError::not_found(EntityKind::NodeVersion, version_id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::{ErrorKind, MemoryStore, NewFamily, NewVersion, NodeFamilyId, NodeKind};

    async fn setup() -> (Arc<MemoryStore>, MediationService) {
        let store = Arc::new(MemoryStore::new());
        let svc = MediationService::open(store.clone()).await.unwrap();
        (store, svc)
    }

    async fn family_with_version(svc: &MediationService, name: &str) -> (NodeFamilyId, NodeVersion) {
        let family = svc
            .create_family(NewFamily {
                name: name.to_string(),
                description: String::new(),
                kind: NodeKind::Collector,
            })
            .await
            .unwrap();
        let version = svc
            .create_version(
                family.id,
                NewVersion {
                    script_reference: format!("{name}.py"),
                    changelog: String::new(),
                    parameter_ids: BTreeSet::new(),
                    created_by: None,
                },
            )
            .await
            .unwrap();
        (family.id, version)
    }

    #[tokio::test]
    async fn activation_sets_state_and_slot() {
        let (store, svc) = setup().await;
        let (family_id, v) = family_with_version(&svc, "SFTP Collector").await;
        let active = svc.activate(v.id, false).await.unwrap();
        assert!(active.is_deployed);
        assert_eq!(active.state, VersionState::Active);
        assert_eq!(svc.active_version().await.unwrap().id, v.id);

        let committed = store.snapshot().await;
        assert_eq!(committed.activation.version_id, Some(v.id));
        assert_eq!(committed.activation.family_id, Some(family_id));
    }

    #[tokio::test]
    async fn same_family_swap_needs_no_force() {
        let (_store, svc) = setup().await;
        let (_, v1) = family_with_version(&svc, "SFTP Collector").await;
        let v2 = svc.clone_version(v1.id, None).await.unwrap();
        svc.activate(v1.id, false).await.unwrap();
        svc.activate(v2.id, false).await.unwrap();

        let v1_now = svc.get_version(v1.id).await.unwrap().version;
        assert!(!v1_now.is_deployed);
        assert_eq!(v1_now.state, VersionState::Active);
        assert_eq!(svc.active_version().await.unwrap().id, v2.id);
    }

    #[tokio::test]
    async fn reactivating_the_active_version_is_a_no_op() {
        let (_store, svc) = setup().await;
        let (_, v) = family_with_version(&svc, "SFTP Collector").await;
        let first = svc.activate(v.id, false).await.unwrap();
        let again = svc.activate(v.id, false).await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn deprecated_versions_cannot_be_activated() {
        let (_store, svc) = setup().await;
        let (_, v) = family_with_version(&svc, "SFTP Collector").await;
        svc.deprecate_version(v.id).await.unwrap();
        let err = svc.activate(v.id, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn failed_commit_leaves_previous_holder_deployed() {
        let (store, svc) = setup().await;
        let (_, a) = family_with_version(&svc, "SFTP Collector").await;
        let (_, b) = family_with_version(&svc, "ASN.1 Decoder").await;
        svc.activate(a.id, false).await.unwrap();

        store.fail_commits(true);
        let err = svc.activate(b.id, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        store.fail_commits(false);

        assert_eq!(svc.active_version().await.unwrap().id, a.id);
        assert!(!svc.get_version(b.id).await.unwrap().version.is_deployed);
        let committed = store.snapshot().await;
        assert_eq!(committed.activation.version_id, Some(a.id));
        assert!(committed.check_consistency().is_ok());
    }

    #[tokio::test]
    async fn deactivation_clears_slot() {
        let (store, svc) = setup().await;
        let (_, v) = family_with_version(&svc, "SFTP Collector").await;
        svc.activate(v.id, false).await.unwrap();
        let inactive = svc.deactivate(v.id).await.unwrap();
        assert!(!inactive.is_deployed);
        assert!(svc.active_version().await.is_none());
        assert_eq!(store.snapshot().await.activation.version_id, None);
    }
}

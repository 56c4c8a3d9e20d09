//! Subnode Binder: named instances of a node version with concrete parameter
//! values.
//!
//! Completeness is never stored. A subnode is incomplete while any required
//! parameter of its version has neither an explicit value nor a default, and
//! incomplete subnodes cannot be selected or placed into a flow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::{ConfigState, Mutation, Record, RecordKey};
use crate::{
    EntityKind, EntityRef, MediationError, MediationService, NodeVersionId, Subnode, SubnodeId,
    SubnodeStatus, SubnodeView, Timestamp, VersionState, Violation,
};

/// Input for [`MediationService::create_subnode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubnode {
    pub name: String,
    pub node_version_id: NodeVersionId,
}

impl ConfigState {
    /// The subnode with its derived status.
    pub(crate) fn subnode_view(&self, subnode: &Subnode) -> SubnodeView {
        let status = match self.versions.get(&subnode.node_version_id) {
            Some(version) => {
                SubnodeStatus::from_missing(subnode.missing_required(self.parameters_of(version)))
            }
            None => SubnodeStatus::Incomplete { missing: Vec::new() },
        };
        SubnodeView {
            subnode: subnode.clone(),
            status,
        }
    }

    pub(crate) fn require_subnode(&self, id: SubnodeId) -> Result<&Subnode, MediationError> {
        self.subnodes
            .get(&id)
            .ok_or_else(|| MediationError::not_found(EntityKind::Subnode, id))
    }
}

fn missing_violations(status: &SubnodeStatus) -> Vec<Violation> {
    match status {
        SubnodeStatus::Complete => Vec::new(),
        SubnodeStatus::Incomplete { missing } if missing.is_empty() => {
            vec![Violation::new("node_version_id", "node version no longer exists")]
        }
        SubnodeStatus::Incomplete { missing } => missing
            .iter()
            .map(|key| Violation::new(key.as_str(), "required parameter has no value"))
            .collect(),
    }
}

impl MediationService {
    /// Creates a subnode against any non-deprecated version, seeding each
    /// bound parameter with its default.
    #[tracing::instrument(skip(self, input), fields(name = %input.name, version = %input.node_version_id))]
    pub async fn create_subnode(&self, input: NewSubnode) -> Result<SubnodeView, MediationError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(MediationError::invalid("name", "must not be blank"));
        }

        let _gate = self.registry_gate.lock().await;
        let view = self
            .read(|state| {
                let version = state.versions.get(&input.node_version_id).ok_or_else(|| {
                    MediationError::not_found(EntityKind::NodeVersion, input.node_version_id)
                })?;
                if version.state == VersionState::Deprecated {
                    return Err(MediationError::conflict(
                        "deprecated versions accept no new subnodes",
                        EntityRef::new(EntityKind::NodeVersion, version.id)
                            .labelled(state.version_label(version)),
                    ));
                }
                if state.subnodes_of(version.id).iter().any(|s| s.name == name) {
                    return Err(MediationError::DuplicateName {
                        kind: EntityKind::Subnode,
                        name: name.clone(),
                    });
                }

                let parameter_values: BTreeMap<_, _> = state
                    .parameters_of(version)
                    .into_iter()
                    .filter(|p| !p.default_value.trim().is_empty())
                    .map(|p| (p.id, p.default_value.clone()))
                    .collect();
                let subnode = Subnode {
                    id: SubnodeId::new_random(),
                    name: name.clone(),
                    node_version_id: version.id,
                    parameter_values,
                    is_selected: false,
                    last_updated_at: Timestamp::now(),
                };
                Ok(state.subnode_view(&subnode))
            })
            .await?;

        self.commit(vec![Mutation::Put(Record::Subnode(view.subnode.clone()))])
            .await?;
        tracing::info!(subnode_id = %view.subnode.id, complete = view.status.is_complete(), "Subnode created");
        Ok(view)
    }

    /// Writes parameter values keyed by parameter key.
    ///
    /// All-or-nothing: every unknown key and every value that does not parse as
    /// its parameter's datatype is reported in one validation error, and no
    /// value is written unless all pass. A blank value clears the explicit
    /// value so the parameter default applies again.
    #[tracing::instrument(skip(self, values), fields(keys = values.len()))]
    pub async fn set_parameter_values(
        &self,
        subnode_id: SubnodeId,
        values: BTreeMap<String, String>,
    ) -> Result<SubnodeView, MediationError> {
        let _guard = self.subnode_locks.lock(subnode_id).await;
        let updated = self
            .read(|state| {
                let subnode = state.require_subnode(subnode_id)?;
                let version = state.versions.get(&subnode.node_version_id).ok_or_else(|| {
                    MediationError::not_found(EntityKind::NodeVersion, subnode.node_version_id)
                })?;
                let bound = state.parameters_of(version);

                let mut violations = Vec::new();
                let mut updated = subnode.clone();
                for (key, value) in &values {
                    let Some(parameter) = bound.iter().find(|p| p.key.as_str() == key.trim())
                    else {
                        violations.push(Violation::new(
                            key.as_str(),
                            format!(
                                "not a parameter of {}",
                                state.version_label(version)
                            ),
                        ));
                        continue;
                    };
                    let value = value.trim();
                    if value.is_empty() {
                        updated.parameter_values.remove(&parameter.id);
                        continue;
                    }
                    match parameter.datatype.check(value) {
                        Ok(()) => {
                            updated
                                .parameter_values
                                .insert(parameter.id, value.to_string());
                        }
                        Err(message) => violations.push(Violation::new(key.as_str(), message)),
                    }
                }
                if !violations.is_empty() {
                    return Err(MediationError::Validation { violations });
                }
                updated.last_updated_at = Timestamp::now();
                Ok(updated)
            })
            .await?;

        self.commit(vec![Mutation::Put(Record::Subnode(updated.clone()))])
            .await?;
        let view = self.read(|state| state.subnode_view(&updated)).await;
        tracing::info!(%subnode_id, complete = view.status.is_complete(), "Subnode parameters updated");
        Ok(view)
    }

    /// Marks a complete subnode as selected.
    #[tracing::instrument(skip(self))]
    pub async fn select_subnode(&self, subnode_id: SubnodeId) -> Result<SubnodeView, MediationError> {
        self.set_selected(subnode_id, true).await
    }

    /// Clears the selection flag. Always allowed.
    #[tracing::instrument(skip(self))]
    pub async fn deselect_subnode(&self, subnode_id: SubnodeId) -> Result<SubnodeView, MediationError> {
        self.set_selected(subnode_id, false).await
    }

    async fn set_selected(
        &self,
        subnode_id: SubnodeId,
        selected: bool,
    ) -> Result<SubnodeView, MediationError> {
        let _guard = self.subnode_locks.lock(subnode_id).await;
        let view = self
            .read(|state| {
                let subnode = state.require_subnode(subnode_id)?;
                Ok::<_, MediationError>(state.subnode_view(subnode))
            })
            .await?;
        if selected && !view.status.is_complete() {
            return Err(MediationError::Validation {
                violations: missing_violations(&view.status),
            });
        }
        if view.subnode.is_selected == selected {
            return Ok(view);
        }

        let mut subnode = view.subnode;
        subnode.is_selected = selected;
        subnode.last_updated_at = Timestamp::now();
        self.commit(vec![Mutation::Put(Record::Subnode(subnode.clone()))])
            .await?;
        tracing::info!(%subnode_id, selected, "Subnode selection changed");
        Ok(SubnodeView {
            subnode,
            status: view.status,
        })
    }

    /// Deletes a subnode that no flow references.
    #[tracing::instrument(skip(self))]
    pub async fn delete_subnode(&self, subnode_id: SubnodeId) -> Result<(), MediationError> {
        // Imports place existing subnodes under the gate.
        let _gate = self.registry_gate.lock().await;
        let _guard = self.subnode_locks.lock(subnode_id).await;
        self.read(|state| {
            state.require_subnode(subnode_id)?;
            match state
                .flows
                .values()
                .find(|f| f.nodes.iter().any(|n| n.subnode_id == subnode_id))
            {
                Some(flow) => Err(MediationError::conflict(
                    "subnode is placed in a flow",
                    EntityRef::new(EntityKind::Flow, flow.id).labelled(flow.name.clone()),
                )),
                None => Ok(()),
            }
        })
        .await?;

        self.commit(vec![Mutation::Delete(RecordKey::Subnode(subnode_id))])
            .await?;
        self.subnode_locks.forget(&subnode_id);
        tracing::info!(%subnode_id, "Subnode deleted");
        Ok(())
    }

    pub async fn get_subnode(&self, subnode_id: SubnodeId) -> Result<SubnodeView, MediationError> {
        self.read(|state| state.require_subnode(subnode_id).map(|s| state.subnode_view(s)))
            .await
    }

    /// Subnodes, optionally restricted to one version, ordered by name.
    pub async fn list_subnodes(&self, version: Option<NodeVersionId>) -> Vec<SubnodeView> {
        self.read(|state| {
            let mut views: Vec<SubnodeView> = state
                .subnodes
                .values()
                .filter(|s| version.is_none_or(|v| s.node_version_id == v))
                .map(|s| state.subnode_view(s))
                .collect();
            views.sort_by(|a, b| a.subnode.name.cmp(&b.subnode.name));
            views
        })
        .await
    }
}

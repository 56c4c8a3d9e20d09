//! Node Registry: node families and their numbered versions.
//!
//! A deployed version is immutable. To change it, clone it into a new draft,
//! edit the draft, and activate the draft through the deployment coordinator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::{ConfigState, Mutation, Record, RecordKey};
use crate::{
    Actor, EntityKind, EntityRef, MediationError, MediationService, NodeFamily, NodeFamilyId,
    NodeKind, NodeVersion, NodeVersionId, Parameter, ParameterId, SubnodeView, Timestamp,
    VersionNumber, VersionState, Violation,
};

/// Input for [`MediationService::create_family`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFamily {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: NodeKind,
}

/// Input for [`MediationService::create_version`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVersion {
    pub script_reference: String,
    #[serde(default)]
    pub changelog: String,
    #[serde(default)]
    pub parameter_ids: BTreeSet<ParameterId>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Partial update for an editable version. `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPatch {
    #[serde(default)]
    pub script_reference: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub parameter_ids: Option<BTreeSet<ParameterId>>,
}

/// One row of the family listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub family: NodeFamily,
    pub version_count: usize,
    /// The family's version holding the activation slot, if any.
    pub active_version: Option<NodeVersion>,
    pub latest_version: Option<VersionNumber>,
}

/// A version with its bound parameters and subnodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDetail {
    #[serde(flatten)]
    pub version: NodeVersion,
    pub parameters: Vec<Parameter>,
    pub subnodes: Vec<SubnodeView>,
}

/// A family with every version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyDetail {
    pub family: NodeFamily,
    pub versions: Vec<VersionDetail>,
}

fn resolve_actor(created_by: Option<String>) -> Actor {
    created_by.and_then(Actor::new).unwrap_or_else(Actor::system)
}

fn check_parameters_exist(
    state: &ConfigState,
    ids: &BTreeSet<ParameterId>,
) -> Result<(), MediationError> {
    match ids.iter().find(|id| !state.parameters.contains_key(id)) {
        Some(missing) => Err(MediationError::not_found(EntityKind::Parameter, missing)),
        None => Ok(()),
    }
}

fn version_ref(state: &ConfigState, version: &NodeVersion) -> EntityRef {
    EntityRef::new(EntityKind::NodeVersion, version.id).labelled(state.version_label(version))
}

/// Next number for a family: one past the highest ever issued.
fn next_version_number(state: &ConfigState, family: &NodeFamily) -> VersionNumber {
    let highest = state
        .versions_of(family.id)
        .last()
        .map(|v| v.version_number.as_u32())
        .unwrap_or(0)
        .max(family.last_version_number);
    VersionNumber::new(highest)
        .map(VersionNumber::next)
        .unwrap_or(VersionNumber::FIRST)
}

impl ConfigState {
    pub(crate) fn version_detail(&self, version: &NodeVersion) -> VersionDetail {
        let parameters = self.parameters_of(version);
        let mut subnodes: Vec<SubnodeView> = self
            .subnodes_of(version.id)
            .into_iter()
            .map(|s| SubnodeView {
                status: crate::SubnodeStatus::from_missing(
                    s.missing_required(parameters.iter().copied()),
                ),
                subnode: s.clone(),
            })
            .collect();
        subnodes.sort_by(|a, b| a.subnode.name.cmp(&b.subnode.name));
        VersionDetail {
            version: version.clone(),
            parameters: parameters.into_iter().cloned().collect(),
            subnodes,
        }
    }
}

impl MediationService {
    /// Creates an empty family. Names are globally unique.
    #[tracing::instrument(skip(self, input), fields(name = %input.name, kind = %input.kind))]
    pub async fn create_family(&self, input: NewFamily) -> Result<NodeFamily, MediationError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(MediationError::invalid("name", "must not be blank"));
        }

        let _gate = self.registry_gate.lock().await;
        let taken = self
            .read(|state| state.families.values().any(|f| f.name == name))
            .await;
        if taken {
            return Err(MediationError::DuplicateName {
                kind: EntityKind::NodeFamily,
                name,
            });
        }

        let family = NodeFamily {
            id: NodeFamilyId::new_random(),
            name,
            description: input.description.trim().to_string(),
            kind: input.kind,
            created_at: Timestamp::now(),
            last_version_number: 0,
        };
        self.commit(vec![Mutation::Put(Record::Family(family.clone()))])
            .await?;
        tracing::info!(family_id = %family.id, "Node family created");
        Ok(family)
    }

    /// Removes a family that has no versions left.
    #[tracing::instrument(skip(self))]
    pub async fn delete_family(&self, family_id: NodeFamilyId) -> Result<(), MediationError> {
        let _gate = self.registry_gate.lock().await;
        self.read(|state| {
            if !state.families.contains_key(&family_id) {
                return Err(MediationError::not_found(EntityKind::NodeFamily, family_id));
            }
            match state.versions_of(family_id).first() {
                Some(version) => Err(MediationError::conflict(
                    "family still has versions",
                    version_ref(state, version),
                )),
                None => Ok(()),
            }
        })
        .await?;
        self.commit(vec![Mutation::Delete(RecordKey::Family(family_id))])
            .await?;
        tracing::info!(%family_id, "Node family deleted");
        Ok(())
    }

    /// Adds a draft version numbered one past the family's highest.
    #[tracing::instrument(skip(self, input))]
    pub async fn create_version(
        &self,
        family_id: NodeFamilyId,
        input: NewVersion,
    ) -> Result<NodeVersion, MediationError> {
        let script_reference = input.script_reference.trim().to_string();
        if script_reference.is_empty() {
            return Err(MediationError::invalid("script_reference", "must not be blank"));
        }

        let _gate = self.registry_gate.lock().await;
        let (version, family) = self
            .read(|state| {
                let family = state
                    .families
                    .get(&family_id)
                    .ok_or_else(|| MediationError::not_found(EntityKind::NodeFamily, family_id))?;
                check_parameters_exist(state, &input.parameter_ids)?;
                let now = Timestamp::now();
                let version = NodeVersion {
                    id: NodeVersionId::new_random(),
                    family_id,
                    version_number: next_version_number(state, family),
                    script_reference,
                    changelog: input.changelog,
                    state: VersionState::Draft,
                    is_deployed: false,
                    parameter_ids: input.parameter_ids,
                    created_by: resolve_actor(input.created_by),
                    created_at: now,
                    updated_at: now,
                };
                let mut family = family.clone();
                family.last_version_number = version.version_number.as_u32();
                Ok::<_, MediationError>((version, family))
            })
            .await?;

        self.commit(vec![
            Mutation::Put(Record::Family(family)),
            Mutation::Put(Record::Version(version.clone())),
        ])
        .await?;
        tracing::info!(version_id = %version.id, number = %version.version_number, "Node version created");
        Ok(version)
    }

    /// Copies a version (typically a deployed, immutable one) into a new draft
    /// of the same family.
    #[tracing::instrument(skip(self))]
    pub async fn clone_version(
        &self,
        version_id: NodeVersionId,
        created_by: Option<String>,
    ) -> Result<NodeVersion, MediationError> {
        let _gate = self.registry_gate.lock().await;
        let (clone, family) = self
            .read(|state| {
                let source = state
                    .versions
                    .get(&version_id)
                    .ok_or_else(|| MediationError::not_found(EntityKind::NodeVersion, version_id))?;
                let family = state.families.get(&source.family_id).ok_or_else(|| {
                    MediationError::not_found(EntityKind::NodeFamily, source.family_id)
                })?;
                let now = Timestamp::now();
                let clone = NodeVersion {
                    id: NodeVersionId::new_random(),
                    family_id: source.family_id,
                    version_number: next_version_number(state, family),
                    script_reference: source.script_reference.clone(),
                    changelog: source.changelog.clone(),
                    state: VersionState::Draft,
                    is_deployed: false,
                    parameter_ids: source.parameter_ids.clone(),
                    created_by: resolve_actor(created_by),
                    created_at: now,
                    updated_at: now,
                };
                let mut family = family.clone();
                family.last_version_number = clone.version_number.as_u32();
                Ok::<_, MediationError>((clone, family))
            })
            .await?;

        self.commit(vec![
            Mutation::Put(Record::Family(family)),
            Mutation::Put(Record::Version(clone.clone())),
        ])
        .await?;
        tracing::info!(source = %version_id, clone = %clone.id, number = %clone.version_number, "Node version cloned");
        Ok(clone)
    }

    /// Edits a version that is not deployed.
    ///
    /// The parameter binding is frozen once subnodes exist, because their
    /// stored values are keyed by the bound parameters.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_version(
        &self,
        version_id: NodeVersionId,
        patch: VersionPatch,
    ) -> Result<NodeVersion, MediationError> {
        let _gate = self.registry_gate.lock().await;
        let updated = self
            .read(|state| {
                let current = state
                    .versions
                    .get(&version_id)
                    .ok_or_else(|| MediationError::not_found(EntityKind::NodeVersion, version_id))?;
                if !current.is_editable() {
                    return Err(MediationError::conflict(
                        "deployed versions are immutable; clone it to edit",
                        version_ref(state, current),
                    ));
                }

                let mut violations = Vec::new();
                let mut updated = current.clone();
                if let Some(script) = &patch.script_reference {
                    let script = script.trim();
                    if script.is_empty() {
                        violations.push(Violation::new("script_reference", "must not be blank"));
                    } else {
                        updated.script_reference = script.to_string();
                    }
                }
                if let Some(changelog) = &patch.changelog {
                    updated.changelog = changelog.clone();
                }
                if !violations.is_empty() {
                    return Err(MediationError::Validation { violations });
                }

                if let Some(ids) = &patch.parameter_ids {
                    if *ids != current.parameter_ids {
                        check_parameters_exist(state, ids)?;
                        if let Some(subnode) = state.subnodes_of(version_id).first() {
                            return Err(MediationError::conflict(
                                "parameter binding is frozen while subnodes exist",
                                EntityRef::new(EntityKind::Subnode, subnode.id)
                                    .labelled(subnode.name.clone()),
                            ));
                        }
                        updated.parameter_ids = ids.clone();
                    }
                }
                updated.updated_at = Timestamp::now();
                Ok(updated)
            })
            .await?;

        self.commit(vec![Mutation::Put(Record::Version(updated.clone()))])
            .await?;
        tracing::info!(%version_id, "Node version updated");
        Ok(updated)
    }

    /// Retires a version. Deprecated versions cannot be activated and accept
    /// no new subnodes. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn deprecate_version(
        &self,
        version_id: NodeVersionId,
    ) -> Result<NodeVersion, MediationError> {
        let _gate = self.registry_gate.lock().await;
        let current = self
            .read(|state| {
                let version = state
                    .versions
                    .get(&version_id)
                    .ok_or_else(|| MediationError::not_found(EntityKind::NodeVersion, version_id))?;
                if version.is_deployed {
                    return Err(MediationError::conflict(
                        "cannot deprecate the deployed version; deactivate it first",
                        version_ref(state, version),
                    ));
                }
                Ok(version.clone())
            })
            .await?;
        if current.state == VersionState::Deprecated {
            return Ok(current);
        }

        let mut updated = current;
        updated.state = VersionState::Deprecated;
        updated.updated_at = Timestamp::now();
        self.commit(vec![Mutation::Put(Record::Version(updated.clone()))])
            .await?;
        tracing::info!(%version_id, "Node version deprecated");
        Ok(updated)
    }

    /// Deletes a version that is neither deployed nor referenced by a subnode.
    #[tracing::instrument(skip(self))]
    pub async fn delete_version(&self, version_id: NodeVersionId) -> Result<(), MediationError> {
        let _gate = self.registry_gate.lock().await;
        self.read(|state| {
            let version = state
                .versions
                .get(&version_id)
                .ok_or_else(|| MediationError::not_found(EntityKind::NodeVersion, version_id))?;
            if version.is_deployed {
                return Err(MediationError::conflict(
                    "cannot delete the deployed version",
                    version_ref(state, version),
                ));
            }
            if let Some(subnode) = state.subnodes_of(version_id).first() {
                return Err(MediationError::conflict(
                    "version is referenced by a subnode",
                    EntityRef::new(EntityKind::Subnode, subnode.id).labelled(subnode.name.clone()),
                ));
            }
            Ok(())
        })
        .await?;

        self.commit(vec![Mutation::Delete(RecordKey::Version(version_id))])
            .await?;
        tracing::info!(%version_id, "Node version deleted");
        Ok(())
    }

    /// Every family with its active-version summary, ordered by name.
    pub async fn list_families(&self) -> Vec<NodeSummary> {
        self.read(|state| {
            let active = state.active_version();
            let mut summaries: Vec<NodeSummary> = state
                .families
                .values()
                .map(|family| {
                    let versions = state.versions_of(family.id);
                    NodeSummary {
                        family: family.clone(),
                        version_count: versions.len(),
                        active_version: active.filter(|v| v.family_id == family.id).cloned(),
                        latest_version: versions.last().map(|v| v.version_number),
                    }
                })
                .collect();
            summaries.sort_by(|a, b| a.family.name.cmp(&b.family.name));
            summaries
        })
        .await
    }

    /// A family with every version, each with its parameters and subnodes.
    pub async fn get_family(&self, family_id: NodeFamilyId) -> Result<FamilyDetail, MediationError> {
        self.read(|state| {
            let family = state
                .families
                .get(&family_id)
                .ok_or_else(|| MediationError::not_found(EntityKind::NodeFamily, family_id))?;
            Ok(FamilyDetail {
                family: family.clone(),
                versions: state
                    .versions_of(family_id)
                    .into_iter()
                    .map(|v| state.version_detail(v))
                    .collect(),
            })
        })
        .await
    }

    pub async fn get_version(&self, version_id: NodeVersionId) -> Result<VersionDetail, MediationError> {
        self.read(|state| {
            state
                .versions
                .get(&version_id)
                .map(|v| state.version_detail(v))
                .ok_or_else(|| MediationError::not_found(EntityKind::NodeVersion, version_id))
        })
        .await
    }

    /// Resolves a version by its family and number.
    pub async fn find_version(
        &self,
        family_id: NodeFamilyId,
        number: u32,
    ) -> Result<NodeVersion, MediationError> {
        self.read(|state| {
            if !state.families.contains_key(&family_id) {
                return Err(MediationError::not_found(EntityKind::NodeFamily, family_id));
            }
            state
                .versions_of(family_id)
                .into_iter()
                .find(|v| v.version_number.as_u32() == number)
                .cloned()
                .ok_or_else(|| {
                    MediationError::not_found(
                        EntityKind::NodeVersion,
                        format!("{family_id}/v{number}"),
                    )
                })
        })
        .await
    }
}

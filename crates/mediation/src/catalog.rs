//! Parameter Catalog: the global pool of key/type/default declarations that
//! node versions bind to.

use serde::{Deserialize, Serialize};

use crate::state::{Mutation, Record, RecordKey};
use crate::{
    EntityKind, EntityRef, MediationError, MediationService, Parameter, ParameterId,
    ParameterKey, ParameterType, SubnodeId, Violation,
};

/// Input for [`MediationService::create_parameter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParameter {
    pub key: String,
    pub datatype: ParameterType,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update for [`MediationService::update_parameter`]. `None` keeps
/// the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterPatch {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub datatype: Option<ParameterType>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Validates key and default together so that both problems are reported.
fn check_declaration(
    key: &str,
    datatype: ParameterType,
    default_value: &str,
) -> Result<ParameterKey, MediationError> {
    let mut violations = Vec::new();
    let parsed = ParameterKey::new(key);
    if parsed.is_none() {
        violations.push(Violation::new("key", "must not be blank"));
    }
    if !default_value.trim().is_empty() {
        if let Err(message) = datatype.check(default_value) {
            violations.push(Violation::new("default_value", message));
        }
    }
    match parsed {
        Some(key) if violations.is_empty() => Ok(key),
        _ => Err(MediationError::Validation { violations }),
    }
}

impl MediationService {
    /// Declares a new catalog parameter.
    #[tracing::instrument(skip(self, input), fields(key = %input.key))]
    pub async fn create_parameter(&self, input: NewParameter) -> Result<Parameter, MediationError> {
        let default_value = input.default_value.unwrap_or_default();
        let key = check_declaration(&input.key, input.datatype, &default_value)?;

        let _gate = self.registry_gate.lock().await;
        let taken = self
            .read(|state| state.parameters.values().any(|p| p.key == key))
            .await;
        if taken {
            return Err(MediationError::DuplicateName {
                kind: EntityKind::Parameter,
                name: key.to_string(),
            });
        }

        let parameter = Parameter {
            id: ParameterId::new_random(),
            key,
            datatype: input.datatype,
            default_value,
            required: input.required,
            description: input.description.unwrap_or_default(),
        };
        self.commit(vec![Mutation::Put(Record::Parameter(parameter.clone()))])
            .await?;
        tracing::info!(parameter_id = %parameter.id, datatype = %parameter.datatype, "Parameter created");
        Ok(parameter)
    }

    /// Edits a parameter that no deployed version binds.
    ///
    /// Changing the datatype fails with a validation error listing every
    /// stored subnode value that does not parse as the new type.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_parameter(
        &self,
        id: ParameterId,
        patch: ParameterPatch,
    ) -> Result<Parameter, MediationError> {
        let _gate = self.registry_gate.lock().await;
        // A datatype change rechecks stored values, so writers to any subnode
        // bound to the parameter wait.
        let mut subnode_guards = Vec::new();
        if patch.datatype.is_some() {
            let holders: Vec<SubnodeId> = self
                .read(|state| {
                    state
                        .subnodes
                        .values()
                        .filter(|s| {
                            state
                                .versions
                                .get(&s.node_version_id)
                                .is_some_and(|v| v.parameter_ids.contains(&id))
                        })
                        .map(|s| s.id)
                        .collect()
                })
                .await;
            for subnode_id in holders {
                subnode_guards.push(self.subnode_locks.lock(subnode_id).await);
            }
        }
        let updated = self
            .read(|state| {
                let current = state
                    .parameters
                    .get(&id)
                    .ok_or_else(|| MediationError::not_found(EntityKind::Parameter, id))?;

                if let Some(deployed) = state
                    .versions
                    .values()
                    .find(|v| v.is_deployed && v.parameter_ids.contains(&id))
                {
                    return Err(MediationError::conflict(
                        "parameter is bound to the deployed version",
                        EntityRef::new(EntityKind::NodeVersion, deployed.id)
                            .labelled(state.version_label(deployed)),
                    ));
                }

                let datatype = patch.datatype.unwrap_or(current.datatype);
                let default_value = patch
                    .default_value
                    .clone()
                    .unwrap_or_else(|| current.default_value.clone());
                let key_input = patch
                    .key
                    .clone()
                    .unwrap_or_else(|| current.key.to_string());
                let key = check_declaration(&key_input, datatype, &default_value)?;

                if datatype != current.datatype {
                    let violations: Vec<Violation> = state
                        .subnodes
                        .values()
                        .filter_map(|s| {
                            let value = s.parameter_values.get(&id)?;
                            let message = datatype.check(value).err()?;
                            Some(Violation::new(
                                format!("subnodes[{}].{}", s.name, current.key),
                                message,
                            ))
                        })
                        .collect();
                    if !violations.is_empty() {
                        return Err(MediationError::Validation { violations });
                    }
                }

                if state
                    .parameters
                    .values()
                    .any(|p| p.id != id && p.key == key)
                {
                    return Err(MediationError::DuplicateName {
                        kind: EntityKind::Parameter,
                        name: key.to_string(),
                    });
                }

                Ok(Parameter {
                    id,
                    key,
                    datatype,
                    default_value,
                    required: patch.required.unwrap_or(current.required),
                    description: patch
                        .description
                        .clone()
                        .unwrap_or_else(|| current.description.clone()),
                })
            })
            .await?;

        self.commit(vec![Mutation::Put(Record::Parameter(updated.clone()))])
            .await?;
        drop(subnode_guards);
        tracing::info!(parameter_id = %id, "Parameter updated");
        Ok(updated)
    }

    /// Removes a parameter that no version binds.
    #[tracing::instrument(skip(self))]
    pub async fn delete_parameter(&self, id: ParameterId) -> Result<(), MediationError> {
        let _gate = self.registry_gate.lock().await;
        self.read(|state| {
            if !state.parameters.contains_key(&id) {
                return Err(MediationError::not_found(EntityKind::Parameter, id));
            }
            match state.versions.values().find(|v| v.parameter_ids.contains(&id)) {
                Some(version) => Err(MediationError::conflict(
                    "parameter is bound to a node version",
                    EntityRef::new(EntityKind::NodeVersion, version.id)
                        .labelled(state.version_label(version)),
                )),
                None => Ok(()),
            }
        })
        .await?;

        self.commit(vec![Mutation::Delete(RecordKey::Parameter(id))])
            .await?;
        tracing::info!(parameter_id = %id, "Parameter deleted");
        Ok(())
    }

    pub async fn get_parameter(&self, id: ParameterId) -> Result<Parameter, MediationError> {
        self.read(|state| state.parameters.get(&id).cloned())
            .await
            .ok_or_else(|| MediationError::not_found(EntityKind::Parameter, id))
    }

    /// All parameters, ordered by key.
    pub async fn list_parameters(&self) -> Vec<Parameter> {
        let mut parameters: Vec<Parameter> = self
            .read(|state| state.parameters.values().cloned().collect())
            .await;
        parameters.sort_by(|a, b| a.key.cmp(&b.key));
        parameters
    }
}

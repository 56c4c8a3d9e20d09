//! In-memory view of the configuration and the record-level mutations that
//! change it.
//!
//! A [`Batch`] is the unit of atomicity: the service builds one per operation,
//! commits it to the [`crate::ConfigStore`], and only then applies it to the
//! cached [`ConfigState`] under a single write lock.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    ActivationSlot, Flow, FlowId, NodeFamily, NodeFamilyId, NodeVersion, NodeVersionId,
    Parameter, ParameterId, StoreError, Subnode, SubnodeId,
};

/// A full record, as written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Parameter(Parameter),
    Family(NodeFamily),
    Version(NodeVersion),
    Subnode(Subnode),
    Flow(Flow),
    ActivationSlot(ActivationSlot),
}

/// Key of a deletable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", content = "id", rename_all = "snake_case")]
pub enum RecordKey {
    Parameter(ParameterId),
    Family(NodeFamilyId),
    Version(NodeVersionId),
    Subnode(SubnodeId),
    Flow(FlowId),
}

/// One write inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Put(Record),
    Delete(RecordKey),
}

/// Writes that must become visible together or not at all.
pub type Batch = Vec<Mutation>;

/// Every configuration record, keyed by identifier.
///
/// `BTreeMap` keeps iteration (and therefore serialised output) deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigState {
    #[serde(default)]
    pub parameters: BTreeMap<ParameterId, Parameter>,
    #[serde(default)]
    pub families: BTreeMap<NodeFamilyId, NodeFamily>,
    #[serde(default)]
    pub versions: BTreeMap<NodeVersionId, NodeVersion>,
    #[serde(default)]
    pub subnodes: BTreeMap<SubnodeId, Subnode>,
    #[serde(default)]
    pub flows: BTreeMap<FlowId, Flow>,
    #[serde(default)]
    pub activation: ActivationSlot,
}

impl ConfigState {
    /// Applies a batch in order. Applying cannot fail; all checks happen
    /// before a batch is built.
    pub fn apply(&mut self, batch: &[Mutation]) {
        for mutation in batch {
            match mutation {
                Mutation::Put(record) => self.put(record.clone()),
                Mutation::Delete(key) => self.delete(*key),
            }
        }
    }

    fn put(&mut self, record: Record) {
        match record {
            Record::Parameter(p) => {
                self.parameters.insert(p.id, p);
            }
            Record::Family(f) => {
                self.families.insert(f.id, f);
            }
            Record::Version(v) => {
                self.versions.insert(v.id, v);
            }
            Record::Subnode(s) => {
                self.subnodes.insert(s.id, s);
            }
            Record::Flow(f) => {
                self.flows.insert(f.id, f);
            }
            Record::ActivationSlot(slot) => self.activation = slot,
        }
    }

    fn delete(&mut self, key: RecordKey) {
        match key {
            RecordKey::Parameter(id) => {
                self.parameters.remove(&id);
            }
            RecordKey::Family(id) => {
                self.families.remove(&id);
            }
            RecordKey::Version(id) => {
                self.versions.remove(&id);
            }
            RecordKey::Subnode(id) => {
                self.subnodes.remove(&id);
            }
            RecordKey::Flow(id) => {
                self.flows.remove(&id);
            }
        }
    }

    /// The deployed version, as named by the activation slot.
    pub fn active_version(&self) -> Option<&NodeVersion> {
        self.activation
            .version_id
            .and_then(|id| self.versions.get(&id))
    }

    /// Versions of one family, ordered by version number.
    pub fn versions_of(&self, family_id: NodeFamilyId) -> Vec<&NodeVersion> {
        let mut versions: Vec<&NodeVersion> = self
            .versions
            .values()
            .filter(|v| v.family_id == family_id)
            .collect();
        versions.sort_by_key(|v| v.version_number);
        versions
    }

    /// Parameters bound to a version, in catalog order.
    pub fn parameters_of<'a>(&'a self, version: &'a NodeVersion) -> Vec<&'a Parameter> {
        version
            .parameter_ids
            .iter()
            .filter_map(|id| self.parameters.get(id))
            .collect()
    }

    /// Subnodes created against a version.
    pub fn subnodes_of(&self, version_id: NodeVersionId) -> Vec<&Subnode> {
        self.subnodes
            .values()
            .filter(|s| s.node_version_id == version_id)
            .collect()
    }

    /// `"<family name> v<n>"`, used to label versions in errors and logs.
    pub fn version_label(&self, version: &NodeVersion) -> String {
        match self.families.get(&version.family_id) {
            Some(family) => format!("{} {}", family.name, version.version_number),
            None => version.version_number.to_string(),
        }
    }

    /// Checks invariants that must hold for every committed state.
    ///
    /// Used when a store is opened so that a hand-edited or damaged document
    /// is refused instead of served.
    pub fn check_consistency(&self) -> Result<(), StoreError> {
        let deployed: Vec<&NodeVersion> =
            self.versions.values().filter(|v| v.is_deployed).collect();
        if deployed.len() > 1 {
            return Err(corrupt(format!(
                "{} versions are marked deployed; at most one is allowed",
                deployed.len()
            )));
        }
        let deployed_id = deployed.first().map(|v| v.id);
        if deployed_id != self.activation.version_id {
            return Err(corrupt(
                "activation slot does not match the deployed version".to_string(),
            ));
        }
        for version in self.versions.values() {
            if !self.families.contains_key(&version.family_id) {
                return Err(corrupt(format!(
                    "version {} references unknown family {}",
                    version.id, version.family_id
                )));
            }
            if version.is_deployed && version.state != crate::VersionState::Active {
                return Err(corrupt(format!(
                    "version {} is deployed but in state {}",
                    version.id, version.state
                )));
            }
        }
        for subnode in self.subnodes.values() {
            if !self.versions.contains_key(&subnode.node_version_id) {
                return Err(corrupt(format!(
                    "subnode {} references unknown version {}",
                    subnode.id, subnode.node_version_id
                )));
            }
        }
        Ok(())
    }
}

fn corrupt(message: String) -> StoreError {
    StoreError::Corrupt { message }
}

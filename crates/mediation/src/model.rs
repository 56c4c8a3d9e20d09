//! Configuration entities: parameters, node families and versions, subnodes,
//! flows and the activation slot.
//!
//! These are plain records. Cross-entity rules (name uniqueness, references,
//! the single-deployed invariant) are enforced by the service components,
//! never by the records themselves.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    Actor, FlowEdgeId, FlowId, FlowNodeId, NodeFamilyId, NodeVersionId, ParameterId,
    ParameterKey, Position, SubnodeId, Timestamp, VersionNumber,
};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Declared datatype of a parameter. Values are stored as strings and checked
/// against this type when written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Int,
    Float,
    Boolean,
}

impl ParameterType {
    /// Checks that `value` parses as this type. Returns a description of the
    /// problem on failure.
    pub fn check(self, value: &str) -> Result<(), String> {
        let ok = match self {
            ParameterType::String => true,
            ParameterType::Int => value.trim().parse::<i64>().is_ok(),
            ParameterType::Float => value
                .trim()
                .parse::<f64>()
                .map(f64::is_finite)
                .unwrap_or(false),
            ParameterType::Boolean => {
                let v = value.trim();
                v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false")
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!("expected {}, got '{value}'", self.describe()))
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ParameterType::String => "a string",
            ParameterType::Int => "an integer",
            ParameterType::Float => "a finite number",
            ParameterType::Boolean => "true or false",
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParameterType::String => "string",
            ParameterType::Int => "int",
            ParameterType::Float => "float",
            ParameterType::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// A reusable parameter declaration from the global catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParameterId,
    pub key: ParameterKey,
    pub datatype: ParameterType,
    /// Default applied to new subnodes. Empty means "no default".
    #[serde(default)]
    pub default_value: String,
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

// ---------------------------------------------------------------------------
// Node families and versions
// ---------------------------------------------------------------------------

/// What kind of processing stage a node family implements.
///
/// Fixed when the family is created; behaviour never depends on the family's
/// display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Pulls input files from a remote endpoint (SFTP, FTP, object storage).
    Collector,
    /// File distribution collector fed by a network element.
    Fdc,
    Decoder,
    Validator,
    Enricher,
    Encoder,
    Distributor,
    Generic,
}

impl NodeKind {
    /// Source kinds start a pipeline; flow nodes of these kinds are entry points.
    pub fn is_source(self) -> bool {
        matches!(self, NodeKind::Collector | NodeKind::Fdc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Collector => "collector",
            NodeKind::Fdc => "fdc",
            NodeKind::Decoder => "decoder",
            NodeKind::Validator => "validator",
            NodeKind::Enricher => "enricher",
            NodeKind::Encoder => "encoder",
            NodeKind::Distributor => "distributor",
            NodeKind::Generic => "generic",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named container for the versions of one processing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFamily {
    pub id: NodeFamilyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: NodeKind,
    pub created_at: Timestamp,
    /// Highest version number ever issued, including deleted versions.
    /// Version numbers are never reused.
    #[serde(default)]
    pub last_version_number: u32,
}

/// Lifecycle state of a node version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    Draft,
    Active,
    Deprecated,
}

impl std::fmt::Display for VersionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VersionState::Draft => "draft",
            VersionState::Active => "active",
            VersionState::Deprecated => "deprecated",
        };
        f.write_str(s)
    }
}

/// One numbered implementation of a node family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeVersion {
    pub id: NodeVersionId,
    pub family_id: NodeFamilyId,
    pub version_number: VersionNumber,
    pub script_reference: String,
    #[serde(default)]
    pub changelog: String,
    pub state: VersionState,
    pub is_deployed: bool,
    #[serde(default)]
    pub parameter_ids: BTreeSet<ParameterId>,
    pub created_by: Actor,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NodeVersion {
    /// Deployed versions are immutable; every other version may be edited.
    pub fn is_editable(&self) -> bool {
        !self.is_deployed
    }
}

// ---------------------------------------------------------------------------
// Subnodes
// ---------------------------------------------------------------------------

/// A named, parameter-valued instance of one node version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnode {
    pub id: SubnodeId,
    pub name: String,
    pub node_version_id: NodeVersionId,
    #[serde(default)]
    pub parameter_values: BTreeMap<ParameterId, String>,
    #[serde(default)]
    pub is_selected: bool,
    pub last_updated_at: Timestamp,
}

impl Subnode {
    /// The value a parameter takes for this subnode: the explicit value when
    /// non-empty, otherwise the parameter default.
    pub fn effective_value<'a>(&'a self, parameter: &'a Parameter) -> &'a str {
        match self.parameter_values.get(&parameter.id) {
            Some(v) if !v.trim().is_empty() => v,
            _ => &parameter.default_value,
        }
    }

    /// Keys of required parameters that have no effective value.
    pub fn missing_required<'a>(
        &self,
        parameters: impl IntoIterator<Item = &'a Parameter>,
    ) -> Vec<ParameterKey> {
        parameters
            .into_iter()
            .filter(|p| p.required && self.effective_value(p).trim().is_empty())
            .map(|p| p.key.clone())
            .collect()
    }
}

/// Completeness of a subnode, derived on read and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubnodeStatus {
    Complete,
    Incomplete { missing: Vec<ParameterKey> },
}

impl SubnodeStatus {
    pub fn from_missing(missing: Vec<ParameterKey>) -> Self {
        if missing.is_empty() {
            SubnodeStatus::Complete
        } else {
            SubnodeStatus::Incomplete { missing }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, SubnodeStatus::Complete)
    }
}

/// A subnode together with its derived status, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnodeView {
    #[serde(flatten)]
    pub subnode: Subnode,
    #[serde(flatten)]
    pub status: SubnodeStatus,
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

/// A subnode placed in a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: FlowNodeId,
    pub subnode_id: SubnodeId,
    /// Insertion order within the flow, starting at 0.
    pub order: u32,
    #[serde(default)]
    pub position: Position,
}

/// A directed connection between two flow nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: FlowEdgeId,
    pub from_node_id: FlowNodeId,
    pub to_node_id: FlowNodeId,
    /// Branch label. `None` marks the unconditional edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl FlowEdge {
    /// Key under which sibling edges must be unique.
    pub fn branch_key(&self) -> (FlowNodeId, Option<&str>) {
        (self.from_node_id, self.condition.as_deref())
    }
}

/// Normalises a user-supplied branch condition: blank becomes `None`.
pub fn normalize_condition(condition: Option<String>) -> Option<String> {
    condition
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// A directed acyclic graph of subnodes forming one executable pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_deployed: bool,
    /// Incremented on every structural change.
    #[serde(default)]
    pub revision: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Flow {
    pub fn node(&self, id: FlowNodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn status(&self) -> FlowStatus {
        FlowStatus {
            flow_id: self.id,
            is_running: self.is_running,
            is_deployed: self.is_deployed,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.revision = self.revision.saturating_add(1);
        self.updated_at = Timestamp::now();
    }
}

/// Runtime status of a flow; running and deployed are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatus {
    pub flow_id: FlowId,
    pub is_running: bool,
    pub is_deployed: bool,
}

// ---------------------------------------------------------------------------
// Activation slot
// ---------------------------------------------------------------------------

/// The single persisted record naming the deployed node version.
///
/// Written in the same atomic batch as the `is_deployed` flags it mirrors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationSlot {
    pub version_id: Option<NodeVersionId>,
    pub family_id: Option<NodeFamilyId>,
    pub changed_at: Timestamp,
}

impl Default for ActivationSlot {
    fn default() -> Self {
        Self {
            version_id: None,
            family_id: None,
            changed_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameter(key: &str, datatype: ParameterType, default: &str, required: bool) -> Parameter {
        Parameter {
            id: ParameterId::new_random(),
            key: ParameterKey::new(key).unwrap(),
            datatype,
            default_value: default.to_string(),
            required,
            description: String::new(),
        }
    }

    #[test]
    fn datatype_checks() {
        assert!(ParameterType::Int.check("42").is_ok());
        assert!(ParameterType::Int.check(" -7 ").is_ok());
        assert!(ParameterType::Int.check("4.2").is_err());
        assert!(ParameterType::Float.check("4.2").is_ok());
        assert!(ParameterType::Float.check("NaN").is_err());
        assert!(ParameterType::Boolean.check("TRUE").is_ok());
        assert!(ParameterType::Boolean.check("yes").is_err());
        assert!(ParameterType::String.check("").is_ok());
    }

    #[test]
    fn explicit_blank_value_falls_back_to_default() {
        let port = parameter("port", ParameterType::Int, "22", true);
        let host = parameter("host", ParameterType::String, "", true);
        let mut subnode = Subnode {
            id: SubnodeId::new_random(),
            name: "prod-sftp".into(),
            node_version_id: NodeVersionId::new_random(),
            parameter_values: BTreeMap::new(),
            is_selected: false,
            last_updated_at: Timestamp::now(),
        };
        subnode.parameter_values.insert(port.id, "  ".into());
        assert_eq!(subnode.effective_value(&port), "22");

        let missing = subnode.missing_required([&port, &host]);
        assert_eq!(missing, vec![ParameterKey::new("host").unwrap()]);

        subnode.parameter_values.insert(host.id, "10.0.0.1".into());
        assert!(subnode.missing_required([&port, &host]).is_empty());
    }

    #[test]
    fn blank_conditions_normalize_to_unconditional() {
        assert_eq!(normalize_condition(Some("   ".into())), None);
        assert_eq!(
            normalize_condition(Some(" invalid ".into())),
            Some("invalid".to_string())
        );
        assert_eq!(normalize_condition(None), None);
    }

    #[test]
    fn only_collectors_are_sources() {
        assert!(NodeKind::Collector.is_source());
        assert!(NodeKind::Fdc.is_source());
        assert!(!NodeKind::Decoder.is_source());
    }
}

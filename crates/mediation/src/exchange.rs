//! Flow export and import.
//!
//! The exchange document is JSON with camelCase keys:
//!
//! ```json
//! {
//!   "flow": { "id": "...", "name": "...", "version": 3 },
//!   "nodes": [{ "id", "type", "position", "label", "config", "connector", "parameters" }],
//!   "edges": [{ "id", "source", "target", "type", "condition"? }],
//!   "metadata": { "nodeCount": 2, "edgeCount": 1, "exportedAt": "..." }
//! }
//! ```
//!
//! Import always creates a new flow with fresh flow-node and edge ids. Nodes
//! reuse the exported subnode when it still exists; otherwise a new subnode is
//! created against the exported node version with the exported parameters.
//! Nodes that shared a subnode in the export share the recreated one.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::flows::check_new_edge;
use crate::model::normalize_condition;
use crate::state::{ConfigState, Mutation, Record};
use crate::{
    EntityKind, Flow, FlowEdgeId, FlowId, FlowNode, FlowNodeId, MediationError,
    MediationService, NodeKind, NodeVersionId, Position, Subnode, SubnodeId, Timestamp,
    VersionState, Violation,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowExport {
    pub flow: ExportedFlow,
    pub nodes: Vec<ExportedNode>,
    pub edges: Vec<ExportedEdge>,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFlow {
    pub id: FlowId,
    pub name: String,
    /// The flow revision at export time.
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedNode {
    pub id: FlowNodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub position: Position,
    /// Subnode name.
    pub label: String,
    pub config: NodeConfig,
    /// Node family name.
    pub connector: String,
    /// Effective parameter values keyed by parameter key.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub subnode_id: SubnodeId,
    pub node_version_id: NodeVersionId,
    pub version_number: u32,
    pub order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportedEdgeType {
    Default,
    Conditional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEdge {
    pub id: FlowEdgeId,
    pub source: FlowNodeId,
    pub target: FlowNodeId,
    #[serde(rename = "type")]
    pub edge_type: ExportedEdgeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    pub exported_at: Timestamp,
}

impl ConfigState {
    fn export_flow(&self, flow: &Flow) -> Result<FlowExport, MediationError> {
        let mut nodes = Vec::with_capacity(flow.nodes.len());
        for node in &flow.nodes {
            let subnode = self.require_subnode(node.subnode_id)?;
            let version = self.versions.get(&subnode.node_version_id).ok_or_else(|| {
                MediationError::not_found(EntityKind::NodeVersion, subnode.node_version_id)
            })?;
            let family = self.families.get(&version.family_id).ok_or_else(|| {
                MediationError::not_found(EntityKind::NodeFamily, version.family_id)
            })?;
            let parameters = self
                .parameters_of(version)
                .into_iter()
                .map(|p| (p.key.to_string(), subnode.effective_value(p).to_string()))
                .collect();
            nodes.push(ExportedNode {
                id: node.id,
                kind: family.kind,
                position: node.position,
                label: subnode.name.clone(),
                config: NodeConfig {
                    subnode_id: subnode.id,
                    node_version_id: version.id,
                    version_number: version.version_number.as_u32(),
                    order: node.order,
                },
                connector: family.name.clone(),
                parameters,
            });
        }

        let edges: Vec<ExportedEdge> = flow
            .edges
            .iter()
            .map(|e| ExportedEdge {
                id: e.id,
                source: e.from_node_id,
                target: e.to_node_id,
                edge_type: if e.condition.is_some() {
                    ExportedEdgeType::Conditional
                } else {
                    ExportedEdgeType::Default
                },
                condition: e.condition.clone(),
            })
            .collect();

        Ok(FlowExport {
            flow: ExportedFlow {
                id: flow.id,
                name: flow.name.clone(),
                version: flow.revision,
            },
            metadata: ExportMetadata {
                node_count: nodes.len(),
                edge_count: edges.len(),
                exported_at: Timestamp::now(),
            },
            nodes,
            edges,
        })
    }

    /// Resolves or creates the subnode for one exported node. Returns the
    /// subnode id and, if a new subnode is needed, the record to create.
    fn import_subnode(
        &self,
        node: &ExportedNode,
        violations: &mut Vec<Violation>,
    ) -> Result<(SubnodeId, Option<Subnode>), MediationError> {
        let field = format!("nodes[{}]", node.id);
        if let Some(existing) = self.subnodes.get(&node.config.subnode_id) {
            let view = self.subnode_view(existing);
            if !view.status.is_complete() {
                violations.push(Violation::new(field, "subnode is incomplete"));
            }
            return Ok((existing.id, None));
        }

        let version = self.versions.get(&node.config.node_version_id).ok_or_else(|| {
            MediationError::not_found(EntityKind::NodeVersion, node.config.node_version_id)
        })?;
        if version.state == VersionState::Deprecated {
            violations.push(Violation::new(
                field.clone(),
                format!("{} is deprecated", self.version_label(version)),
            ));
        }

        let bound = self.parameters_of(version);
        let mut parameter_values = BTreeMap::new();
        for (key, value) in &node.parameters {
            let Some(parameter) = bound.iter().find(|p| p.key.as_str() == key.as_str()) else {
                violations.push(Violation::new(
                    format!("{field}.parameters.{key}"),
                    "not a parameter of the node version",
                ));
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            match parameter.datatype.check(value) {
                Ok(()) => {
                    parameter_values.insert(parameter.id, value.trim().to_string());
                }
                Err(message) => {
                    violations.push(Violation::new(format!("{field}.parameters.{key}"), message))
                }
            }
        }
        for parameter in &bound {
            let has_default = !parameter.default_value.trim().is_empty();
            if has_default && !parameter_values.contains_key(&parameter.id) {
                parameter_values.insert(parameter.id, parameter.default_value.clone());
            }
        }

        let subnode = Subnode {
            id: SubnodeId::new_random(),
            name: node.label.trim().to_string(),
            node_version_id: version.id,
            parameter_values,
            is_selected: false,
            last_updated_at: Timestamp::now(),
        };
        if subnode.name.is_empty() {
            violations.push(Violation::new(format!("{field}.label"), "must not be blank"));
        }
        let missing = subnode.missing_required(bound.iter().copied());
        for key in missing {
            violations.push(Violation::new(
                format!("{field}.parameters.{key}"),
                "required parameter has no value",
            ));
        }
        Ok((subnode.id, Some(subnode)))
    }
}

impl MediationService {
    /// Snapshot of a flow in the exchange format.
    pub async fn export_flow(&self, flow_id: FlowId) -> Result<FlowExport, MediationError> {
        self.read(|state| {
            let flow = state.require_flow(flow_id)?;
            state.export_flow(flow)
        })
        .await
    }

    /// Rebuilds an exported flow as a new, stopped and undeployed flow.
    ///
    /// The whole import is one batch: new subnodes and the flow appear
    /// together or not at all. Edges are re-checked exactly as `add_edge`
    /// checks them.
    #[tracing::instrument(skip(self, document), fields(name = %document.flow.name, nodes = document.nodes.len()))]
    pub async fn import_flow(&self, document: FlowExport) -> Result<Flow, MediationError> {
        let name = document.flow.name.trim().to_string();
        if name.is_empty() {
            return Err(MediationError::invalid("flow.name", "must not be blank"));
        }

        // New subnodes must not race with version deletion.
        let _gate = self.registry_gate.lock().await;
        let (flow, new_subnodes) = self
            .read(|state| -> Result<(Flow, Vec<Subnode>), MediationError> {
                let mut violations = Vec::new();
                let mut id_map: HashMap<FlowNodeId, FlowNodeId> = HashMap::new();
                let mut new_subnodes: Vec<Subnode> = Vec::new();
                // Exported subnode id to the subnode recreated for it.
                let mut recreated: HashMap<SubnodeId, SubnodeId> = HashMap::new();
                let now = Timestamp::now();
                let mut flow = Flow {
                    id: FlowId::new_random(),
                    name,
                    nodes: Vec::with_capacity(document.nodes.len()),
                    edges: Vec::with_capacity(document.edges.len()),
                    is_running: false,
                    is_deployed: false,
                    revision: 0,
                    created_at: now,
                    updated_at: now,
                };

                let mut ordered: Vec<&ExportedNode> = document.nodes.iter().collect();
                ordered.sort_by_key(|n| n.config.order);
                for (order, node) in ordered.into_iter().enumerate() {
                    if id_map.contains_key(&node.id) {
                        violations.push(Violation::new(
                            format!("nodes[{}]", node.id),
                            "duplicate node id",
                        ));
                        continue;
                    }
                    let exported_subnode = node.config.subnode_id;
                    let (subnode_id, created) = match recreated.get(&exported_subnode) {
                        Some(&id) => (id, None),
                        None => state.import_subnode(node, &mut violations)?,
                    };
                    if let Some(created) = created {
                        let clash = new_subnodes.iter().any(|s| {
                            s.node_version_id == created.node_version_id && s.name == created.name
                        }) || state
                            .subnodes_of(created.node_version_id)
                            .iter()
                            .any(|s| s.name == created.name);
                        if clash {
                            return Err(MediationError::DuplicateName {
                                kind: EntityKind::Subnode,
                                name: created.name,
                            });
                        }
                        recreated.insert(exported_subnode, created.id);
                        new_subnodes.push(created);
                    }
                    let new_id = FlowNodeId::new_random();
                    id_map.insert(node.id, new_id);
                    flow.nodes.push(FlowNode {
                        id: new_id,
                        subnode_id,
                        order: u32::try_from(order).unwrap_or(u32::MAX),
                        position: node.position,
                    });
                }
                if !violations.is_empty() {
                    return Err(MediationError::Validation { violations });
                }

                for edge in &document.edges {
                    let (Some(&from), Some(&to)) = (id_map.get(&edge.source), id_map.get(&edge.target))
                    else {
                        violations.push(Violation::new(
                            format!("edges[{}]", edge.id),
                            "edge endpoint is not an exported node",
                        ));
                        continue;
                    };
                    let condition = normalize_condition(edge.condition.clone());
                    let checked =
                        check_new_edge(&flow, from, to, condition.as_deref(), FlowEdgeId::new_random());
                    match checked {
                        Ok(new_edge) => flow.edges.push(new_edge),
                        Err(MediationError::Validation { violations: found }) => {
                            violations.extend(found.into_iter().map(|v| {
                                Violation::new(format!("edges[{}].{}", edge.id, v.field), v.message)
                            }));
                        }
                        Err(other) => return Err(other),
                    }
                }
                if !violations.is_empty() {
                    return Err(MediationError::Validation { violations });
                }
                Ok((flow, new_subnodes))
            })
            .await?;

        let mut batch: Vec<Mutation> = new_subnodes
            .iter()
            .cloned()
            .map(|s| Mutation::Put(Record::Subnode(s)))
            .collect();
        batch.push(Mutation::Put(Record::Flow(flow.clone())));
        self.commit(batch).await?;
        tracing::info!(
            flow_id = %flow.id,
            source = %document.flow.id,
            created_subnodes = new_subnodes.len(),
            "Flow imported"
        );
        Ok(flow)
    }
}

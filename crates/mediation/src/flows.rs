//! Flow Graph Store: flows built from subnodes and directed, optionally
//! condition-labelled edges.
//!
//! Every mutation re-validates before anything is committed, so a rejected
//! call leaves the graph exactly as it was. Mutations are serialised per flow.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::normalize_condition;
use crate::state::{ConfigState, Mutation, Record, RecordKey};
use crate::topology;
use crate::{
    EntityKind, EntityRef, Flow, FlowEdge, FlowEdgeId, FlowId, FlowNode, FlowNodeId, Issue,
    IssueCode, MediationError, MediationService, NodeFamilyId, NodeKind, Position, SubnodeId,
    Timestamp, VersionState, Violation,
};

/// Input for [`MediationService::add_node`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlowNode {
    pub subnode_id: SubnodeId,
    #[serde(default)]
    pub position: Position,
}

/// Input for [`MediationService::add_edge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlowEdge {
    pub from: FlowNodeId,
    pub to: FlowNodeId,
    #[serde(default)]
    pub condition: Option<String>,
}

/// Lightweight row of the flow listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub id: FlowId,
    pub name: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub is_running: bool,
    pub is_deployed: bool,
    pub updated_at: Timestamp,
}

impl ConfigState {
    pub(crate) fn require_flow(&self, id: FlowId) -> Result<&Flow, MediationError> {
        self.flows
            .get(&id)
            .ok_or_else(|| MediationError::not_found(EntityKind::Flow, id))
    }

    /// Family and kind behind a flow node, when the chain of references holds.
    fn node_family(&self, node: &FlowNode) -> Option<(NodeFamilyId, NodeKind)> {
        let subnode = self.subnodes.get(&node.subnode_id)?;
        let version = self.versions.get(&subnode.node_version_id)?;
        let family = self.families.get(&version.family_id)?;
        Some((family.id, family.kind))
    }

    /// Full-graph validation. Blocking issues prevent run and deploy.
    pub(crate) fn flow_issues(&self, flow: &Flow) -> Vec<Issue> {
        let mut issues = Vec::new();
        if flow.nodes.is_empty() {
            issues.push(Issue::new(IssueCode::EmptyFlow, "flow has no nodes"));
            return issues;
        }

        let node_ids: Vec<FlowNodeId> = flow.nodes.iter().map(|n| n.id).collect();
        let known: HashSet<FlowNodeId> = node_ids.iter().copied().collect();

        let mut valid_edges = Vec::with_capacity(flow.edges.len());
        for edge in &flow.edges {
            let missing: Vec<String> = [edge.from_node_id, edge.to_node_id]
                .into_iter()
                .filter(|id| !known.contains(id))
                .map(|id| id.to_string())
                .collect();
            if missing.is_empty() {
                valid_edges.push(edge.clone());
            } else {
                issues.push(
                    Issue::new(
                        IssueCode::DanglingEdge,
                        format!("edge points at unknown node(s): {}", missing.join(", ")),
                    )
                    .at_edge(edge.id),
                );
            }
        }

        for edge in topology::duplicate_branches(&flow.edges) {
            let label = edge.condition.as_deref().unwrap_or("<unconditional>");
            issues.push(
                Issue::new(
                    IssueCode::DuplicateBranch,
                    format!("duplicate branch '{label}' from node {}", edge.from_node_id),
                )
                .at_edge(edge.id),
            );
        }

        if let Some(path) = topology::find_cycle(&node_ids, &valid_edges) {
            let first = path[0];
            issues.push(
                Issue::new(IssueCode::Cycle, format!("graph contains a cycle through {first}"))
                    .at_node(first),
            );
        }

        let mut entries = Vec::new();
        for node in &flow.nodes {
            let Some(subnode) = self.subnodes.get(&node.subnode_id) else {
                issues.push(
                    Issue::new(
                        IssueCode::MissingSubnode,
                        format!("subnode {} no longer exists", node.subnode_id),
                    )
                    .at_node(node.id),
                );
                continue;
            };
            let view = self.subnode_view(subnode);
            if let crate::SubnodeStatus::Incomplete { missing } = &view.status {
                let keys: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
                issues.push(
                    Issue::new(
                        IssueCode::IncompleteSubnode,
                        format!(
                            "subnode '{}' is missing required parameters: {}",
                            subnode.name,
                            keys.join(", ")
                        ),
                    )
                    .at_node(node.id),
                );
            }
            if let Some(version) = self.versions.get(&subnode.node_version_id) {
                if version.state == VersionState::Deprecated {
                    issues.push(
                        Issue::new(
                            IssueCode::DeprecatedVersion,
                            format!(
                                "subnode '{}' runs deprecated {}",
                                subnode.name,
                                self.version_label(version)
                            ),
                        )
                        .at_node(node.id),
                    );
                }
            }
            if let Some((_, kind)) = self.node_family(node) {
                if kind.is_source() {
                    entries.push(node.id);
                }
            }
        }

        if entries.is_empty() {
            issues.push(Issue::new(
                IssueCode::NoEntryNode,
                "flow has no collector or fdc node to start from",
            ));
        } else {
            let reachable = topology::reachable_from(entries, &valid_edges);
            for node in flow.nodes.iter().filter(|n| !reachable.contains(&n.id)) {
                issues.push(
                    Issue::new(
                        IssueCode::OrphanNode,
                        "node is not reachable from any entry node",
                    )
                    .at_node(node.id),
                );
            }
        }

        let family_of = |id: FlowNodeId| {
            flow.node(id)
                .and_then(|n| self.node_family(n))
                .map(|(family, _)| family)
        };
        let mut flagged = HashSet::new();
        for (ancestor, repeat) in topology::repeated_on_path(&node_ids, &valid_edges, family_of) {
            if flagged.insert(repeat) {
                issues.push(
                    Issue::new(
                        IssueCode::RepeatedFamily,
                        format!("node family already used upstream at node {ancestor}"),
                    )
                    .at_node(repeat),
                );
            }
        }

        issues
    }
}

fn ensure_stopped(flow: &Flow) -> Result<(), MediationError> {
    if flow.is_running {
        return Err(MediationError::conflict(
            "stop the flow before changing its graph",
            EntityRef::new(EntityKind::Flow, flow.id).labelled(flow.name.clone()),
        ));
    }
    Ok(())
}

/// Checks a candidate edge against the existing graph.
pub(crate) fn check_new_edge(
    flow: &Flow,
    from: FlowNodeId,
    to: FlowNodeId,
    condition: Option<&str>,
    candidate_id: FlowEdgeId,
) -> Result<FlowEdge, MediationError> {
    for endpoint in [from, to] {
        if flow.node(endpoint).is_none() {
            return Err(MediationError::not_found(EntityKind::FlowNode, endpoint));
        }
    }
    if let Some(message) = topology::branch_violation(&flow.edges, from, condition) {
        return Err(MediationError::Validation {
            violations: vec![Violation::new("condition", message)],
        });
    }

    let edge = FlowEdge {
        id: candidate_id,
        from_node_id: from,
        to_node_id: to,
        condition: condition.map(str::to_string),
    };
    let mut edges = flow.edges.clone();
    edges.push(edge.clone());
    let node_ids: Vec<FlowNodeId> = flow.nodes.iter().map(|n| n.id).collect();
    if let Some(path) = topology::find_cycle(&node_ids, &edges) {
        return Err(MediationError::Cycle { path });
    }
    Ok(edge)
}

impl MediationService {
    /// Creates an empty flow.
    #[tracing::instrument(skip(self, name))]
    pub async fn create_flow(&self, name: &str) -> Result<Flow, MediationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MediationError::invalid("name", "must not be blank"));
        }
        let now = Timestamp::now();
        let flow = Flow {
            id: FlowId::new_random(),
            name: name.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            is_running: false,
            is_deployed: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        self.commit(vec![Mutation::Put(Record::Flow(flow.clone()))])
            .await?;
        tracing::info!(flow_id = %flow.id, name = %flow.name, "Flow created");
        Ok(flow)
    }

    pub async fn get_flow(&self, flow_id: FlowId) -> Result<Flow, MediationError> {
        self.read(|state| state.require_flow(flow_id).cloned()).await
    }

    /// Every flow, ordered by name.
    pub async fn list_flows(&self) -> Vec<FlowSummary> {
        self.read(|state| {
            let mut flows: Vec<FlowSummary> = state
                .flows
                .values()
                .map(|f| FlowSummary {
                    id: f.id,
                    name: f.name.clone(),
                    node_count: f.nodes.len(),
                    edge_count: f.edges.len(),
                    is_running: f.is_running,
                    is_deployed: f.is_deployed,
                    updated_at: f.updated_at,
                })
                .collect();
            flows.sort_by(|a, b| a.name.cmp(&b.name));
            flows
        })
        .await
    }

    /// Deletes a flow that is neither running nor deployed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_flow(&self, flow_id: FlowId) -> Result<(), MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        self.read(|state| {
            let flow = state.require_flow(flow_id)?;
            if flow.is_running || flow.is_deployed {
                return Err(MediationError::conflict(
                    "stop and undeploy the flow before deleting it",
                    EntityRef::new(EntityKind::Flow, flow.id).labelled(flow.name.clone()),
                ));
            }
            Ok(())
        })
        .await?;
        self.commit(vec![Mutation::Delete(RecordKey::Flow(flow_id))])
            .await?;
        self.flow_locks.forget(&flow_id);
        tracing::info!(%flow_id, "Flow deleted");
        Ok(())
    }

    /// Places a complete subnode into the flow.
    #[tracing::instrument(skip(self, input), fields(subnode = %input.subnode_id))]
    pub async fn add_node(
        &self,
        flow_id: FlowId,
        input: NewFlowNode,
    ) -> Result<FlowNode, MediationError> {
        let _subnode_guard = self.subnode_locks.lock(input.subnode_id).await;
        let _flow_guard = self.flow_locks.lock(flow_id).await;
        let (flow, node) = self
            .read(|state| {
                let flow = state.require_flow(flow_id)?;
                ensure_stopped(flow)?;
                let subnode = state.require_subnode(input.subnode_id)?;
                let view = state.subnode_view(subnode);
                if let crate::SubnodeStatus::Incomplete { missing } = &view.status {
                    let mut violations: Vec<Violation> = missing
                        .iter()
                        .map(|k| Violation::new(k.as_str(), "required parameter has no value"))
                        .collect();
                    if violations.is_empty() {
                        violations.push(Violation::new("subnode_id", "subnode is incomplete"));
                    }
                    return Err(MediationError::Validation { violations });
                }

                let mut flow = flow.clone();
                let order = flow.nodes.iter().map(|n| n.order + 1).max().unwrap_or(0);
                let node = FlowNode {
                    id: FlowNodeId::new_random(),
                    subnode_id: input.subnode_id,
                    order,
                    position: input.position,
                };
                flow.nodes.push(node.clone());
                flow.touch();
                Ok((flow, node))
            })
            .await?;

        self.commit(vec![Mutation::Put(Record::Flow(flow))]).await?;
        tracing::info!(%flow_id, node_id = %node.id, "Flow node added");
        Ok(node)
    }

    /// Removes a node and every edge touching it.
    #[tracing::instrument(skip(self))]
    pub async fn remove_node(&self, flow_id: FlowId, node_id: FlowNodeId) -> Result<Flow, MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        let flow = self
            .read(|state| {
                let flow = state.require_flow(flow_id)?;
                ensure_stopped(flow)?;
                if flow.node(node_id).is_none() {
                    return Err(MediationError::not_found(EntityKind::FlowNode, node_id));
                }
                let mut flow = flow.clone();
                flow.nodes.retain(|n| n.id != node_id);
                flow.edges
                    .retain(|e| e.from_node_id != node_id && e.to_node_id != node_id);
                flow.touch();
                Ok(flow)
            })
            .await?;

        self.commit(vec![Mutation::Put(Record::Flow(flow.clone()))])
            .await?;
        tracing::info!(%flow_id, %node_id, "Flow node removed");
        Ok(flow)
    }

    /// Connects two nodes of the flow.
    ///
    /// Rejected with a validation error when the branch key collides with a
    /// sibling, and with a cycle error when the edge would close a cycle.
    #[tracing::instrument(skip(self, input), fields(from = %input.from, to = %input.to))]
    pub async fn add_edge(
        &self,
        flow_id: FlowId,
        input: NewFlowEdge,
    ) -> Result<FlowEdge, MediationError> {
        let condition = normalize_condition(input.condition);
        let _guard = self.flow_locks.lock(flow_id).await;
        let (flow, edge) = self
            .read(|state| {
                let flow = state.require_flow(flow_id)?;
                ensure_stopped(flow)?;
                let edge = check_new_edge(
                    flow,
                    input.from,
                    input.to,
                    condition.as_deref(),
                    FlowEdgeId::new_random(),
                )?;
                let mut flow = flow.clone();
                flow.edges.push(edge.clone());
                flow.touch();
                Ok::<_, MediationError>((flow, edge))
            })
            .await
            .inspect_err(|err| tracing::debug!(error = %err, "Edge rejected"))?;

        self.commit(vec![Mutation::Put(Record::Flow(flow))]).await?;
        tracing::info!(%flow_id, edge_id = %edge.id, condition = ?edge.condition, "Flow edge added");
        Ok(edge)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_edge(&self, flow_id: FlowId, edge_id: FlowEdgeId) -> Result<Flow, MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        let flow = self
            .read(|state| {
                let flow = state.require_flow(flow_id)?;
                ensure_stopped(flow)?;
                if !flow.edges.iter().any(|e| e.id == edge_id) {
                    return Err(MediationError::not_found(EntityKind::FlowEdge, edge_id));
                }
                let mut flow = flow.clone();
                flow.edges.retain(|e| e.id != edge_id);
                flow.touch();
                Ok(flow)
            })
            .await?;

        self.commit(vec![Mutation::Put(Record::Flow(flow.clone()))])
            .await?;
        tracing::info!(%flow_id, %edge_id, "Flow edge removed");
        Ok(flow)
    }

    /// Runs the full-graph checks required before a flow may run or deploy.
    pub async fn validate_flow(&self, flow_id: FlowId) -> Result<Vec<Issue>, MediationError> {
        self.read(|state| state.require_flow(flow_id).map(|f| state.flow_issues(f)))
            .await
    }
}

//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mediation::{
    FlowId, FlowNodeId, MediationService, MemoryStore, NewFamily, NewFlowEdge, NewFlowNode,
    NewParameter, NewSubnode, NewVersion, NodeFamily, NodeKind, NodeVersion, NodeVersionId,
    ParameterId, ParameterType, Position, SubnodeId,
};

pub async fn service() -> (MediationService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let svc = MediationService::open(store.clone()).await.unwrap();
    (svc, store)
}

pub async fn parameter(
    svc: &MediationService,
    key: &str,
    datatype: ParameterType,
    default: &str,
    required: bool,
) -> ParameterId {
    svc.create_parameter(NewParameter {
        key: key.into(),
        datatype,
        default_value: Some(default.into()),
        required,
        description: None,
    })
    .await
    .unwrap()
    .id
}

pub async fn family(svc: &MediationService, name: &str, kind: NodeKind) -> NodeFamily {
    svc.create_family(NewFamily {
        name: name.into(),
        description: String::new(),
        kind,
    })
    .await
    .unwrap()
}

pub async fn version(
    svc: &MediationService,
    family: &NodeFamily,
    parameters: &[ParameterId],
) -> NodeVersion {
    svc.create_version(
        family.id,
        NewVersion {
            script_reference: format!("{}.py", family.name.to_lowercase().replace(' ', "_")),
            changelog: String::new(),
            parameter_ids: parameters.iter().copied().collect::<BTreeSet<_>>(),
            created_by: Some("tester".into()),
        },
    )
    .await
    .unwrap()
}

/// A complete subnode of a fresh family with no parameters.
pub async fn plain_subnode(svc: &MediationService, name: &str, kind: NodeKind) -> SubnodeId {
    let family = family(svc, &format!("{name} family"), kind).await;
    let version = version(svc, &family, &[]).await;
    subnode(svc, version.id, name, &[]).await
}

pub async fn subnode(
    svc: &MediationService,
    version_id: NodeVersionId,
    name: &str,
    values: &[(&str, &str)],
) -> SubnodeId {
    let view = svc
        .create_subnode(NewSubnode {
            name: name.into(),
            node_version_id: version_id,
        })
        .await
        .unwrap();
    if !values.is_empty() {
        let values: BTreeMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        svc.set_parameter_values(view.subnode.id, values)
            .await
            .unwrap();
    }
    view.subnode.id
}

pub async fn place(svc: &MediationService, flow_id: FlowId, subnode_id: SubnodeId) -> FlowNodeId {
    svc.add_node(
        flow_id,
        NewFlowNode {
            subnode_id,
            position: Position::default(),
        },
    )
    .await
    .unwrap()
    .id
}

pub fn edge(from: FlowNodeId, to: FlowNodeId, condition: Option<&str>) -> NewFlowEdge {
    NewFlowEdge {
        from,
        to,
        condition: condition.map(str::to_string),
    }
}

/// Collector -> decoder -> distributor, every node complete.
pub struct Pipeline {
    pub flow_id: FlowId,
    pub nodes: [FlowNodeId; 3],
}

pub async fn pipeline(svc: &MediationService, name: &str) -> Pipeline {
    let flow = svc.create_flow(name).await.unwrap();
    let collector = plain_subnode(svc, &format!("{name}-collector"), NodeKind::Collector).await;
    let decoder = plain_subnode(svc, &format!("{name}-decoder"), NodeKind::Decoder).await;
    let distributor = plain_subnode(svc, &format!("{name}-distributor"), NodeKind::Distributor).await;
    let nodes = [
        place(svc, flow.id, collector).await,
        place(svc, flow.id, decoder).await,
        place(svc, flow.id, distributor).await,
    ];
    svc.add_edge(flow.id, edge(nodes[0], nodes[1], None))
        .await
        .unwrap();
    svc.add_edge(flow.id, edge(nodes[1], nodes[2], None))
        .await
        .unwrap();
    Pipeline {
        flow_id: flow.id,
        nodes,
    }
}

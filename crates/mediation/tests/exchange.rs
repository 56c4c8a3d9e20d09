//! Flow export and import.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use mediation::{
    Batch, ConfigState, ConfigStore, ErrorKind, ExportedEdgeType, MediationService, MemoryStore,
    Mutation, NodeKind, ParameterType, Record, StoreError, SubnodeId,
};

/// Memory store whose flow commits can be slowed down.
#[derive(Default)]
struct SlowFlowCommits {
    inner: MemoryStore,
    slow: AtomicBool,
}

#[async_trait]
impl ConfigStore for SlowFlowCommits {
    async fn load(&self) -> Result<ConfigState, StoreError> {
        self.inner.load().await
    }

    async fn commit(&self, batch: &Batch) -> Result<(), StoreError> {
        let writes_flow = batch
            .iter()
            .any(|m| matches!(m, Mutation::Put(Record::Flow(_))));
        if writes_flow && self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.inner.commit(batch).await
    }
}

#[tokio::test]
async fn export_then_import_preserves_the_graph() {
    let (svc, _) = service().await;
    let p = pipeline(&svc, "roundtrip").await;
    let reject = plain_subnode(&svc, "reject", NodeKind::Distributor).await;
    let reject_node = place(&svc, p.flow_id, reject).await;
    svc.add_edge(p.flow_id, edge(p.nodes[1], reject_node, Some("invalid")))
        .await
        .unwrap();

    let exported = svc.export_flow(p.flow_id).await.unwrap();
    assert_eq!(exported.metadata.node_count, 4);
    assert_eq!(exported.metadata.edge_count, 3);
    assert_eq!(
        exported
            .edges
            .iter()
            .filter(|e| e.edge_type == ExportedEdgeType::Conditional)
            .count(),
        1
    );

    let imported = svc.import_flow(exported.clone()).await.unwrap();
    assert_ne!(imported.id, p.flow_id);
    assert!(!imported.is_running);
    assert!(!imported.is_deployed);
    assert_eq!(imported.nodes.len(), 4);
    assert_eq!(imported.edges.len(), 3);

    let mut original: Vec<_> = svc
        .get_flow(p.flow_id)
        .await
        .unwrap()
        .edges
        .into_iter()
        .map(|e| e.condition)
        .collect();
    let mut copied: Vec<_> = imported.edges.iter().map(|e| e.condition.clone()).collect();
    original.sort();
    copied.sort();
    assert_eq!(original, copied);

    // Existing subnodes are reused rather than duplicated.
    let before = svc.list_subnodes(None).await.len();
    svc.import_flow(exported).await.unwrap();
    assert_eq!(svc.list_subnodes(None).await.len(), before);
    assert!(svc.validate_flow(imported.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn import_recreates_missing_subnodes_from_parameters() {
    let (svc, _) = service().await;
    let host = parameter(&svc, "host", ParameterType::String, "", true).await;
    let collectors = family(&svc, "SFTP Collector", NodeKind::Collector).await;
    let v1 = version(&svc, &collectors, &[host]).await;
    let prod = subnode(&svc, v1.id, "prod-sftp", &[("host", "10.0.0.1")]).await;
    let flow = svc.create_flow("ingest").await.unwrap();
    place(&svc, flow.id, prod).await;

    let mut exported = svc.export_flow(flow.id).await.unwrap();
    assert_eq!(exported.nodes[0].parameters["host"], "10.0.0.1");
    assert_eq!(exported.nodes[0].connector, "SFTP Collector");
    exported.nodes[0].config.subnode_id = SubnodeId::new_random();
    exported.nodes[0].label = "restored-sftp".into();

    let imported = svc.import_flow(exported).await.unwrap();
    let restored = svc
        .get_subnode(imported.nodes[0].subnode_id)
        .await
        .unwrap();
    assert_ne!(restored.subnode.id, prod);
    assert_eq!(restored.subnode.name, "restored-sftp");
    assert_eq!(restored.subnode.node_version_id, v1.id);
    assert!(restored.status.is_complete());
}

#[tokio::test]
async fn import_with_a_cycle_creates_nothing() {
    let (svc, _) = service().await;
    let p = pipeline(&svc, "cyclic").await;
    let mut exported = svc.export_flow(p.flow_id).await.unwrap();
    let mut back = exported.edges[0].clone();
    back.source = exported.edges[1].target;
    back.target = exported.edges[0].source;
    back.condition = Some("loop".into());
    back.edge_type = ExportedEdgeType::Conditional;
    exported.edges.push(back);
    exported.nodes[0].config.subnode_id = SubnodeId::new_random();
    exported.nodes[0].label = "would-be-created".into();

    let flows_before = svc.list_flows().await.len();
    let subnodes_before = svc.list_subnodes(None).await.len();
    let err = svc.import_flow(exported).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cycle);
    assert_eq!(svc.list_flows().await.len(), flows_before);
    assert_eq!(svc.list_subnodes(None).await.len(), subnodes_before);
}

#[tokio::test]
async fn exported_document_uses_camel_case() {
    let (svc, _) = service().await;
    let p = pipeline(&svc, "shape").await;
    let exported = svc.export_flow(p.flow_id).await.unwrap();
    let json = serde_json::to_value(&exported).unwrap();

    assert_eq!(json["flow"]["name"], "shape");
    assert_eq!(json["metadata"]["nodeCount"], 3);
    assert_eq!(json["nodes"][0]["type"], "collector");
    assert!(json["nodes"][0]["config"]["subnodeId"].is_string());
    assert_eq!(json["edges"][0]["type"], "default");
    assert!(json["edges"][0].get("condition").is_none());

    let parsed: mediation::FlowExport = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, exported);
}

#[tokio::test]
async fn nodes_sharing_a_subnode_share_the_recreated_one() {
    let (svc, _) = service().await;
    let flow = svc.create_flow("fan-out").await.unwrap();
    let collector = plain_subnode(&svc, "collector", NodeKind::Collector).await;
    let decoder = plain_subnode(&svc, "shared-dec", NodeKind::Decoder).await;
    let source = place(&svc, flow.id, collector).await;
    let x = place(&svc, flow.id, decoder).await;
    let y = place(&svc, flow.id, decoder).await;
    svc.add_edge(flow.id, edge(source, x, Some("x"))).await.unwrap();
    svc.add_edge(flow.id, edge(source, y, Some("y"))).await.unwrap();
    assert!(svc.validate_flow(flow.id).await.unwrap().is_empty());
    let exported = svc.export_flow(flow.id).await.unwrap();

    // Same registry, no subnodes or flows.
    let mut state = svc.snapshot().await;
    state.subnodes.clear();
    state.flows.clear();
    let target = MediationService::open(Arc::new(MemoryStore::with_state(state)))
        .await
        .unwrap();

    let imported = target.import_flow(exported).await.unwrap();
    assert_eq!(imported.nodes.len(), 3);
    assert_eq!(imported.edges.len(), 2);
    assert_eq!(target.list_subnodes(None).await.len(), 2);
    let shared: Vec<_> = imported
        .nodes
        .iter()
        .filter(|n| n.subnode_id != imported.nodes[0].subnode_id)
        .map(|n| n.subnode_id)
        .collect();
    assert_eq!(shared.len(), 2);
    assert_eq!(shared[0], shared[1]);
    assert!(target.validate_flow(imported.id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_a_subnode_waits_for_an_import_that_places_it() {
    let store = Arc::new(SlowFlowCommits::default());
    let svc = Arc::new(MediationService::open(store.clone()).await.unwrap());
    let decoder = plain_subnode(&svc, "decoder", NodeKind::Decoder).await;
    let flow = svc.create_flow("decode").await.unwrap();
    let node = place(&svc, flow.id, decoder).await;
    let exported = svc.export_flow(flow.id).await.unwrap();
    svc.remove_node(flow.id, node).await.unwrap();

    store.slow.store(true, Ordering::SeqCst);
    let import = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move { svc.import_flow(exported).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let deleted = svc.delete_subnode(decoder).await;
    let imported = import.await.unwrap().unwrap();

    assert_eq!(deleted.unwrap_err().kind(), ErrorKind::Conflict);
    assert_eq!(imported.nodes[0].subnode_id, decoder);
    assert!(svc.get_subnode(decoder).await.is_ok());
}

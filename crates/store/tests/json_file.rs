//! The JSON file store under the real service.

use std::sync::Arc;

use mediation::{
    ConfigStore, ErrorKind, MediationService, MemoryStore, NewFamily, NewVersion, NodeKind,
    StoreError,
};
use store::JsonFileStore;

async fn seeded(svc: &MediationService, name: &str) -> mediation::NodeVersion {
    let family = svc
        .create_family(NewFamily {
            name: name.into(),
            description: String::new(),
            kind: NodeKind::Collector,
        })
        .await
        .unwrap();
    svc.create_version(
        family.id,
        NewVersion {
            script_reference: "collect.py".into(),
            changelog: "initial".into(),
            parameter_ids: Default::default(),
            created_by: None,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn reopening_restores_the_activation_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mediation").join("config.json");

    let version = {
        let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let svc = MediationService::open(store).await.unwrap();
        let version = seeded(&svc, "SFTP Collector").await;
        svc.activate(version.id, false).await.unwrap();
        svc.create_flow("ingest").await.unwrap();
        version
    };
    assert!(path.exists());

    let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
    let svc = MediationService::open(store).await.unwrap();
    let active = svc.active_version().await.unwrap();
    assert_eq!(active.id, version.id);
    assert!(active.is_deployed);
    assert_eq!(svc.list_flows().await.len(), 1);
}

#[tokio::test]
async fn missing_file_is_an_empty_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path().join("absent.json"))
        .await
        .unwrap();
    let state = store.load().await.unwrap();
    assert!(state.families.is_empty());
    assert!(state.flows.is_empty());
}

#[tokio::test]
async fn garbage_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, b"{ not json").await.unwrap();

    let err = JsonFileStore::open(&path).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}

#[tokio::test]
async fn failed_write_keeps_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    tokio::fs::write(&blocker, b"a file, not a directory")
        .await
        .unwrap();

    let store = Arc::new(JsonFileStore::open(blocker.join("config.json")).await.unwrap());
    let svc = MediationService::open(store.clone()).await.unwrap();
    let err = svc
        .create_family(NewFamily {
            name: "SFTP Collector".into(),
            description: String::new(),
            kind: NodeKind::Collector,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(svc.list_families().await.is_empty());
    assert!(store.load().await.unwrap().families.is_empty());
}

#[tokio::test]
async fn inconsistent_documents_are_refused() {
    let memory = Arc::new(MemoryStore::new());
    let svc = MediationService::open(memory.clone()).await.unwrap();
    seeded(&svc, "SFTP Collector").await;
    seeded(&svc, "FTP Collector").await;
    let mut state = memory.snapshot().await;
    for version in state.versions.values_mut() {
        version.is_deployed = true;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let document = serde_json::json!({
        "format": 1,
        "saved_at": "2026-01-01T00:00:00Z",
        "config": state,
    });
    tokio::fs::write(&path, serde_json::to_vec(&document).unwrap())
        .await
        .unwrap();

    let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
    let err = MediationService::open(store).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

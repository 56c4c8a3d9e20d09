//! Drives the HTTP API end to end over a real socket.

use std::sync::Arc;

use mediation::{MediationService, MemoryStore};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

struct Server {
    base: String,
    client: Client,
}

impl Server {
    async fn start() -> Self {
        let svc = MediationService::open(Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(api::serve(listener, Arc::new(svc), std::future::pending()));
        Self {
            base: format!("http://{addr}"),
            client: Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn post_empty(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn patch(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .patch(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Family with one version, returning `(family_id, version_path)`.
    async fn family(&self, name: &str, kind: &str, parameter_ids: Value) -> (String, String) {
        let (status, family) = self
            .post("/nodes", json!({ "name": name, "kind": kind }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = family["id"].as_str().unwrap().to_string();
        let (status, version) = self
            .post(
                &format!("/nodes/{id}/versions"),
                json!({ "script_reference": "node.py", "parameter_ids": parameter_ids }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let number = version["version_number"].as_u64().unwrap();
        let path = format!("/nodes/{id}/versions/{number}");
        (id, path)
    }
}

#[tokio::test]
async fn health_answers() {
    let server = Server::start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn subnode_becomes_selectable_once_complete() {
    let server = Server::start().await;
    let (status, host) = server
        .post(
            "/parameters",
            json!({ "key": "host", "datatype": "string", "required": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (family_id, _) = server
        .family("SFTP Collector", "collector", json!([host["id"]]))
        .await;
    let (_, detail) = server.get(&format!("/nodes/{family_id}")).await;
    let version_id = detail["versions"][0]["id"].clone();

    let (status, subnode) = server
        .post(
            "/subnodes",
            json!({ "name": "prod-sftp", "node_version_id": version_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(subnode["status"], "incomplete");
    let id = subnode["id"].as_str().unwrap().to_string();

    let (status, error) = server.post(&format!("/subnodes/{id}/select"), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["kind"], "validation");
    assert_eq!(error["details"]["violations"][0]["field"], "host");

    let (status, _) = server
        .patch(
            &format!("/subnodes/{id}/parameters"),
            json!({ "values": { "host": "10.0.0.1" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, selected) = server.post(&format!("/subnodes/{id}/select"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(selected["is_selected"], true);
}

#[tokio::test]
async fn activation_conflict_then_force() {
    let server = Server::start().await;
    let (_, a) = server.family("SFTP Collector", "collector", json!([])).await;
    let (_, b) = server.family("ASN1 Decoder", "decoder", json!([])).await;

    let (status, _) = server.post(&format!("{a}/deploy"), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, error) = server.post(&format!("{b}/deploy"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["kind"], "conflict");
    assert_eq!(error["details"]["blocking"]["label"], "SFTP Collector v1");

    let (status, active) = server
        .post(&format!("{b}/deploy"), json!({ "force": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["is_deployed"], true);

    let (_, current) = server.get("/nodes/active").await;
    assert_eq!(current["id"], active["id"]);
    let (_, previous) = server.get(&a).await;
    assert_eq!(previous["is_deployed"], false);
}

#[tokio::test]
async fn cycle_is_rejected_with_its_path() {
    let server = Server::start().await;
    let (status, flow) = server.post("/flows", json!({ "name": "cdr" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let flow_id = flow["id"].as_str().unwrap().to_string();

    let mut nodes = Vec::new();
    for (name, kind) in [("collect", "collector"), ("decode", "decoder"), ("ship", "distributor")] {
        let (family_id, _) = server.family(name, kind, json!([])).await;
        let (_, detail) = server.get(&format!("/nodes/{family_id}")).await;
        let (_, subnode) = server
            .post(
                "/subnodes",
                json!({ "name": name, "node_version_id": detail["versions"][0]["id"] }),
            )
            .await;
        let (status, node) = server
            .post(
                &format!("/flows/{flow_id}/nodes"),
                json!({ "subnode_id": subnode["id"] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        nodes.push(node["id"].clone());
    }
    for pair in nodes.windows(2) {
        let (status, _) = server
            .post(
                &format!("/flows/{flow_id}/edges"),
                json!({ "from": pair[0], "to": pair[1] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, error) = server
        .post(
            &format!("/flows/{flow_id}/edges"),
            json!({ "from": nodes[2], "to": nodes[0] }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["kind"], "cycle");
    assert_eq!(error["details"]["path"].as_array().unwrap().len(), 4);

    let (_, validation) = server.get(&format!("/flows/{flow_id}/validate")).await;
    assert_eq!(validation["runnable"], true);
    let (status, running) = server.post(&format!("/flows/{flow_id}/run"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(running["is_running"], true);

    let (status, exported) = server.get(&format!("/flows/{flow_id}/export")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exported["metadata"]["edgeCount"], 2);
    let (status, imported) = server.post("/flows/import", exported).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(imported["is_running"], false);
    assert_eq!(imported["edges"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_flow_is_not_found() {
    let server = Server::start().await;
    let (status, error) = server
        .post(
            "/flows/6f0c1b1e-8a52-4a4c-9d55-7d1f7f3e2b10/run",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["kind"], "not_found");
}

#[tokio::test]
async fn deploy_accepts_a_missing_body() {
    let server = Server::start().await;
    let (_, version) = server.family("SFTP Collector", "collector", json!([])).await;

    let (status, deployed) = server.post_empty(&format!("{version}/deploy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deployed["is_deployed"], true);

    let (status, active) = server.get("/nodes/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["id"], deployed["id"]);
}

#[tokio::test]
async fn malformed_requests_get_the_error_body() {
    let server = Server::start().await;

    let response = server
        .client
        .post(format!("{}/flows", server.base))
        .header("content-type", "application/json")
        .body("{\"name\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "invalid_request");
    assert!(body["message"].is_string());

    let (status, body) = server.get("/flows/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
}

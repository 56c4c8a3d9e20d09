//! `/flows`: graph edits, validation, runtime status and exchange.

use axum::extract::State;
use axum::http::StatusCode;
use mediation::{
    Flow, FlowEdge, FlowEdgeId, FlowExport, FlowId, FlowNode, FlowNodeId, FlowStatus,
    FlowSummary, Issue, NewFlowEdge, NewFlowNode,
};
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::extract::{Json, Path};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct NewFlow {
    name: String,
}

#[derive(Debug, Serialize)]
pub(super) struct Validation {
    /// `true` when no issue is blocking.
    runnable: bool,
    issues: Vec<Issue>,
}

pub(super) async fn list(State(svc): State<AppState>) -> Json<Vec<FlowSummary>> {
    Json(svc.list_flows().await)
}

pub(super) async fn create(
    State(svc): State<AppState>,
    Json(input): Json<NewFlow>,
) -> ApiResult<(StatusCode, Json<Flow>)> {
    let flow = svc.create_flow(&input.name).await?;
    Ok((StatusCode::CREATED, Json(flow)))
}

pub(super) async fn get(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<Flow>> {
    Ok(Json(svc.get_flow(id).await?))
}

pub(super) async fn delete(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<StatusCode> {
    svc.delete_flow(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn add_node(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
    Json(input): Json<NewFlowNode>,
) -> ApiResult<(StatusCode, Json<FlowNode>)> {
    let node = svc.add_node(id, input).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

pub(super) async fn remove_node(
    State(svc): State<AppState>,
    Path((id, node)): Path<(FlowId, FlowNodeId)>,
) -> ApiResult<Json<Flow>> {
    Ok(Json(svc.remove_node(id, node).await?))
}

pub(super) async fn add_edge(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
    Json(input): Json<NewFlowEdge>,
) -> ApiResult<(StatusCode, Json<FlowEdge>)> {
    let edge = svc.add_edge(id, input).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

pub(super) async fn remove_edge(
    State(svc): State<AppState>,
    Path((id, edge)): Path<(FlowId, FlowEdgeId)>,
) -> ApiResult<Json<Flow>> {
    Ok(Json(svc.remove_edge(id, edge).await?))
}

pub(super) async fn validate(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<Validation>> {
    let issues = svc.validate_flow(id).await?;
    Ok(Json(Validation {
        runnable: !issues.iter().any(Issue::is_blocking),
        issues,
    }))
}

pub(super) async fn status(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<FlowStatus>> {
    Ok(Json(svc.flow_status(id).await?))
}

pub(super) async fn run(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<FlowStatus>> {
    Ok(Json(svc.run_flow(id).await?))
}

pub(super) async fn stop(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<FlowStatus>> {
    Ok(Json(svc.stop_flow(id).await?))
}

pub(super) async fn restart(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<FlowStatus>> {
    Ok(Json(svc.restart_flow(id).await?))
}

pub(super) async fn deploy(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<FlowStatus>> {
    Ok(Json(svc.deploy_flow(id).await?))
}

pub(super) async fn undeploy(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<FlowStatus>> {
    Ok(Json(svc.undeploy_flow(id).await?))
}

pub(super) async fn export(
    State(svc): State<AppState>,
    Path(id): Path<FlowId>,
) -> ApiResult<Json<FlowExport>> {
    Ok(Json(svc.export_flow(id).await?))
}

pub(super) async fn import(
    State(svc): State<AppState>,
    Json(document): Json<FlowExport>,
) -> ApiResult<(StatusCode, Json<Flow>)> {
    let flow = svc.import_flow(document).await?;
    Ok((StatusCode::CREATED, Json(flow)))
}

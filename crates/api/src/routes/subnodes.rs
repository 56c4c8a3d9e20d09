//! `/subnodes`

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use mediation::{NewSubnode, NodeVersionId, SubnodeId, SubnodeView};
use serde::Deserialize;

use super::ApiResult;
use crate::extract::{Json, Path, Query};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    #[serde(default)]
    version: Option<NodeVersionId>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SetValues {
    /// Parameter key to value. A blank value clears the explicit value.
    values: BTreeMap<String, String>,
}

pub(super) async fn list(
    State(svc): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<SubnodeView>> {
    Json(svc.list_subnodes(query.version).await)
}

pub(super) async fn create(
    State(svc): State<AppState>,
    Json(input): Json<NewSubnode>,
) -> ApiResult<(StatusCode, Json<SubnodeView>)> {
    let view = svc.create_subnode(input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub(super) async fn get(
    State(svc): State<AppState>,
    Path(id): Path<SubnodeId>,
) -> ApiResult<Json<SubnodeView>> {
    Ok(Json(svc.get_subnode(id).await?))
}

pub(super) async fn delete(
    State(svc): State<AppState>,
    Path(id): Path<SubnodeId>,
) -> ApiResult<StatusCode> {
    svc.delete_subnode(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn set_values(
    State(svc): State<AppState>,
    Path(id): Path<SubnodeId>,
    Json(body): Json<SetValues>,
) -> ApiResult<Json<SubnodeView>> {
    Ok(Json(svc.set_parameter_values(id, body.values).await?))
}

pub(super) async fn select(
    State(svc): State<AppState>,
    Path(id): Path<SubnodeId>,
) -> ApiResult<Json<SubnodeView>> {
    Ok(Json(svc.select_subnode(id).await?))
}

pub(super) async fn deselect(
    State(svc): State<AppState>,
    Path(id): Path<SubnodeId>,
) -> ApiResult<Json<SubnodeView>> {
    Ok(Json(svc.deselect_subnode(id).await?))
}

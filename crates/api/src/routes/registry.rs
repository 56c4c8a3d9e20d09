//! `/nodes`: families, versions and the activation slot.
//!
//! Versions are addressed by family id and version number, as users see them.

use axum::extract::State;
use axum::http::StatusCode;
use mediation::{
    FamilyDetail, NewFamily, NewVersion, NodeFamily, NodeFamilyId, NodeSummary, NodeVersion,
    VersionDetail, VersionPatch,
};
use serde::Deserialize;

use super::ApiResult;
use crate::extract::{Json, Path, Query};
use crate::AppState;

type VersionPath = Path<(NodeFamilyId, u32)>;

#[derive(Debug, Default, Deserialize)]
pub(super) struct CloneQuery {
    #[serde(default)]
    created_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct DeployRequest {
    /// Take the slot from another family's version.
    #[serde(default)]
    force: bool,
}

pub(super) async fn list(State(svc): State<AppState>) -> Json<Vec<NodeSummary>> {
    Json(svc.list_families().await)
}

pub(super) async fn create_family(
    State(svc): State<AppState>,
    Json(input): Json<NewFamily>,
) -> ApiResult<(StatusCode, Json<NodeFamily>)> {
    let family = svc.create_family(input).await?;
    Ok((StatusCode::CREATED, Json(family)))
}

pub(super) async fn active(State(svc): State<AppState>) -> Json<Option<NodeVersion>> {
    Json(svc.active_version().await)
}

pub(super) async fn get_family(
    State(svc): State<AppState>,
    Path(id): Path<NodeFamilyId>,
) -> ApiResult<Json<FamilyDetail>> {
    Ok(Json(svc.get_family(id).await?))
}

pub(super) async fn delete_family(
    State(svc): State<AppState>,
    Path(id): Path<NodeFamilyId>,
) -> ApiResult<StatusCode> {
    svc.delete_family(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn create_version(
    State(svc): State<AppState>,
    Path(id): Path<NodeFamilyId>,
    Json(input): Json<NewVersion>,
) -> ApiResult<(StatusCode, Json<NodeVersion>)> {
    let version = svc.create_version(id, input).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub(super) async fn get_version(
    State(svc): State<AppState>,
    Path((id, number)): VersionPath,
) -> ApiResult<Json<VersionDetail>> {
    let version = svc.find_version(id, number).await?;
    Ok(Json(svc.get_version(version.id).await?))
}

pub(super) async fn update_version(
    State(svc): State<AppState>,
    Path((id, number)): VersionPath,
    Json(patch): Json<VersionPatch>,
) -> ApiResult<Json<NodeVersion>> {
    let version = svc.find_version(id, number).await?;
    Ok(Json(svc.update_version(version.id, patch).await?))
}

pub(super) async fn delete_version(
    State(svc): State<AppState>,
    Path((id, number)): VersionPath,
) -> ApiResult<StatusCode> {
    let version = svc.find_version(id, number).await?;
    svc.delete_version(version.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn clone_version(
    State(svc): State<AppState>,
    Path((id, number)): VersionPath,
    Query(query): Query<CloneQuery>,
) -> ApiResult<(StatusCode, Json<NodeVersion>)> {
    let version = svc.find_version(id, number).await?;
    let cloned = svc.clone_version(version.id, query.created_by).await?;
    Ok((StatusCode::CREATED, Json(cloned)))
}

pub(super) async fn deprecate_version(
    State(svc): State<AppState>,
    Path((id, number)): VersionPath,
) -> ApiResult<Json<NodeVersion>> {
    let version = svc.find_version(id, number).await?;
    Ok(Json(svc.deprecate_version(version.id).await?))
}

/// Activates the version. The body is optional. Without `force`, taking the
/// slot from another family answers 409 with the current holder in
/// `details.blocking`.
pub(super) async fn deploy(
    State(svc): State<AppState>,
    Path((id, number)): VersionPath,
    request: Option<Json<DeployRequest>>,
) -> ApiResult<Json<NodeVersion>> {
    let Json(request) = request.unwrap_or_else(|| Json(DeployRequest::default()));
    let version = svc.find_version(id, number).await?;
    Ok(Json(svc.activate(version.id, request.force).await?))
}

pub(super) async fn undeploy(
    State(svc): State<AppState>,
    Path((id, number)): VersionPath,
) -> ApiResult<Json<NodeVersion>> {
    let version = svc.find_version(id, number).await?;
    Ok(Json(svc.deactivate(version.id).await?))
}

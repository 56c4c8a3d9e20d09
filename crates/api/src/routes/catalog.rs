//! `/parameters`

use axum::extract::State;
use axum::http::StatusCode;
use mediation::{NewParameter, Parameter, ParameterId, ParameterPatch};

use super::ApiResult;
use crate::extract::{Json, Path};
use crate::AppState;

pub(super) async fn list(State(svc): State<AppState>) -> Json<Vec<Parameter>> {
    Json(svc.list_parameters().await)
}

pub(super) async fn create(
    State(svc): State<AppState>,
    Json(input): Json<NewParameter>,
) -> ApiResult<(StatusCode, Json<Parameter>)> {
    let parameter = svc.create_parameter(input).await?;
    Ok((StatusCode::CREATED, Json(parameter)))
}

pub(super) async fn get(
    State(svc): State<AppState>,
    Path(id): Path<ParameterId>,
) -> ApiResult<Json<Parameter>> {
    Ok(Json(svc.get_parameter(id).await?))
}

pub(super) async fn update(
    State(svc): State<AppState>,
    Path(id): Path<ParameterId>,
    Json(patch): Json<ParameterPatch>,
) -> ApiResult<Json<Parameter>> {
    Ok(Json(svc.update_parameter(id, patch).await?))
}

pub(super) async fn delete(
    State(svc): State<AppState>,
    Path(id): Path<ParameterId>,
) -> ApiResult<StatusCode> {
    svc.delete_parameter(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

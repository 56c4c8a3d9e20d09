//! Route table.

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::AppState;

mod catalog;
mod flows;
mod registry;
mod subnodes;

type ApiResult<T> = Result<T, crate::ApiError>;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/parameters",
            get(catalog::list).post(catalog::create),
        )
        .route(
            "/parameters/{id}",
            get(catalog::get).patch(catalog::update).delete(catalog::delete),
        )
        .route("/nodes", get(registry::list).post(registry::create_family))
        .route("/nodes/active", get(registry::active))
        .route(
            "/nodes/{id}",
            get(registry::get_family).delete(registry::delete_family),
        )
        .route("/nodes/{id}/versions", post(registry::create_version))
        .route(
            "/nodes/{id}/versions/{v}",
            get(registry::get_version)
                .patch(registry::update_version)
                .delete(registry::delete_version),
        )
        .route("/nodes/{id}/versions/{v}/clone", post(registry::clone_version))
        .route(
            "/nodes/{id}/versions/{v}/deprecate",
            post(registry::deprecate_version),
        )
        .route("/nodes/{id}/versions/{v}/deploy", post(registry::deploy))
        .route("/nodes/{id}/versions/{v}/undeploy", post(registry::undeploy))
        .route("/subnodes", get(subnodes::list).post(subnodes::create))
        .route(
            "/subnodes/{id}",
            get(subnodes::get).delete(subnodes::delete),
        )
        .route(
            "/subnodes/{id}/parameters",
            axum::routing::patch(subnodes::set_values),
        )
        .route("/subnodes/{id}/select", post(subnodes::select))
        .route("/subnodes/{id}/deselect", post(subnodes::deselect))
        .route("/flows", get(flows::list).post(flows::create))
        .route("/flows/import", post(flows::import))
        .route("/flows/{id}", get(flows::get).delete(flows::delete))
        .route("/flows/{id}/nodes", post(flows::add_node))
        .route("/flows/{id}/nodes/{node}", axum::routing::delete(flows::remove_node))
        .route("/flows/{id}/edges", post(flows::add_edge))
        .route("/flows/{id}/edges/{edge}", axum::routing::delete(flows::remove_edge))
        .route("/flows/{id}/validate", get(flows::validate))
        .route("/flows/{id}/status", get(flows::status))
        .route("/flows/{id}/run", post(flows::run))
        .route("/flows/{id}/stop", post(flows::stop))
        .route("/flows/{id}/restart", post(flows::restart))
        .route("/flows/{id}/deploy", post(flows::deploy))
        .route("/flows/{id}/undeploy", post(flows::undeploy))
        .route("/flows/{id}/export", get(flows::export))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

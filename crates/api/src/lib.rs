//! HTTP/JSON adapter for the mediation configuration service.
//!
//! Every route maps onto one [`MediationService`] operation. Request bodies
//! deserialise straight into the domain input types, and every
//! [`mediation::MediationError`] becomes a `{kind, message, details}` body with
//! a status derived from its kind (see [`error`]).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Routing, extraction and status codes only. No domain
//! rules live here.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`error`] | `ApiError` and the error-to-status mapping |
//! | [`extract`] | `Json`, `Path` and `Query` with JSON error bodies |
//! | [`routes`] | Handlers grouped by component |

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use mediation::MediationService;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub mod error;
pub mod extract;
pub mod routes;

pub use error::ApiError;

/// Shared handler state.
pub type AppState = Arc<MediationService>;

/// Builds the full router.
pub fn router(service: AppState) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));
    routes::router().layer(trace).with_state(service)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    service: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP API listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

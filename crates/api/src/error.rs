//! Error responses.
//!
//! | Kind | Status |
//! |------|--------|
//! | `not_found` | 404 |
//! | `duplicate_name`, `conflict`, `cycle` | 409 |
//! | `validation` | 422 |
//! | `precondition` | 412 |
//! | `storage` | 503 |
//! | `invalid_request` | status of the extractor rejection (400, 415 or 422) |

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mediation::{ErrorKind, MediationError};
use serde::Serialize;
use serde_json::Value;

/// Wire form of every error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    /// The variant's structured payload: blocking entity, violations, cycle
    /// path or blocking issues.
    pub details: Value,
}

/// An error on its way out as an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// The operation itself failed.
    Domain(MediationError),
    /// The request never reached an operation: malformed body, path or query.
    Request { status: StatusCode, message: String },
}

impl From<MediationError> for ApiError {
    fn from(err: MediationError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Request {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Request {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Request {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateName | ErrorKind::Conflict | ErrorKind::Cycle => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Precondition => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// The payload of the error variant, without the variant name.
fn details(err: &MediationError) -> Value {
    match serde_json::to_value(err) {
        Ok(Value::Object(map)) => map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Domain(err) => {
                let kind = err.kind();
                if err.is_infrastructure() {
                    tracing::error!(error = %err, "Request failed on storage");
                } else {
                    tracing::debug!(error = %err, kind = kind.as_str(), "Request rejected");
                }
                let body = ErrorBody {
                    kind: kind.as_str(),
                    message: err.to_string(),
                    details: details(&err),
                };
                (status_for(kind), body)
            }
            ApiError::Request { status, message } => {
                tracing::debug!(%status, %message, "Malformed request");
                let body = ErrorBody {
                    kind: "invalid_request",
                    message,
                    details: Value::Null,
                };
                (status, body)
            }
        };
        (status, Json(body)).into_response()
    }
}

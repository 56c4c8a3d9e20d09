//! Error and retry-policy types for the mediation configuration domain.
//!
//! [`MediationError`] is the single error type returned by every operation of
//! [`crate::MediationService`]. Domain variants are recoverable by the caller
//! (correct the input, or re-issue with an explicit override); only
//! [`MediationError::Storage`] reports infrastructure trouble.
//!
//! Every variant maps to a stable machine-readable [`ErrorKind`] so that outer
//! surfaces (HTTP, CLI) never have to parse messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{FlowId, FlowNodeId, Issue};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry unchanged and, if so, after
/// what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The same request may be re-issued.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// Re-issuing the same request produces the same error; the caller must
    /// change the input or supply an explicit override first.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Entity references
// ---------------------------------------------------------------------------

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Parameter,
    NodeFamily,
    NodeVersion,
    Subnode,
    Flow,
    FlowNode,
    FlowEdge,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Parameter => "parameter",
            EntityKind::NodeFamily => "node family",
            EntityKind::NodeVersion => "node version",
            EntityKind::Subnode => "subnode",
            EntityKind::Flow => "flow",
            EntityKind::FlowNode => "flow node",
            EntityKind::FlowEdge => "flow edge",
        };
        f.write_str(s)
    }
}

/// Identity of an entity, carried by errors so callers can act on it
/// (e.g. re-confirm an activation naming the currently active version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
    /// Human-readable name (e.g. `"SFTP Collector v3"`), when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        Self {
            kind,
            id: id.to_string(),
            label: None,
        }
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} '{}' ({})", self.kind, label, self.id),
            None => write!(f, "{} {}", self.kind, self.id),
        }
    }
}

/// One offending input found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Input field, parameter key or graph element the violation refers to.
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_path(path: &[FlowNodeId]) -> String {
    path.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn blocking_count(issues: &[Issue]) -> usize {
    issues.iter().filter(|i| i.is_blocking()).count()
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`crate::ConfigStore`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    /// The backing store could not be reached or written. Retrying may succeed.
    #[error("Configuration store unavailable: {message}")]
    Unavailable { message: String },

    /// The stored document could not be decoded or violates a model invariant.
    #[error("Configuration store is corrupt: {message}")]
    Corrupt { message: String },
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Stable machine-readable classification of a [`MediationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DuplicateName,
    Conflict,
    Validation,
    Cycle,
    Precondition,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::DuplicateName => "duplicate_name",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Cycle => "cycle",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Storage => "storage",
        }
    }
}

/// Errors returned by configuration operations.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum MediationError {
    /// An identifier did not resolve.
    #[error("Not found: {entity}")]
    NotFound { entity: EntityRef },

    /// A unique name or key is already taken.
    #[error("Duplicate {kind} name: '{name}'")]
    DuplicateName { kind: EntityKind, name: String },

    /// The operation conflicts with the current state of another entity.
    ///
    /// `blocking` names that entity so the caller can re-issue with an
    /// explicit confirmation (e.g. `force = true` on activation).
    #[error("Conflict: {reason} (blocked by {blocking})")]
    Conflict { reason: String, blocking: EntityRef },

    /// Malformed or incomplete input. Lists every violation found.
    #[error("Validation failed: {}", join_violations(.violations))]
    Validation { violations: Vec<Violation> },

    /// The requested edge would close a cycle. `path` is the cycle, starting
    /// and ending at the same node.
    #[error("Edge would introduce a cycle: {}", join_path(.path))]
    Cycle { path: Vec<FlowNodeId> },

    /// The flow must pass validation first.
    #[error("Flow {flow} has {} blocking issue(s)", blocking_count(.issues))]
    Precondition { flow: FlowId, issues: Vec<Issue> },

    /// Infrastructure failure in the configuration store.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl MediationError {
    pub(crate) fn not_found(kind: EntityKind, id: impl std::fmt::Display) -> Self {
        MediationError::NotFound {
            entity: EntityRef::new(kind, id),
        }
    }

    pub(crate) fn conflict(reason: impl Into<String>, blocking: EntityRef) -> Self {
        MediationError::Conflict {
            reason: reason.into(),
            blocking,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        MediationError::Validation {
            violations: vec![Violation::new(field, message)],
        }
    }

    /// Stable machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediationError::NotFound { .. } => ErrorKind::NotFound,
            MediationError::DuplicateName { .. } => ErrorKind::DuplicateName,
            MediationError::Conflict { .. } => ErrorKind::Conflict,
            MediationError::Validation { .. } => ErrorKind::Validation,
            MediationError::Cycle { .. } => ErrorKind::Cycle,
            MediationError::Precondition { .. } => ErrorKind::Precondition,
            MediationError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the identical request may succeed if re-issued.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            MediationError::Storage(StoreError::Unavailable { .. }) => {
                RetryPolicy::Retryable { after: None }
            }
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// `true` for infrastructure failures, `false` for domain errors.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, MediationError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_violation() {
        let err = MediationError::Validation {
            violations: vec![
                Violation::new("port", "expected an integer, got 'abc'"),
                Violation::new("secure", "expected true or false, got 'maybe'"),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("port: expected an integer"));
        assert!(message.contains("secure: expected true or false"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn conflict_names_the_blocking_entity() {
        let err = MediationError::conflict(
            "another node is active",
            EntityRef::new(EntityKind::NodeVersion, "abc").labelled("SFTP Collector v1"),
        );
        assert!(err.to_string().contains("SFTP Collector v1"));
        assert_eq!(err.kind().as_str(), "conflict");
    }

    #[test]
    fn only_unavailable_storage_is_retryable() {
        let unavailable: MediationError = StoreError::Unavailable {
            message: "disk full".into(),
        }
        .into();
        assert_eq!(
            unavailable.retry_policy(),
            RetryPolicy::Retryable { after: None }
        );
        assert!(unavailable.is_infrastructure());

        let corrupt: MediationError = StoreError::Corrupt {
            message: "bad json".into(),
        }
        .into();
        assert_eq!(corrupt.retry_policy(), RetryPolicy::NonRetryable);

        let missing = MediationError::not_found(EntityKind::Flow, "x");
        assert_eq!(missing.retry_policy(), RetryPolicy::NonRetryable);
        assert!(!missing.is_infrastructure());
    }
}

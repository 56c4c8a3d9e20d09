//! Shared value types for the mediation configuration domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (version numbers start at 1, positions are
//! finite) and participate in domain computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FlowEdgeId, FlowNodeId};

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Monotonic per-family version number. The first version of a family is `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VersionNumber(u32);

impl VersionNumber {
    /// The number assigned to the first version of a family.
    pub const FIRST: VersionNumber = VersionNumber(1);

    /// Creates a [`VersionNumber`], returning `None` for zero.
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the number that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the underlying integer value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for VersionNumber {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "version numbers start at 1".to_string())
    }
}

impl From<VersionNumber> for u32 {
    fn from(number: VersionNumber) -> Self {
        number.0
    }
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Canvas position of a flow node. Purely presentational; the core only
/// stores it and round-trips it through export/import.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Creates a [`Position`], returning `None` if either coordinate is not finite.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Option<Self> {
        if x.is_finite() && y.is_finite() {
            Some(Self { x, y })
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Flow validation findings
// ---------------------------------------------------------------------------

/// Severity level for an [`Issue`] found by flow validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Blocks `run` and `deploy` of the flow.
    Blocking,
    /// Should be addressed but does not block the flow.
    Warning,
    /// Contextual information with no impact on the flow.
    Informational,
}

/// Stable machine-readable code of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    EmptyFlow,
    DanglingEdge,
    DuplicateBranch,
    Cycle,
    MissingSubnode,
    IncompleteSubnode,
    NoEntryNode,
    OrphanNode,
    RepeatedFamily,
    DeprecatedVersion,
}

impl IssueCode {
    /// Severity attached to every issue carrying this code.
    pub fn severity(self) -> IssueSeverity {
        match self {
            IssueCode::DeprecatedVersion => IssueSeverity::Warning,
            _ => IssueSeverity::Blocking,
        }
    }

    /// Returns the snake_case form used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::EmptyFlow => "empty_flow",
            IssueCode::DanglingEdge => "dangling_edge",
            IssueCode::DuplicateBranch => "duplicate_branch",
            IssueCode::Cycle => "cycle",
            IssueCode::MissingSubnode => "missing_subnode",
            IssueCode::IncompleteSubnode => "incomplete_subnode",
            IssueCode::NoEntryNode => "no_entry_node",
            IssueCode::OrphanNode => "orphan_node",
            IssueCode::RepeatedFamily => "repeated_family",
            IssueCode::DeprecatedVersion => "deprecated_version",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured finding produced by flow validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    /// Flow node the finding relates to, if node-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<FlowNodeId>,
    /// Flow edge the finding relates to, if edge-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<FlowEdgeId>,
    /// Human-readable description of the finding.
    pub message: String,
}

impl Issue {
    pub(crate) fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: code.severity(),
            code,
            node: None,
            edge: None,
            message: message.into(),
        }
    }

    pub(crate) fn at_node(mut self, node: FlowNodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub(crate) fn at_edge(mut self, edge: FlowEdgeId) -> Self {
        self.edge = Some(edge);
        self
    }

    /// Returns `true` if this issue prevents the flow from running or deploying.
    pub fn is_blocking(&self) -> bool {
        self.severity == IssueSeverity::Blocking
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

//! Configuration domain for the mediation pipeline.
//!
//! A mediation pipeline turns raw records from network elements into usable
//! data. This crate models how such pipelines are configured: the catalog of
//! parameters, the registry of versioned node types, concrete subnodes bound
//! to those versions, the flows that wire subnodes into DAGs and the runtime
//! status of each flow.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! Persistence goes through the [`ConfigStore`] port; the `store` crate
//! supplies the durable implementation and [`MemoryStore`] backs tests.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`NodeVersionId`, `FlowId`, `ParameterKey`, etc.) |
//! | [`types`] | Shared value types (`VersionNumber`, `Position`, `Issue`, `Timestamp`) |
//! | [`errors`] | `MediationError`, `StoreError` and retry policy |
//! | [`model`] | Persisted entities: parameters, families, versions, subnodes, flows |
//! | [`state`] | `ConfigState`, the batch mutation model and consistency checks |
//! | [`store`] | The `ConfigStore` port and the in-memory store |
//! | [`service`] | `MediationService`, the facade every operation hangs off |
//! | [`catalog`] | Parameter Catalog |
//! | [`registry`] | Node Registry: families and versions |
//! | [`deployment`] | Deployment Coordinator: the single active version |
//! | [`binder`] | Subnode Binder |
//! | [`flows`] | Flow Graph Store and full-graph validation |
//! | [`topology`] | Cycle detection and other graph algorithms |
//! | [`runtime`] | Flow Runtime Controller |
//! | [`exchange`] | Flow export and import |

pub mod binder;
pub mod catalog;
pub mod deployment;
pub mod errors;
pub mod exchange;
pub mod flows;
pub mod identifiers;
pub mod model;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod state;
pub mod store;
pub mod topology;
pub mod types;

mod locks;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use binder::NewSubnode;
pub use catalog::{NewParameter, ParameterPatch};
pub use errors::{
    EntityKind, EntityRef, ErrorKind, MediationError, RetryPolicy, StoreError, Violation,
};
pub use exchange::{
    ExportMetadata, ExportedEdge, ExportedEdgeType, ExportedFlow, ExportedNode, FlowExport,
    NodeConfig,
};
pub use flows::{FlowSummary, NewFlowEdge, NewFlowNode};
pub use identifiers::{
    Actor, FlowEdgeId, FlowId, FlowNodeId, NodeFamilyId, NodeVersionId, ParameterId,
    ParameterKey, SubnodeId,
};
pub use model::{
    ActivationSlot, Flow, FlowEdge, FlowNode, FlowStatus, NodeFamily, NodeKind, NodeVersion,
    Parameter, ParameterType, Subnode, SubnodeStatus, SubnodeView, VersionState,
};
pub use registry::{FamilyDetail, NewFamily, NewVersion, NodeSummary, VersionDetail, VersionPatch};
pub use service::MediationService;
pub use state::{Batch, ConfigState, Mutation, Record, RecordKey};
pub use store::{ConfigStore, MemoryStore};
pub use types::{IssueCode, IssueSeverity, Issue, Position, Timestamp, VersionNumber};

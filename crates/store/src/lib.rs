//! Persistence adapters for the mediation configuration service.
//!
//! Implements the [`mediation::ConfigStore`] port. The domain crate sees only
//! the trait; everything that touches the filesystem lives here.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File I/O, the on-disk document format and crash-safe
//! replacement of the document. No domain rules.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`json_file`] | [`JsonFileStore`]: one JSON document, replaced atomically per commit |

pub mod json_file;

pub use json_file::JsonFileStore;

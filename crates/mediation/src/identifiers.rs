//! Newtype domain identifiers.
//!
//! Every entity in the configuration model has a distinct identifier type so
//! that a [`SubnodeId`] can never be passed where a [`NodeVersionId`] is
//! expected, even though both wrap a [`Uuid`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for UUID-wrapped newtypes (internally generated identities).
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display, FromStr.
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID (e.g. one read back from storage).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value, returning `None` if it is blank.
            ///
            /// Surrounding whitespace is trimmed.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Returns the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies a parameter declaration in the global catalog.
    ParameterId
}

uuid_id! {
    /// Identifies a Node Family (e.g. "SFTP Collector").
    NodeFamilyId
}

uuid_id! {
    /// Identifies one numbered version of a Node Family.
    NodeVersionId
}

uuid_id! {
    /// Identifies a parameter-valued instance of a Node Version.
    SubnodeId
}

uuid_id! {
    /// Identifies a flow graph.
    FlowId
}

uuid_id! {
    /// Identifies a node placed inside one flow graph.
    ///
    /// Flow node identities are local to their flow; the same Subnode placed in
    /// two flows gets two distinct [`FlowNodeId`]s.
    FlowNodeId
}

uuid_id! {
    /// Identifies a directed edge inside one flow graph.
    FlowEdgeId
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Catalog-unique key of a parameter (e.g. `"host"`, `"poll_interval"`).
    ParameterKey
}

string_id! {
    /// Name of the user or system principal recorded as a version's author.
    Actor
}

impl Actor {
    /// The actor recorded when a caller does not identify itself.
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_trim_and_reject_blank() {
        assert!(ParameterKey::new("   ").is_none());
        assert_eq!(ParameterKey::new("  host ").unwrap().as_str(), "host");
    }

    #[test]
    fn uuid_ids_parse_their_display_form() {
        let id = FlowId::new_random();
        let parsed: FlowId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<FlowId>().is_err());
    }

    #[test]
    fn uuid_ids_serialize_as_plain_strings() {
        let id = SubnodeId::new_random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}

//! Typed ID definitions for scheduler-owned resources.
//!
//! Each ID type has a unique prefix that identifies the resource type.
//! IDs are ULID-based for sortability and uniqueness.

use crate::define_id;

// =============================================================================
// Sessions and Kernels
// =============================================================================

define_id!(SessionId, "ses");
define_id!(KernelId, "krn");

// =============================================================================
// Agents
// =============================================================================

define_id!(AgentId, "agt");

// =============================================================================
// Externally-issued identities
// =============================================================================

/// A user identity, issued by the account system.
pub type UserId = uuid::Uuid;

/// A project (group) identity, issued by the account system.
pub type ProjectId = uuid::Uuid;

/// An API access key, issued by the account system.
///
/// Access keys are opaque strings (not ULID-shaped), so this is a plain
/// newtype rather than a `define_id!` instantiation.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct AccessKey(String);

impl AccessKey {
    /// Creates an access key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccessKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccessKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

//! # tern-id
//!
//! Stable ID types, parsing, and validation for the tern cluster manager.
//!
//! ## Design Principles
//!
//! - IDs are stable and system-generated; names are user-controlled labels
//! - All IDs have a canonical string representation with strict parsing
//! - IDs support roundtrip serialization (parse → format → parse)
//! - IDs are typed to prevent mixing different resource types
//!
//! ## ID Format
//!
//! Scheduler-owned resource IDs use a prefixed format: `{prefix}_{ulid}`
//!
//! Examples:
//! - `ses_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `krn_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `agt_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! This format provides:
//! - Type safety (prefix indicates resource type)
//! - Sortability (ULID is time-ordered, so enqueue order falls out of id order)
//! - Uniqueness (ULID has 80 bits of randomness)
//! - Human readability (clear prefixes)
//!
//! Identities issued outside the scheduler (users, projects) remain plain
//! UUIDs; access keys are opaque account-system strings.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

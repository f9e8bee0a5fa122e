//! Slot naming and classification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The name of one resource dimension (`cpu`, `mem`, `cuda.device`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotName(String);

impl SlotName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SlotName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SlotName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How quantities of a slot are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    /// Discrete countable units (cpu cores, gpu devices).
    Count,
    /// Byte quantities (mem).
    Bytes,
    /// Fractionally shareable units (gpu shares).
    Shares,
}

/// The slot types a cluster knows about, keyed by slot name.
pub type KnownSlotTypes = BTreeMap<SlotName, SlotType>;

/// How a limit treats slots it does not name.
///
/// Keypair policies enumerate every known slot, so an absent key means zero.
/// Group and domain limits may constrain only some slots, leaving the rest
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnspecifiedLimit {
    Zero,
    Unlimited,
}

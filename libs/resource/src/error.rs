//! Errors for resource arithmetic and limit checks.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::types::SlotName;

/// One slot that could not satisfy a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotDeficit {
    pub slot: SlotName,
    pub requested: Decimal,
    pub available: Decimal,
}

impl std::fmt::Display for SlotDeficit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: requested {}, available {}",
            self.slot, self.requested, self.available
        )
    }
}

/// A subtraction or limit check that would go negative.
///
/// Carries every deficit slot, not just the first, so callers can surface a
/// complete message to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("insufficient resources: {}", format_deficits(.deficits))]
pub struct SlotShortage {
    pub deficits: Vec<SlotDeficit>,
}

impl SlotShortage {
    pub fn new(deficits: Vec<SlotDeficit>) -> Self {
        Self { deficits }
    }
}

fn format_deficits(deficits: &[SlotDeficit]) -> String {
    deficits
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

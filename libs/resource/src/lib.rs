//! # tern-resource
//!
//! Multi-dimensional resource accounting for the tern cluster manager.
//!
//! ## Design Principles
//!
//! - A [`ResourceSlot`] maps slot names (`cpu`, `mem`, `cuda.device`, ...)
//!   to exact decimal quantities; a missing key means zero
//! - Arithmetic is component-wise over the union of keys
//! - Subtraction used in capacity or quota checks fails with per-slot
//!   deficits instead of clamping to zero
//!
//! Quantities are `rust_decimal::Decimal` so that fractional shares
//! (`cuda.shares = 0.5`) and byte counts compare exactly.

mod error;
mod slot;
mod types;

pub use error::{SlotDeficit, SlotShortage};
pub use slot::ResourceSlot;
pub use types::{KnownSlotTypes, SlotName, SlotType, UnspecifiedLimit};

/// Re-export the decimal type used for all quantities.
pub use rust_decimal::Decimal;

//! Component-wise decimal resource arithmetic.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{SlotDeficit, SlotShortage};
use crate::types::{SlotName, UnspecifiedLimit};

/// A mapping from slot name to a decimal quantity; a missing key means zero.
///
/// All arithmetic operates over the union of key sets. Equality treats a
/// missing key and an explicit zero as the same value, so identities like
/// `a + b - b == a` hold regardless of which keys each side materializes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSlot(BTreeMap<SlotName, Decimal>);

impl ResourceSlot {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the quantity for a slot, zero when absent.
    pub fn get(&self, slot: &SlotName) -> Decimal {
        self.0.get(slot).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, slot: SlotName, amount: Decimal) {
        self.0.insert(slot, amount);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotName, &Decimal)> {
        self.0.iter()
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &SlotName> {
        self.0.keys()
    }

    /// True when no slot holds a non-zero quantity.
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| v.is_zero())
    }

    /// Component-wise subtraction that fails instead of going negative.
    ///
    /// Returns every deficit slot so quota checks can report a complete
    /// message rather than the first missing dimension.
    pub fn checked_sub(&self, other: &ResourceSlot) -> Result<ResourceSlot, SlotShortage> {
        let mut result = self.0.clone();
        let mut deficits = Vec::new();
        for (slot, amount) in &other.0 {
            let available = self.get(slot);
            let remaining = available - amount;
            if remaining < Decimal::ZERO {
                deficits.push(SlotDeficit {
                    slot: slot.clone(),
                    requested: *amount,
                    available,
                });
            } else {
                result.insert(slot.clone(), remaining);
            }
        }
        if deficits.is_empty() {
            Ok(ResourceSlot(result))
        } else {
            Err(SlotShortage::new(deficits))
        }
    }

    /// Checks that every quantity in `self` fits under `limit`.
    ///
    /// `unspecified` decides how limit keys absent from `limit` are treated:
    /// zero for exhaustive policies, unlimited for partial group/domain caps.
    pub fn fits_in(
        &self,
        limit: &ResourceSlot,
        unspecified: UnspecifiedLimit,
    ) -> Result<(), SlotShortage> {
        let mut deficits = Vec::new();
        for (slot, amount) in &self.0 {
            if amount.is_zero() {
                continue;
            }
            let allowed = match (limit.0.get(slot), unspecified) {
                (Some(allowed), _) => *allowed,
                (None, UnspecifiedLimit::Unlimited) => continue,
                (None, UnspecifiedLimit::Zero) => Decimal::ZERO,
            };
            if *amount > allowed {
                deficits.push(SlotDeficit {
                    slot: slot.clone(),
                    requested: *amount,
                    available: allowed,
                });
            }
        }
        if deficits.is_empty() {
            Ok(())
        } else {
            Err(SlotShortage::new(deficits))
        }
    }

    /// Multiplies every quantity by a scalar (used for usage decay).
    pub fn scale(&self, factor: Decimal) -> ResourceSlot {
        ResourceSlot(
            self.0
                .iter()
                .map(|(slot, amount)| (slot.clone(), amount * factor))
                .collect(),
        )
    }

    /// Dot product against per-slot weights, with a default weight for
    /// slots the weight table does not name.
    pub fn weighted_sum(&self, weights: &ResourceSlot, default_weight: Decimal) -> Decimal {
        self.0
            .iter()
            .map(|(slot, amount)| {
                let weight = weights.0.get(slot).copied().unwrap_or(default_weight);
                amount * weight
            })
            .sum()
    }
}

impl PartialEq for ResourceSlot {
    fn eq(&self, other: &Self) -> bool {
        let keys: std::collections::BTreeSet<&SlotName> =
            self.0.keys().chain(other.0.keys()).collect();
        keys.into_iter().all(|k| self.get(k) == other.get(k))
    }
}

impl Eq for ResourceSlot {}

impl Add for ResourceSlot {
    type Output = ResourceSlot;

    fn add(mut self, rhs: ResourceSlot) -> ResourceSlot {
        self += rhs;
        self
    }
}

impl Add<&ResourceSlot> for ResourceSlot {
    type Output = ResourceSlot;

    fn add(mut self, rhs: &ResourceSlot) -> ResourceSlot {
        self += rhs;
        self
    }
}

impl AddAssign for ResourceSlot {
    fn add_assign(&mut self, rhs: ResourceSlot) {
        for (slot, amount) in rhs.0 {
            *self.0.entry(slot).or_default() += amount;
        }
    }
}

impl AddAssign<&ResourceSlot> for ResourceSlot {
    fn add_assign(&mut self, rhs: &ResourceSlot) {
        for (slot, amount) in &rhs.0 {
            *self.0.entry(slot.clone()).or_default() += amount;
        }
    }
}

impl FromIterator<(SlotName, Decimal)> for ResourceSlot {
    fn from_iter<T: IntoIterator<Item = (SlotName, Decimal)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, i64); N]> for ResourceSlot {
    fn from(entries: [(&str, i64); N]) -> Self {
        entries
            .into_iter()
            .map(|(name, amount)| (SlotName::from(name), Decimal::from(amount)))
            .collect()
    }
}

impl std::fmt::Display for ResourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (slot, amount) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{slot}={amount}")?;
            first = false;
        }
        Ok(())
    }
}

//! Group-wide free-capacity validation.

use tern_resource::UnspecifiedLimit;

use crate::errors::AdmissionError;
use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

use super::WorkloadValidator;

/// Requested slots must fit within `total_capacity - occupancy` for the
/// whole resource group, independent of any per-tenant quota.
pub struct CapacityValidator;

impl WorkloadValidator for CapacityValidator {
    fn name(&self) -> &'static str {
        "capacity"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let occupied = snapshot.resource_occupancy.total_occupied();
        let available = snapshot
            .total_capacity
            .checked_sub(&occupied)
            .map_err(|shortage| AdmissionError::CapacityExceeded { shortage })?;

        workload
            .requested_slots
            .fits_in(&available, UnspecifiedLimit::Zero)
            .map_err(|shortage| AdmissionError::CapacityExceeded { shortage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_id::AgentId;
    use tern_resource::ResourceSlot;

    use crate::validators::test_support::{empty_snapshot, workload};

    #[test]
    fn test_fits_in_free_capacity() {
        let mut snapshot = empty_snapshot();
        snapshot.total_capacity = ResourceSlot::from([("cpu", 10)]);
        snapshot
            .resource_occupancy
            .by_agent
            .insert(AgentId::new(), ResourceSlot::from([("cpu", 6)]));

        let w = workload("AKIA-CAP", ResourceSlot::from([("cpu", 4)]));
        assert!(CapacityValidator.validate(&snapshot, &w).is_ok());
    }

    #[test]
    fn test_rejects_when_free_capacity_short() {
        let mut snapshot = empty_snapshot();
        snapshot.total_capacity = ResourceSlot::from([("cpu", 10)]);
        snapshot
            .resource_occupancy
            .by_agent
            .insert(AgentId::new(), ResourceSlot::from([("cpu", 8)]));

        let w = workload("AKIA-CAP", ResourceSlot::from([("cpu", 4)]));
        let err = CapacityValidator.validate(&snapshot, &w).unwrap_err();
        assert!(matches!(err, AdmissionError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_unknown_slot_type_rejects() {
        let mut snapshot = empty_snapshot();
        snapshot.total_capacity = ResourceSlot::from([("cpu", 10)]);

        let w = workload("AKIA-CAP", ResourceSlot::from([("cuda.device", 1)]));
        assert!(CapacityValidator.validate(&snapshot, &w).is_err());
    }

    #[test]
    fn test_ignores_tenant_quotas() {
        // Capacity is about the group, not the keypair: an otherwise
        // unconstrained workload still fails when the cluster is full.
        let mut snapshot = empty_snapshot();
        snapshot.total_capacity = ResourceSlot::from([("cpu", 2)]);
        snapshot
            .resource_occupancy
            .by_agent
            .insert(AgentId::new(), ResourceSlot::from([("cpu", 2)]));

        let w = workload("AKIA-FREE", ResourceSlot::from([("cpu", 1)]));
        assert!(CapacityValidator.validate(&snapshot, &w).is_err());
    }
}

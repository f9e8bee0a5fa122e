//! Resource quota validators for each tenant scope.

use tern_resource::UnspecifiedLimit;

use crate::errors::AdmissionError;
use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

use super::WorkloadValidator;

/// `occupied + requested <= policy.total_resource_slots`, component-wise.
///
/// A keypair without a policy always passes. Keypair policies enumerate
/// every known slot, so an absent slot in the policy means zero.
pub struct KeypairResourceLimitValidator;

impl WorkloadValidator for KeypairResourceLimitValidator {
    fn name(&self) -> &'static str {
        "keypair_resource_limit"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let Some(policy) = snapshot
            .resource_policies
            .keypair_policies
            .get(&workload.access_key)
        else {
            return Ok(());
        };

        let occupied = snapshot
            .resource_occupancy
            .by_keypair
            .get(&workload.access_key)
            .map(|o| o.occupied_slots.clone())
            .unwrap_or_default();

        (occupied + &workload.requested_slots)
            .fits_in(&policy.total_resource_slots, UnspecifiedLimit::Zero)
            .map_err(|shortage| AdmissionError::KeypairResourceQuotaExceeded {
                access_key: workload.access_key.clone(),
                shortage,
            })
    }
}

/// Same check against the user's own total-slot policy.
pub struct UserResourceLimitValidator;

impl WorkloadValidator for UserResourceLimitValidator {
    fn name(&self) -> &'static str {
        "user_resource_limit"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let Some(policy) = snapshot
            .resource_policies
            .user_policies
            .get(&workload.user_uuid)
        else {
            return Ok(());
        };

        let occupied = snapshot
            .resource_occupancy
            .by_user
            .get(&workload.user_uuid)
            .cloned()
            .unwrap_or_default();

        (occupied + &workload.requested_slots)
            .fits_in(&policy.total_resource_slots, UnspecifiedLimit::Zero)
            .map_err(|shortage| AdmissionError::UserResourceQuotaExceeded { shortage })
    }
}

/// Group-scoped quota. Group limits constrain only the slots they name.
pub struct GroupResourceLimitValidator;

impl WorkloadValidator for GroupResourceLimitValidator {
    fn name(&self) -> &'static str {
        "group_resource_limit"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let Some(limit) = snapshot.resource_policies.group_limits.get(&workload.group_id) else {
            return Ok(());
        };

        let occupied = snapshot
            .resource_occupancy
            .by_group
            .get(&workload.group_id)
            .cloned()
            .unwrap_or_default();

        (occupied + &workload.requested_slots)
            .fits_in(limit, UnspecifiedLimit::Unlimited)
            .map_err(|shortage| AdmissionError::GroupResourceQuotaExceeded { shortage })
    }
}

/// Domain-scoped quota. Domain limits constrain only the slots they name.
pub struct DomainResourceLimitValidator;

impl WorkloadValidator for DomainResourceLimitValidator {
    fn name(&self) -> &'static str {
        "domain_resource_limit"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let Some(limit) = snapshot
            .resource_policies
            .domain_limits
            .get(&workload.domain_name)
        else {
            return Ok(());
        };

        let occupied = snapshot
            .resource_occupancy
            .by_domain
            .get(&workload.domain_name)
            .cloned()
            .unwrap_or_default();

        (occupied + &workload.requested_slots)
            .fits_in(limit, UnspecifiedLimit::Unlimited)
            .map_err(|shortage| AdmissionError::DomainResourceQuotaExceeded {
                domain: workload.domain_name.clone(),
                shortage,
            })
    }
}

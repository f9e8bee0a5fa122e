//! Admission validators.
//!
//! A validator is a pure check over `(snapshot, workload)`: it either passes
//! or returns a typed, user-facing [`AdmissionError`]. Validators never do
//! I/O, never mutate the snapshot, and are order-independent; the
//! composition (fail-fast or collect-all) is the coordinator's choice.

mod capacity;
mod concurrency;
mod dependencies;
mod resources;

pub use capacity::CapacityValidator;
pub use concurrency::{ConcurrencyValidator, PendingSessionCountValidator};
pub use dependencies::DependenciesValidator;
pub use resources::{
    DomainResourceLimitValidator, GroupResourceLimitValidator, KeypairResourceLimitValidator,
    UserResourceLimitValidator,
};

use crate::errors::AdmissionError;
use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

/// One admission check.
pub trait WorkloadValidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError>;
}

/// The validator pipeline applied to every candidate workload.
pub struct SchedulingValidator {
    validators: Vec<Box<dyn WorkloadValidator>>,
}

impl SchedulingValidator {
    pub fn new(validators: Vec<Box<dyn WorkloadValidator>>) -> Self {
        Self { validators }
    }

    /// The full pipeline in its conventional order.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            Box::new(KeypairResourceLimitValidator),
            Box::new(UserResourceLimitValidator),
            Box::new(GroupResourceLimitValidator),
            Box::new(DomainResourceLimitValidator),
            Box::new(ConcurrencyValidator),
            Box::new(PendingSessionCountValidator),
            Box::new(DependenciesValidator),
            Box::new(CapacityValidator),
        ])
    }

    /// Fail-fast composition: the first rejection wins.
    pub fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        for validator in &self.validators {
            validator.validate(snapshot, workload)?;
        }
        Ok(())
    }

    /// Run-all composition: every rejection is collected so history and the
    /// user see the complete picture in one pass.
    pub fn validate_all(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Vec<AdmissionError> {
        self.validators
            .iter()
            .filter_map(|v| v.validate(snapshot, workload).err())
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{empty_snapshot, workload};
    use super::*;
    use tern_resource::ResourceSlot;

    use crate::snapshot::{KeyPairResourcePolicy, KeypairOccupancy};

    #[test]
    fn test_default_pipeline_passes_unconstrained_workload() {
        let snapshot = empty_snapshot();
        let w = workload("AKIA-FREE", ResourceSlot::from([("cpu", 2)]));
        let validator = SchedulingValidator::with_defaults();
        assert!(validator.validate(&snapshot, &w).is_ok());
        assert!(validator.validate_all(&snapshot, &w).is_empty());
    }

    #[test]
    fn test_collect_all_returns_every_rejection() {
        let mut snapshot = empty_snapshot();
        let w = workload("AKIA-BUSY", ResourceSlot::from([("cpu", 8)]));
        snapshot.resource_policies.keypair_policies.insert(
            w.access_key.clone(),
            KeyPairResourcePolicy {
                name: "small".to_string(),
                total_resource_slots: ResourceSlot::from([("cpu", 4)]),
                max_concurrent_sessions: Some(1),
                max_concurrent_sftp_sessions: None,
                max_pending_session_count: None,
                max_pending_session_resource_slots: None,
            },
        );
        snapshot.resource_occupancy.by_keypair.insert(
            w.access_key.clone(),
            KeypairOccupancy {
                occupied_slots: ResourceSlot::from([("cpu", 1)]),
                session_count: 1,
                sftp_session_count: 0,
            },
        );
        snapshot
            .concurrency
            .sessions_by_keypair
            .insert(w.access_key.clone(), 1);

        let validator = SchedulingValidator::with_defaults();
        let errors = validator.validate_all(&snapshot, &w);
        assert_eq!(errors.len(), 2);

        // Fail-fast surfaces only the first one.
        assert!(validator.validate(&snapshot, &w).is_err());
    }
}

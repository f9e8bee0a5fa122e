//! Inter-session dependency validation.

use crate::errors::AdmissionError;
use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

use super::WorkloadValidator;

/// Every dependency must be a successfully terminated session.
///
/// Unmet dependencies are collected and raised together as one batch error
/// naming each unmet `name (id)` - not fail-fast on the first one - so the
/// user sees the full set of blockers at once. A dependency rejection is
/// permanent: the coordinator cancels the workload instead of retrying it.
pub struct DependenciesValidator;

impl WorkloadValidator for DependenciesValidator {
    fn name(&self) -> &'static str {
        "dependencies"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let Some(dependencies) = snapshot
            .session_dependencies
            .by_session
            .get(&workload.session_id)
        else {
            return Ok(());
        };

        let unmet: Vec<String> = dependencies
            .iter()
            .filter(|dep| !dep.is_satisfied())
            .map(|dep| format!("{} ({})", dep.dependency_name, dep.depends_on))
            .collect();

        if unmet.is_empty() {
            Ok(())
        } else {
            Err(AdmissionError::DependenciesNotSatisfied { unmet })
        }
    }
}

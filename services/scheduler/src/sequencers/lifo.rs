//! Last-in-first-out sequencing.

use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

use super::WorkloadSequencer;

/// Reverses the input order. Depends only on the input list; snapshot
/// occupancy never influences the result.
pub struct LifoSequencer;

impl WorkloadSequencer for LifoSequencer {
    fn name(&self) -> &'static str {
        "lifo"
    }

    fn sequence(
        &self,
        _snapshot: &SystemSnapshot,
        workloads: Vec<SessionWorkload>,
    ) -> Vec<SessionWorkload> {
        let mut workloads = workloads;
        workloads.reverse();
        workloads
    }
}

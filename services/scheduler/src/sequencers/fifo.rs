//! First-in-first-out sequencing.

use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

use super::WorkloadSequencer;

/// Identity ordering: workloads are admitted in arrival order.
pub struct FifoSequencer;

impl WorkloadSequencer for FifoSequencer {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn sequence(
        &self,
        _snapshot: &SystemSnapshot,
        workloads: Vec<SessionWorkload>,
    ) -> Vec<SessionWorkload> {
        workloads
    }
}

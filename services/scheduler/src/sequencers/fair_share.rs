//! Fair-share sequencing from decayed historical usage.

use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

use super::WorkloadSequencer;

/// Orders workloads ascending by their scope's fair-share factor.
///
/// Factors come from the snapshot's fair-share view, looked up by the most
/// specific scope (user, then project, then domain) for the resource group;
/// a scope with no record uses the neutral 1.0. The sort is stable, so
/// workloads with equal factors keep their arrival order and equal-priority
/// scopes cannot starve each other.
pub struct FairShareSequencer;

impl WorkloadSequencer for FairShareSequencer {
    fn name(&self) -> &'static str {
        "fairshare"
    }

    fn sequence(
        &self,
        snapshot: &SystemSnapshot,
        workloads: Vec<SessionWorkload>,
    ) -> Vec<SessionWorkload> {
        let mut workloads = workloads;
        workloads.sort_by_key(|w| snapshot.fair_share.factor_for(w));
        workloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tern_resource::ResourceSlot;

    use crate::validators::test_support::{empty_snapshot, workload};

    #[test]
    fn test_lower_factor_goes_first() {
        let mut snapshot = empty_snapshot();
        let light = workload("AKIA-A", ResourceSlot::from([("cpu", 1)]));
        let heavy = workload("AKIA-B", ResourceSlot::from([("cpu", 1)]));
        snapshot.fair_share.by_user.insert(light.user_uuid, Decimal::new(9, 1));
        snapshot.fair_share.by_user.insert(heavy.user_uuid, Decimal::new(3, 1));

        let sequenced =
            FairShareSequencer.sequence(&snapshot, vec![light.clone(), heavy.clone()]);
        assert_eq!(sequenced[0].session_id, heavy.session_id);
        assert_eq!(sequenced[1].session_id, light.session_id);
    }

    #[test]
    fn test_equal_factors_keep_arrival_order() {
        let mut snapshot = empty_snapshot();
        let first = workload("AKIA-A", ResourceSlot::from([("cpu", 1)]));
        let second = workload("AKIA-B", ResourceSlot::from([("cpu", 1)]));
        snapshot.fair_share.by_user.insert(first.user_uuid, Decimal::new(5, 1));
        snapshot.fair_share.by_user.insert(second.user_uuid, Decimal::new(5, 1));

        let sequenced =
            FairShareSequencer.sequence(&snapshot, vec![first.clone(), second.clone()]);
        assert_eq!(sequenced[0].session_id, first.session_id);
        assert_eq!(sequenced[1].session_id, second.session_id);
    }

    #[test]
    fn test_unknown_scope_uses_neutral_factor() {
        let mut snapshot = empty_snapshot();
        let known = workload("AKIA-A", ResourceSlot::from([("cpu", 1)]));
        let unknown = workload("AKIA-B", ResourceSlot::from([("cpu", 1)]));
        // 1.2 sorts after the neutral 1.0 of the scope with no record.
        snapshot
            .fair_share
            .by_user
            .insert(known.user_uuid, Decimal::new(12, 1));

        let sequenced =
            FairShareSequencer.sequence(&snapshot, vec![known.clone(), unknown.clone()]);
        assert_eq!(sequenced[0].session_id, unknown.session_id);
        assert_eq!(sequenced[1].session_id, known.session_id);
    }
}

//! The scheduling coordinator: one admission pass per tick.
//!
//! A tick reads one immutable snapshot, validates every pending workload
//! against it, sequences the survivors with the group's configured policy,
//! and greedily commits admissions against a tick-local capacity ledger.
//! Each admission is persisted before the next one is attempted, so a crash
//! mid-tick leaves earlier commits intact and only the remainder is
//! re-evaluated next tick.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use tern_resource::{ResourceSlot, SlotShortage};

use crate::errors::{AdmissionError, CommitError, SchedulerError};
use crate::history::StepTracker;
use crate::kernel::KernelStateEngine;
use crate::repository::{HistoryStore, KernelStore, SchedulerRepository};
use crate::sequencers::WorkloadSequencer;
use crate::snapshot::SystemSnapshot;
use crate::validators::SchedulingValidator;
use crate::workload::SessionWorkload;

/// History step covering the validator pipeline.
pub const STEP_VALIDATION: &str = "validation";
/// History step covering the commit + kernel initialization of one admission.
pub const STEP_ADMISSION: &str = "admission";

/// Everything a coordinator needs, gathered by the hosting process.
pub struct CoordinatorArgs {
    pub resource_group: String,
    pub repository: Arc<dyn SchedulerRepository>,
    pub kernel_store: Arc<dyn KernelStore>,
    pub history_store: Arc<dyn HistoryStore>,
    pub validator: SchedulingValidator,
    pub sequencer: Box<dyn WorkloadSequencer>,
    /// Validation failures tolerated before the workload's priority drops.
    pub max_scheduling_retries: u32,
    pub retry_priority_penalty: i32,
    pub min_priority: i32,
}

/// Statistics from one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub pending: usize,
    pub admitted: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub capacity_skipped: usize,
    pub conflicts: usize,
    pub failures: usize,
}

/// Coordinates admission for a single resource group.
///
/// One coordinator instance runs ticks serially for its group; different
/// groups run their own coordinators independently.
pub struct SchedulingCoordinator {
    resource_group: String,
    repository: Arc<dyn SchedulerRepository>,
    kernel_engine: KernelStateEngine,
    tracker: StepTracker,
    validator: SchedulingValidator,
    sequencer: Box<dyn WorkloadSequencer>,
    max_scheduling_retries: u32,
    retry_priority_penalty: i32,
    min_priority: i32,
}

impl SchedulingCoordinator {
    pub fn new(args: CoordinatorArgs) -> Self {
        Self {
            resource_group: args.resource_group,
            repository: args.repository,
            kernel_engine: KernelStateEngine::new(args.kernel_store),
            tracker: StepTracker::new(args.history_store),
            validator: args.validator,
            sequencer: args.sequencer,
            max_scheduling_retries: args.max_scheduling_retries,
            retry_priority_penalty: args.retry_priority_penalty,
            min_priority: args.min_priority,
        }
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// The kernel state engine sharing this coordinator's store, for the
    /// hosting process to route agent lifecycle callbacks through.
    pub fn kernel_engine(&self) -> &KernelStateEngine {
        &self.kernel_engine
    }

    /// Runs one admission pass.
    #[instrument(skip(self), fields(resource_group = %self.resource_group))]
    pub async fn run_tick(&self) -> Result<TickStats, SchedulerError> {
        // Single read barrier: everything below sees this snapshot only.
        let snapshot = self.repository.load_snapshot(&self.resource_group).await?;
        let pending = self
            .repository
            .load_pending_workloads(&self.resource_group)
            .await?;

        let mut stats = TickStats {
            pending: pending.len(),
            ..TickStats::default()
        };
        if pending.is_empty() {
            return Ok(stats);
        }

        let mut candidates = Vec::with_capacity(pending.len());
        for workload in pending {
            if let Some(workload) = self
                .validate_workload(&snapshot, workload, &mut stats)
                .await?
            {
                candidates.push(workload);
            }
        }

        let sequenced = self.sequencer.sequence(&snapshot, candidates);

        let mut ledger = CapacityLedger::from_snapshot(&snapshot);
        for workload in sequenced {
            self.try_admit(&mut ledger, workload, &mut stats).await?;
        }

        info!(
            pending = stats.pending,
            admitted = stats.admitted,
            rejected = stats.rejected,
            cancelled = stats.cancelled,
            capacity_skipped = stats.capacity_skipped,
            conflicts = stats.conflicts,
            failures = stats.failures,
            "Tick complete"
        );
        Ok(stats)
    }

    /// Runs the validator pipeline for one candidate. Returns the workload
    /// when it survives; otherwise records the rejection and handles the
    /// permanent-failure cancellation path.
    async fn validate_workload(
        &self,
        snapshot: &SystemSnapshot,
        workload: SessionWorkload,
        stats: &mut TickStats,
    ) -> Result<Option<SessionWorkload>, SchedulerError> {
        let rejections = self.validator.validate_all(snapshot, &workload);
        if rejections.is_empty() {
            return Ok(Some(workload));
        }
        stats.rejected += 1;
        let session_id = workload.session_id;

        // A permanent rejection takes precedence as the recorded reason.
        let primary = rejections
            .iter()
            .find(|e| e.is_permanent())
            .unwrap_or(&rejections[0])
            .clone();

        let bracket = primary.clone();
        let _: Result<(), AdmissionError> = self
            .tracker
            .track_step(session_id, STEP_VALIDATION, || async move { Err(bracket) })
            .await;
        if rejections.len() > 1 {
            let messages: Vec<String> = rejections.iter().map(|e| e.to_string()).collect();
            self.tracker
                .merge_details(session_id, STEP_VALIDATION, json!({ "rejections": messages }))
                .await;
        }
        self.repository
            .record_rejection(session_id, &primary)
            .await?;

        if primary.is_permanent() {
            // A failed dependency can never heal; cancel instead of retrying.
            let cancelled = self
                .repository
                .cancel_workload(session_id, &primary.to_string())
                .await?;
            if cancelled {
                stats.cancelled += 1;
                info!(session_id = %session_id, reason = %primary, "Workload cancelled");
            }
        } else {
            debug!(session_id = %session_id, reason = %primary, "Workload rejected, stays pending");
            self.apply_retry_budget(session_id).await?;
        }
        Ok(None)
    }

    /// Lowers the priority of workloads that keep failing validation, so a
    /// stuck request stops shadowing the rest of the queue.
    async fn apply_retry_budget(
        &self,
        session_id: tern_id::SessionId,
    ) -> Result<(), SchedulerError> {
        let Some(row) = self.tracker.latest_row(session_id, STEP_VALIDATION).await? else {
            return Ok(());
        };
        if row.retry_count >= self.max_scheduling_retries {
            warn!(
                session_id = %session_id,
                retries = row.retry_count,
                "Scheduling retries exhausted; lowering priority"
            );
            self.repository
                .penalize_priority(
                    &[session_id],
                    self.retry_priority_penalty,
                    self.min_priority,
                )
                .await?;
        }
        Ok(())
    }

    /// Greedy step for one sequenced workload: reserve capacity, commit,
    /// initialize kernels, record history. A failure here aborts only this
    /// workload; earlier commits stand and later candidates still run.
    async fn try_admit(
        &self,
        ledger: &mut CapacityLedger,
        workload: SessionWorkload,
        stats: &mut TickStats,
    ) -> Result<(), SchedulerError> {
        let session_id = workload.session_id;

        let next_remaining = match ledger.preview(&workload.requested_slots) {
            Ok(remaining) => remaining,
            Err(shortage) => {
                stats.capacity_skipped += 1;
                let rejection = AdmissionError::CapacityExceeded { shortage };
                let bracket = rejection.clone();
                let _: Result<(), AdmissionError> = self
                    .tracker
                    .track_step(session_id, STEP_ADMISSION, || async move { Err(bracket) })
                    .await;
                self.repository
                    .record_rejection(session_id, &rejection)
                    .await?;
                debug!(session_id = %session_id, "No capacity left this tick");
                return Ok(());
            }
        };

        let specs = workload.to_kernel_specs();
        let committed: Result<(), CommitError> = self
            .tracker
            .track_step(session_id, STEP_ADMISSION, || async {
                self.repository.commit_admission(&workload, &specs).await?;
                self.kernel_engine
                    .initialize_session(&specs)
                    .await
                    .map_err(CommitError::Repository)?;
                Ok(())
            })
            .await;

        match committed {
            Ok(()) => {
                ledger.apply(next_remaining);
                stats.admitted += 1;
                info!(
                    session_id = %session_id,
                    kernels = specs.len(),
                    slots = %workload.requested_slots,
                    "Workload admitted"
                );
            }
            Err(CommitError::Conflict) => {
                // Someone else settled this workload; next tick re-reads.
                stats.conflicts += 1;
                debug!(session_id = %session_id, "Commit conflict, skipping");
            }
            Err(CommitError::Repository(error)) => {
                stats.failures += 1;
                warn!(session_id = %session_id, error = %error, "Admission commit failed");
            }
        }
        Ok(())
    }
}

/// Tick-local free-capacity ledger.
///
/// The immutable snapshot is never touched: tentative reservations happen
/// against this copy, and each reservation is applied only after its
/// admission actually commits.
struct CapacityLedger {
    remaining: ResourceSlot,
}

impl CapacityLedger {
    fn from_snapshot(snapshot: &SystemSnapshot) -> Self {
        let occupied = snapshot.resource_occupancy.total_occupied();
        let remaining = match snapshot.total_capacity.checked_sub(&occupied) {
            Ok(remaining) => remaining,
            Err(shortage) => {
                warn!(%shortage, "Occupancy exceeds capacity; admitting nothing this tick");
                ResourceSlot::new()
            }
        };
        Self { remaining }
    }

    /// What would remain after reserving `requested`, or the deficit.
    fn preview(&self, requested: &ResourceSlot) -> Result<ResourceSlot, SlotShortage> {
        self.remaining.checked_sub(requested)
    }

    fn apply(&mut self, remaining: ResourceSlot) {
        self.remaining = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_id::AgentId;

    use crate::validators::test_support::empty_snapshot;

    #[test]
    fn test_ledger_reserves_until_exhausted() {
        let mut snapshot = empty_snapshot();
        snapshot.total_capacity = ResourceSlot::from([("cpu", 10)]);
        let mut ledger = CapacityLedger::from_snapshot(&snapshot);

        let first = ledger.preview(&ResourceSlot::from([("cpu", 4)])).unwrap();
        ledger.apply(first);
        let second = ledger.preview(&ResourceSlot::from([("cpu", 4)])).unwrap();
        ledger.apply(second);

        let err = ledger.preview(&ResourceSlot::from([("cpu", 4)])).unwrap_err();
        assert_eq!(err.deficits[0].available, rust_decimal::Decimal::from(2));
    }

    #[test]
    fn test_ledger_starts_from_free_capacity() {
        let mut snapshot = empty_snapshot();
        snapshot.total_capacity = ResourceSlot::from([("cpu", 10)]);
        snapshot
            .resource_occupancy
            .by_agent
            .insert(AgentId::new(), ResourceSlot::from([("cpu", 7)]));
        let ledger = CapacityLedger::from_snapshot(&snapshot);
        assert!(ledger.preview(&ResourceSlot::from([("cpu", 4)])).is_err());
        assert!(ledger.preview(&ResourceSlot::from([("cpu", 3)])).is_ok());
    }

    #[test]
    fn test_over_occupied_group_admits_nothing() {
        let mut snapshot = empty_snapshot();
        snapshot.total_capacity = ResourceSlot::from([("cpu", 4)]);
        snapshot
            .resource_occupancy
            .by_agent
            .insert(AgentId::new(), ResourceSlot::from([("cpu", 9)]));
        let ledger = CapacityLedger::from_snapshot(&snapshot);
        assert!(ledger.preview(&ResourceSlot::from([("cpu", 1)])).is_err());
    }
}

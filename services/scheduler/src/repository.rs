//! Asynchronous repository collaborators.
//!
//! All I/O of the core goes through these traits: the coordinator reads
//! snapshots and commits admissions, the kernel state engine mutates kernel
//! status, the fair-share updater reads usage buckets and writes factor
//! rows, and the step tracker persists execution history. Validators,
//! sequencers, and the fair-share math stay pure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tern_id::{AgentId, KernelId, SessionId};
use tern_resource::ResourceSlot;

use crate::errors::{AdmissionError, CommitError, ErrorInfo, SchedulerError};
use crate::fair_share::{FairShareComputation, FairShareRows, UsageHistory};
use crate::history::ExecutionHistoryRow;
use crate::kernel::{KernelRecord, KernelStatus, StatusChange};
use crate::snapshot::SystemSnapshot;
use crate::workload::{KernelSpec, SessionWorkload};

/// Snapshot reads and admission writes for the scheduling coordinator.
#[async_trait]
pub trait SchedulerRepository: Send + Sync {
    /// Builds the immutable snapshot for one tick: the single read barrier.
    async fn load_snapshot(&self, resource_group: &str)
        -> Result<SystemSnapshot, SchedulerError>;

    /// Pending workloads for the group, ordered by priority (descending)
    /// then enqueue time (oldest first).
    async fn load_pending_workloads(
        &self,
        resource_group: &str,
    ) -> Result<Vec<SessionWorkload>, SchedulerError>;

    /// Persists one admission. A workload that was concurrently admitted or
    /// cancelled yields [`CommitError::Conflict`]; the caller skips it and
    /// the next tick re-evaluates.
    async fn commit_admission(
        &self,
        workload: &SessionWorkload,
        kernel_specs: &[KernelSpec],
    ) -> Result<(), CommitError>;

    /// Cancels a pending workload permanently (unsatisfiable dependency).
    /// Returns false when the workload is no longer pending.
    async fn cancel_workload(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<bool, SchedulerError>;

    /// Stores the latest rejection on the pending workload so it stays
    /// visible to the user between ticks.
    async fn record_rejection(
        &self,
        session_id: SessionId,
        rejection: &AdmissionError,
    ) -> Result<(), SchedulerError>;

    /// Lowers priority of workloads that exhausted their scheduling
    /// retries, bounded below by `floor`.
    async fn penalize_priority(
        &self,
        session_ids: &[SessionId],
        amount: i32,
        floor: i32,
    ) -> Result<(), SchedulerError>;
}

/// Compare-and-set kernel status storage used by the state engine.
#[async_trait]
pub trait KernelStore: Send + Sync {
    /// Inserts freshly admitted kernels.
    async fn insert_kernels(&self, records: Vec<KernelRecord>) -> Result<(), SchedulerError>;

    /// Atomically applies `change` when the kernel's current status is one
    /// of `expected`. Returns whether anything changed; an unexpected
    /// current status is a no-op, not an error.
    async fn transition(
        &self,
        kernel_id: KernelId,
        expected: &[KernelStatus],
        change: StatusChange,
    ) -> Result<bool, SchedulerError>;

    /// Applies `change` to every kernel on `agent` waiting on `image` whose
    /// status is one of `expected`. Returns the records that changed.
    async fn transition_for_image(
        &self,
        agent: AgentId,
        image: &str,
        expected: &[KernelStatus],
        change: StatusChange,
    ) -> Result<Vec<KernelRecord>, SchedulerError>;

    /// Whether the session still has kernels outside CANCELLED.
    async fn has_non_cancelled_kernels(
        &self,
        session_id: SessionId,
    ) -> Result<bool, SchedulerError>;

    /// Session-level cancellation; false when already terminal.
    async fn cancel_session(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<bool, SchedulerError>;

    /// Refreshes liveness of a RUNNING kernel without touching status.
    async fn touch_heartbeat(
        &self,
        kernel_id: KernelId,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError>;

    /// Reads one kernel record.
    async fn get_kernel(
        &self,
        kernel_id: KernelId,
    ) -> Result<Option<KernelRecord>, SchedulerError>;
}

/// Usage-bucket reads and factor-row writes for the fair-share updater.
#[async_trait]
pub trait FairShareStore: Send + Sync {
    async fn load_usage_buckets(
        &self,
        resource_group: &str,
    ) -> Result<UsageHistory, SchedulerError>;

    async fn load_rows(&self, resource_group: &str) -> Result<FairShareRows, SchedulerError>;

    async fn load_group_capacity(
        &self,
        resource_group: &str,
    ) -> Result<ResourceSlot, SchedulerError>;

    /// Idempotent upsert keyed by (resource group, scope identity): rows
    /// are created on a scope's first participation and updated after.
    async fn upsert_factors(
        &self,
        resource_group: &str,
        computation: &FairShareComputation,
    ) -> Result<(), SchedulerError>;
}

/// Execution-history persistence keyed by (session, step).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Opens a step: creates an IN_PROGRESS row, or folds into the latest
    /// open row of the same lineage when the step is being retried.
    async fn record_step_start(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<(), SchedulerError>;

    async fn record_step_success(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<(), SchedulerError>;

    async fn record_step_failure(
        &self,
        session_id: SessionId,
        step: &str,
        error_info: ErrorInfo,
    ) -> Result<(), SchedulerError>;

    /// Increments the latest matching row's retry count and resets it to
    /// IN_PROGRESS; never inserts a second row for the lineage.
    async fn record_step_retry(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<(), SchedulerError>;

    /// Shallow-merges a JSON object into the latest row's details.
    async fn merge_step_details(
        &self,
        session_id: SessionId,
        step: &str,
        details: serde_json::Value,
    ) -> Result<(), SchedulerError>;

    async fn latest_row(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<Option<ExecutionHistoryRow>, SchedulerError>;

    async fn load_rows(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ExecutionHistoryRow>, SchedulerError>;
}

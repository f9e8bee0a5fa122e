//! Scheduler execution history.
//!
//! Every step taken for a session is recorded as one row: created
//! IN_PROGRESS on entry, resolved to SUCCESS or FAILURE on exit, mutated in
//! place and never deleted. Retries fold into the latest open row of the
//! same (session, step) lineage - `retry_count` is incremented, never a new
//! row - so the history reads as one attempt lineage per step.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use tern_id::SessionId;

use crate::errors::{AdmissionError, CommitError, ErrorInfo, SchedulerError};
use crate::repository::HistoryStore;

/// Status of one recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    InProgress,
    Success,
    Failure,
}

/// One execution-history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistoryRow {
    pub id: u64,
    pub session_id: SessionId,
    pub step: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub error_info: Option<ErrorInfo>,
    /// Free-form step details; later writes merge keys into earlier ones.
    pub details: serde_json::Value,
}

impl ExecutionHistoryRow {
    /// Wall-clock duration of the step, when it has finished.
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }
}

/// Aggregate view of one step lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    pub step: String,
    pub status: StepStatus,
    pub retry_count: u32,
    pub duration: Option<Duration>,
}

/// An error that can be folded into a history row.
pub trait StepFailure {
    fn error_info(&self) -> ErrorInfo;
}

impl StepFailure for AdmissionError {
    fn error_info(&self) -> ErrorInfo {
        AdmissionError::error_info(self)
    }
}

impl StepFailure for SchedulerError {
    fn error_info(&self) -> ErrorInfo {
        SchedulerError::error_info(self)
    }
}

impl StepFailure for CommitError {
    fn error_info(&self) -> ErrorInfo {
        CommitError::error_info(self)
    }
}

/// Scoped bracket around scheduler steps.
///
/// Records start on entry and success on normal exit; on error it records a
/// FAILURE row with structured `{type, message, module}` error info and
/// returns the error unchanged - the bracket never swallows. History-store
/// failures are logged and do not mask the wrapped operation's outcome.
pub struct StepTracker {
    store: Arc<dyn HistoryStore>,
}

impl StepTracker {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub async fn track_step<T, E, F, Fut>(
        &self,
        session_id: SessionId,
        step: &str,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: StepFailure,
    {
        if let Err(e) = self.store.record_step_start(session_id, step).await {
            warn!(session_id = %session_id, step, error = %e, "Failed to record step start");
        }

        match op().await {
            Ok(value) => {
                if let Err(e) = self.store.record_step_success(session_id, step).await {
                    warn!(session_id = %session_id, step, error = %e, "Failed to record step success");
                }
                Ok(value)
            }
            Err(error) => {
                let info = error.error_info();
                if let Err(e) = self
                    .store
                    .record_step_failure(session_id, step, info)
                    .await
                {
                    warn!(session_id = %session_id, step, error = %e, "Failed to record step failure");
                }
                Err(error)
            }
        }
    }

    /// Folds a retry into the latest matching row: increments its
    /// `retry_count` and resets the row to IN_PROGRESS.
    pub async fn record_retry(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<(), SchedulerError> {
        self.store.record_step_retry(session_id, step).await
    }

    /// Merges details into the latest row of the step lineage.
    pub async fn merge_details(
        &self,
        session_id: SessionId,
        step: &str,
        details: serde_json::Value,
    ) {
        if let Err(e) = self
            .store
            .merge_step_details(session_id, step, details)
            .await
        {
            warn!(session_id = %session_id, step, error = %e, "Failed to merge step details");
        }
    }

    /// The latest row of a step lineage, if any.
    pub async fn latest_row(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<Option<ExecutionHistoryRow>, SchedulerError> {
        self.store.latest_row(session_id, step).await
    }

    /// Aggregates duration, retries, and outcome per step of a session.
    pub async fn summarize(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<StepSummary>, SchedulerError> {
        let rows = self.store.load_rows(session_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| StepSummary {
                duration: row.duration(),
                step: row.step,
                status: row.status,
                retry_count: row.retry_count,
            })
            .collect())
    }
}

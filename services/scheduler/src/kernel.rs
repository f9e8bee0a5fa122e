//! Kernel lifecycle state machine.
//!
//! Kernel status moves `PREPARING → PULLING → PREPARED → CREATING → RUNNING
//! → TERMINATED`, with `CANCELLED` as an alternate terminal path out of any
//! pre-running state. Transitions are monotonic: nothing ever leaves a
//! terminal state, and a transition that finds the kernel already past its
//! expected origin is a no-op rather than an error.
//!
//! The engine is the only mutation surface for kernel status. Agents report
//! lifecycle events concurrently and out of band; every operation is a
//! single compare-and-set against the kernel store, so racing reporters
//! converge instead of conflicting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tern_id::{AgentId, KernelId, SessionId};
use tern_resource::ResourceSlot;

use crate::errors::SchedulerError;
use crate::repository::KernelStore;
use crate::workload::KernelSpec;

/// Kernel lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KernelStatus {
    Preparing,
    Pulling,
    Prepared,
    Creating,
    Running,
    Terminated,
    Cancelled,
}

impl KernelStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Cancelled)
    }

    /// Statuses whose kernels hold (or have requested) resources.
    pub fn occupies_resources(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "PREPARING",
            Self::Pulling => "PULLING",
            Self::Prepared => "PREPARED",
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Terminated => "TERMINATED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backend-assigned metadata attached when a kernel reaches RUNNING.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelCreationInfo {
    pub container_id: Option<String>,
    pub kernel_host: Option<String>,
    pub service_ports: Option<serde_json::Value>,
    pub attached_devices: Option<serde_json::Value>,
}

/// The stored state of one kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelRecord {
    pub kernel_id: KernelId,
    pub session_id: SessionId,
    pub agent: Option<AgentId>,
    pub image: String,
    pub requested_slots: ResourceSlot,
    pub status: KernelStatus,
    pub status_reason: String,
    pub status_changed: DateTime<Utc>,
    pub creation_info: Option<KernelCreationInfo>,
    pub exit_code: Option<i32>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl KernelRecord {
    /// A fresh record for an admitted kernel, starting in PREPARING.
    pub fn from_spec(spec: &KernelSpec) -> Self {
        Self {
            kernel_id: spec.kernel_id,
            session_id: spec.session_id,
            agent: spec.agent,
            image: spec.image.clone(),
            requested_slots: spec.requested_slots.clone(),
            status: KernelStatus::Preparing,
            status_reason: "admitted".to_string(),
            status_changed: Utc::now(),
            creation_info: None,
            exit_code: None,
            last_heartbeat: None,
        }
    }
}

/// The payload of one compare-and-set transition.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: KernelStatus,
    pub reason: String,
    pub creation_info: Option<KernelCreationInfo>,
    pub exit_code: Option<i32>,
}

impl StatusChange {
    pub fn to(status: KernelStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            creation_info: None,
            exit_code: None,
        }
    }
}

/// Drives kernel status transitions through the kernel store.
///
/// Invoked by the scheduling coordinator (admission) and by asynchronous
/// agent lifecycle callbacks. All operations are idempotent toward their
/// target state and report whether anything actually changed.
pub struct KernelStateEngine {
    store: Arc<dyn KernelStore>,
}

impl KernelStateEngine {
    pub fn new(store: Arc<dyn KernelStore>) -> Self {
        Self { store }
    }

    /// Creates this session's kernels in PREPARING as part of admission.
    pub async fn initialize_session(&self, specs: &[KernelSpec]) -> Result<(), SchedulerError> {
        let records = specs.iter().map(KernelRecord::from_spec).collect();
        self.store.insert_kernels(records).await
    }

    /// Re-asserts PREPARING (agent acknowledged the kernel before pulling).
    pub async fn mark_preparing(&self, kernel_id: KernelId) -> Result<bool, SchedulerError> {
        self.store
            .transition(
                kernel_id,
                &[KernelStatus::Preparing],
                StatusChange::to(KernelStatus::Preparing, "preparing"),
            )
            .await
    }

    /// PREPARING → PULLING when the agent starts fetching the image.
    pub async fn mark_pulling(
        &self,
        kernel_id: KernelId,
        reason: &str,
    ) -> Result<bool, SchedulerError> {
        self.store
            .transition(
                kernel_id,
                &[KernelStatus::Preparing],
                StatusChange::to(KernelStatus::Pulling, reason),
            )
            .await
    }

    /// PULLING | PREPARED → CREATING when the container build starts.
    pub async fn mark_creating(
        &self,
        kernel_id: KernelId,
        reason: &str,
    ) -> Result<bool, SchedulerError> {
        self.store
            .transition(
                kernel_id,
                &[KernelStatus::Pulling, KernelStatus::Prepared],
                StatusChange::to(KernelStatus::Creating, reason),
            )
            .await
    }

    /// Any pre-running state → RUNNING; the only transition that attaches
    /// backend creation metadata. Agents may leapfrog intermediate states
    /// when the image is already present, so every pre-running origin is
    /// accepted.
    pub async fn mark_running(
        &self,
        kernel_id: KernelId,
        reason: &str,
        creation_info: KernelCreationInfo,
    ) -> Result<bool, SchedulerError> {
        let changed = self
            .store
            .transition(
                kernel_id,
                &[
                    KernelStatus::Preparing,
                    KernelStatus::Pulling,
                    KernelStatus::Prepared,
                    KernelStatus::Creating,
                ],
                StatusChange {
                    status: KernelStatus::Running,
                    reason: reason.to_string(),
                    creation_info: Some(creation_info),
                    exit_code: None,
                },
            )
            .await?;
        if changed {
            debug!(kernel_id = %kernel_id, "Kernel is running");
        }
        Ok(changed)
    }

    /// Any pre-terminal state → CANCELLED. When the last non-cancelled
    /// kernel of the session goes, the whole session is cancelled too.
    ///
    /// The cascade fires only from cancellation, never from termination:
    /// partial termination of a multi-kernel session is normal.
    pub async fn mark_cancelled(
        &self,
        kernel_id: KernelId,
        session_id: SessionId,
        reason: &str,
    ) -> Result<bool, SchedulerError> {
        let changed = self
            .store
            .transition(
                kernel_id,
                &[
                    KernelStatus::Preparing,
                    KernelStatus::Pulling,
                    KernelStatus::Prepared,
                    KernelStatus::Creating,
                ],
                StatusChange::to(KernelStatus::Cancelled, reason),
            )
            .await?;
        if changed {
            self.cascade_session_cancel(session_id, reason).await?;
        }
        Ok(changed)
    }

    /// Any non-terminal state → TERMINATED, recording the exit code.
    pub async fn mark_terminated(
        &self,
        kernel_id: KernelId,
        reason: &str,
        exit_code: Option<i32>,
    ) -> Result<bool, SchedulerError> {
        self.store
            .transition(
                kernel_id,
                &[
                    KernelStatus::Preparing,
                    KernelStatus::Pulling,
                    KernelStatus::Prepared,
                    KernelStatus::Creating,
                    KernelStatus::Running,
                ],
                StatusChange {
                    status: KernelStatus::Terminated,
                    reason: reason.to_string(),
                    creation_info: None,
                    exit_code,
                },
            )
            .await
    }

    /// Refreshes liveness of a RUNNING kernel; never changes status.
    pub async fn update_heartbeat(&self, kernel_id: KernelId) -> Result<bool, SchedulerError> {
        self.store.touch_heartbeat(kernel_id, Utc::now()).await
    }

    /// Fans an agent-level "image pull started" event out to every kernel
    /// on that agent waiting for the image. Image pulls are shared per
    /// agent, not per kernel.
    pub async fn update_kernels_to_pulling_for_image(
        &self,
        agent: AgentId,
        image: &str,
    ) -> Result<usize, SchedulerError> {
        let affected = self
            .store
            .transition_for_image(
                agent,
                image,
                &[KernelStatus::Preparing],
                StatusChange::to(KernelStatus::Pulling, "image pull started"),
            )
            .await?;
        Ok(affected.len())
    }

    /// Agent-level "image ready": kernels waiting in PREPARING or PULLING
    /// become PREPARED. Returns how many kernels advanced.
    pub async fn update_kernels_to_prepared_for_image(
        &self,
        agent: AgentId,
        image: &str,
    ) -> Result<usize, SchedulerError> {
        let affected = self
            .store
            .transition_for_image(
                agent,
                image,
                &[KernelStatus::Preparing, KernelStatus::Pulling],
                StatusChange::to(KernelStatus::Prepared, "image ready"),
            )
            .await?;
        if !affected.is_empty() {
            info!(
                agent = %agent,
                image,
                count = affected.len(),
                "Kernels prepared for image"
            );
        }
        Ok(affected.len())
    }

    /// Agent-level image failure: every waiting kernel is cancelled, and
    /// sessions whose kernels are now all cancelled cascade.
    pub async fn cancel_kernels_for_failed_image(
        &self,
        agent: AgentId,
        image: &str,
        error_msg: &str,
    ) -> Result<Vec<SessionId>, SchedulerError> {
        let reason = format!("image pull failed: {error_msg}");
        let affected = self
            .store
            .transition_for_image(
                agent,
                image,
                &[
                    KernelStatus::Preparing,
                    KernelStatus::Pulling,
                    KernelStatus::Prepared,
                ],
                StatusChange::to(KernelStatus::Cancelled, reason.clone()),
            )
            .await?;

        let mut session_ids: Vec<SessionId> = affected.iter().map(|k| k.session_id).collect();
        session_ids.sort();
        session_ids.dedup();
        for session_id in &session_ids {
            self.cascade_session_cancel(*session_id, &reason).await?;
        }
        Ok(session_ids)
    }

    /// Cancels the session when none of its kernels remain non-cancelled.
    async fn cascade_session_cancel(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<(), SchedulerError> {
        if self.store.has_non_cancelled_kernels(session_id).await? {
            return Ok(());
        }
        let cancelled = self.store.cancel_session(session_id, reason).await?;
        if cancelled {
            info!(session_id = %session_id, reason, "All kernels cancelled; session cancelled");
        }
        Ok(())
    }
}

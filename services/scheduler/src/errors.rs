//! Error types for admission decisions and scheduler infrastructure.
//!
//! Admission rejections are user-facing and non-fatal: a quota-type
//! rejection means "retry on a later tick", while an unsatisfied dependency
//! is permanent and cancels the workload. Infrastructure errors propagate
//! and abort the tick without undoing already-committed admissions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tern_id::{AccessKey, KernelId, SessionId};
use tern_resource::SlotShortage;

/// Structured error payload persisted into execution history rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// The error's type name (enum variant).
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable message, safe to show to end users for admission
    /// rejections.
    pub message: String,
    /// The module that produced the error.
    pub module: String,
}

impl ErrorInfo {
    pub fn new(error_type: &str, message: String) -> Self {
        Self {
            error_type: error_type.to_string(),
            message,
            module: module_path!().to_string(),
        }
    }
}

/// Which pending-session ceiling a workload ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingLimitExceeded {
    Count { pending: u32, limit: u32 },
    Resources(SlotShortage),
}

impl std::fmt::Display for PendingLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count { pending, limit } => {
                write!(f, "{pending} sessions pending, limit {limit}")
            }
            Self::Resources(shortage) => write!(f, "pending resource sum over limit: {shortage}"),
        }
    }
}

/// A typed, user-facing admission rejection.
///
/// Every variant's `Display` output is safe to surface to the requesting
/// user. Only [`AdmissionError::DependenciesNotSatisfied`] is permanent;
/// all other rejections leave the workload pending for a later tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdmissionError {
    #[error("keypair {access_key} would exceed its resource quota: {shortage}")]
    KeypairResourceQuotaExceeded {
        access_key: AccessKey,
        shortage: SlotShortage,
    },

    #[error("user would exceed the per-user resource quota: {shortage}")]
    UserResourceQuotaExceeded { shortage: SlotShortage },

    #[error("group would exceed its resource quota: {shortage}")]
    GroupResourceQuotaExceeded { shortage: SlotShortage },

    #[error("domain {domain} would exceed its resource quota: {shortage}")]
    DomainResourceQuotaExceeded { domain: String, shortage: SlotShortage },

    #[error("keypair {access_key} has {active} active sessions, limit {limit}")]
    ConcurrencyLimitExceeded {
        access_key: AccessKey,
        active: u32,
        limit: u32,
        private: bool,
    },

    #[error("pending session limit exceeded: {0}")]
    PendingSessionLimitExceeded(PendingLimitExceeded),

    /// Batch dependency rejection: every unmet dependency appears as
    /// `name (id)`, not just the first one found.
    #[error("unsatisfied dependencies: {}", unmet.join(", "))]
    DependenciesNotSatisfied { unmet: Vec<String> },

    #[error("not enough free capacity in resource group: {shortage}")]
    CapacityExceeded { shortage: SlotShortage },
}

impl AdmissionError {
    /// A permanent rejection cancels the workload instead of leaving it
    /// pending for retry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DependenciesNotSatisfied { .. })
    }

    /// The variant name, used as `error_info.type` in history rows.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeypairResourceQuotaExceeded { .. } => "KeypairResourceQuotaExceeded",
            Self::UserResourceQuotaExceeded { .. } => "UserResourceQuotaExceeded",
            Self::GroupResourceQuotaExceeded { .. } => "GroupResourceQuotaExceeded",
            Self::DomainResourceQuotaExceeded { .. } => "DomainResourceQuotaExceeded",
            Self::ConcurrencyLimitExceeded { .. } => "ConcurrencyLimitExceeded",
            Self::PendingSessionLimitExceeded { .. } => "PendingSessionLimitExceeded",
            Self::DependenciesNotSatisfied { .. } => "DependenciesNotSatisfied",
            Self::CapacityExceeded { .. } => "CapacityExceeded",
        }
    }

    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

/// Infrastructure-level scheduler errors.
///
/// These are not user-facing rejections: repository failures abort the
/// current tick, commit conflicts are recovered locally by skipping the
/// workload until the next tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("admission rejected: {0}")]
    Rejected(#[from] AdmissionError),

    #[error("commit conflict for session {0}")]
    CommitConflict(SessionId),

    #[error("unknown kernel: {0}")]
    KernelNotFound(KernelId),

    #[error("unknown resource group: {0}")]
    ResourceGroupNotFound(String),

    #[error("repository error: {0}")]
    Repository(String),
}

impl SchedulerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected(inner) => inner.kind(),
            Self::CommitConflict(_) => "CommitConflict",
            Self::KernelNotFound(_) => "KernelNotFound",
            Self::ResourceGroupNotFound(_) => "ResourceGroupNotFound",
            Self::Repository(_) => "Repository",
        }
    }

    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

/// Outcome of `commit_admission`: conflicts are expected under concurrent
/// schedulers and recovered locally; anything else is an infrastructure
/// failure scoped to the one workload being committed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitError {
    #[error("workload was admitted or cancelled concurrently")]
    Conflict,

    #[error(transparent)]
    Repository(SchedulerError),
}

impl CommitError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict => "CommitConflict",
            Self::Repository(inner) => inner.kind(),
        }
    }

    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

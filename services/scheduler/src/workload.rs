//! Pending workload descriptions consumed by the admission pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tern_id::{AccessKey, AgentId, KernelId, ProjectId, SessionId, UserId};
use tern_resource::ResourceSlot;

/// What kind of session a workload will become.
///
/// Private sessions (system SFTP/SSH access) count against their own
/// concurrency ceiling and do not accumulate into tenant occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Interactive,
    Batch,
    Private,
}

impl SessionKind {
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// One kernel a session needs; kernel IDs are assigned at admission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelRequirement {
    pub image: String,
    pub requested_slots: ResourceSlot,
}

/// A pending compute session awaiting admission.
///
/// Created on enqueue; consumed on admission or cancellation. The
/// `requested_slots` field is the session-wide total across all kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWorkload {
    pub session_id: SessionId,
    pub access_key: AccessKey,
    pub requested_slots: ResourceSlot,
    pub user_uuid: UserId,
    pub group_id: ProjectId,
    pub domain_name: String,
    pub scaling_group: String,
    pub kind: SessionKind,
    /// Larger values are fetched ahead of smaller ones; defaults to 0.
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub kernels: Vec<KernelRequirement>,
    /// Pin every kernel of this session to one agent, when set.
    pub designated_agent: Option<AgentId>,
}

impl SessionWorkload {
    /// Assigns fresh kernel IDs to this workload's kernel requirements.
    ///
    /// Called once per admission; a workload that fails to commit gets new
    /// IDs on the next attempt, so a half-failed commit never collides.
    pub fn to_kernel_specs(&self) -> Vec<KernelSpec> {
        self.kernels
            .iter()
            .map(|req| KernelSpec {
                kernel_id: KernelId::new(),
                session_id: self.session_id,
                image: req.image.clone(),
                requested_slots: req.requested_slots.clone(),
                agent: self.designated_agent,
            })
            .collect()
    }
}

/// A concrete kernel to create for an admitted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub kernel_id: KernelId,
    pub session_id: SessionId,
    pub image: String,
    pub requested_slots: ResourceSlot,
    pub agent: Option<AgentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_workload(cpu: i64) -> SessionWorkload {
        SessionWorkload {
            session_id: SessionId::new(),
            access_key: AccessKey::from("AKIA-TEST"),
            requested_slots: ResourceSlot::from([("cpu", cpu)]),
            user_uuid: uuid::Uuid::new_v4(),
            group_id: uuid::Uuid::new_v4(),
            domain_name: "default".to_string(),
            scaling_group: "default".to_string(),
            kind: SessionKind::Interactive,
            priority: 0,
            enqueued_at: Utc::now(),
            kernels: vec![KernelRequirement {
                image: "python:3.13".to_string(),
                requested_slots: ResourceSlot::from([("cpu", cpu)]),
            }],
            designated_agent: None,
        }
    }

    #[test]
    fn test_kernel_specs_get_fresh_ids() {
        let workload = test_workload(4);
        let first = workload.to_kernel_specs();
        let second = workload.to_kernel_specs();
        assert_eq!(first.len(), 1);
        assert_ne!(first[0].kernel_id, second[0].kernel_id);
        assert_eq!(first[0].session_id, workload.session_id);
    }

    #[test]
    fn test_private_kind() {
        assert!(SessionKind::Private.is_private());
        assert!(!SessionKind::Batch.is_private());
    }
}

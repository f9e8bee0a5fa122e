//! Immutable point-in-time system state for one scheduling tick.
//!
//! A [`SystemSnapshot`] is built once per tick by the repository and is the
//! single read barrier: every validator and sequencer in that tick sees the
//! same consistent view. Snapshots are never mutated; the coordinator keeps
//! its own tick-local capacity ledger for tentative reservations.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tern_id::{AccessKey, AgentId, ProjectId, SessionId, UserId};
use tern_resource::{KnownSlotTypes, ResourceSlot};

use crate::workload::SessionWorkload;

/// Session-level lifecycle status, as visible to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Scheduled,
    Running,
    Terminated,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Cancelled)
    }
}

/// The recorded outcome of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionResult {
    Undefined,
    Success,
    Failure,
}

/// Occupancy and live session counts for one keypair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypairOccupancy {
    pub occupied_slots: ResourceSlot,
    pub session_count: u32,
    pub sftp_session_count: u32,
}

/// Resource occupancy grouped by every accounting scope.
#[derive(Debug, Clone, Default)]
pub struct ResourceOccupancySnapshot {
    pub by_keypair: HashMap<AccessKey, KeypairOccupancy>,
    pub by_user: HashMap<UserId, ResourceSlot>,
    pub by_group: HashMap<ProjectId, ResourceSlot>,
    pub by_domain: HashMap<String, ResourceSlot>,
    pub by_agent: HashMap<AgentId, ResourceSlot>,
}

impl ResourceOccupancySnapshot {
    /// Group-wide occupancy: the per-agent view covers every kernel holding
    /// resources, including private sessions excluded from tenant scopes.
    pub fn total_occupied(&self) -> ResourceSlot {
        let mut total = ResourceSlot::new();
        for slots in self.by_agent.values() {
            total += slots;
        }
        total
    }
}

/// Resource policy attached to a keypair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPairResourcePolicy {
    pub name: String,
    pub total_resource_slots: ResourceSlot,
    pub max_concurrent_sessions: Option<u32>,
    pub max_concurrent_sftp_sessions: Option<u32>,
    pub max_pending_session_count: Option<u32>,
    pub max_pending_session_resource_slots: Option<ResourceSlot>,
}

/// Per-user total-slot policy (derived from the user's main keypair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResourcePolicy {
    pub name: String,
    pub total_resource_slots: ResourceSlot,
}

/// Limits and policies for every tenant scope present in the pending queue.
#[derive(Debug, Clone, Default)]
pub struct ResourcePolicySnapshot {
    pub keypair_policies: HashMap<AccessKey, KeyPairResourcePolicy>,
    pub user_policies: HashMap<UserId, UserResourcePolicy>,
    /// Group limits constrain only the slots they name.
    pub group_limits: HashMap<ProjectId, ResourceSlot>,
    /// Domain limits constrain only the slots they name.
    pub domain_limits: HashMap<String, ResourceSlot>,
}

/// Active session counts per keypair.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencySnapshot {
    pub sessions_by_keypair: HashMap<AccessKey, u32>,
    pub sftp_sessions_by_keypair: HashMap<AccessKey, u32>,
}

/// Pending queue totals per keypair (the candidate itself included).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingCounts {
    pub count: u32,
    pub total_slots: ResourceSlot,
}

#[derive(Debug, Clone, Default)]
pub struct PendingSessionSnapshot {
    pub by_keypair: HashMap<AccessKey, PendingCounts>,
}

/// One dependency edge of a pending session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDependencyInfo {
    pub depends_on: SessionId,
    pub dependency_name: String,
    pub dependency_status: SessionStatus,
    pub dependency_result: SessionResult,
}

impl SessionDependencyInfo {
    /// A dependency is satisfied only by a successfully terminated session.
    pub fn is_satisfied(&self) -> bool {
        self.dependency_status == SessionStatus::Terminated
            && self.dependency_result == SessionResult::Success
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionDependencySnapshot {
    pub by_session: HashMap<SessionId, Vec<SessionDependencyInfo>>,
}

/// Fair-share factors for every scope active in the resource group.
///
/// Factors come from the periodic fair-share recomputation; scopes that
/// never participated have no row and fall back to the neutral 1.0.
#[derive(Debug, Clone, Default)]
pub struct FairShareSnapshot {
    pub by_domain: HashMap<String, Decimal>,
    pub by_project: HashMap<ProjectId, Decimal>,
    pub by_user: HashMap<UserId, Decimal>,
}

impl FairShareSnapshot {
    /// Looks up the most specific factor for a workload's scope:
    /// user, then project, then domain, then the neutral default.
    pub fn factor_for(&self, workload: &SessionWorkload) -> Decimal {
        if let Some(factor) = self.by_user.get(&workload.user_uuid) {
            return *factor;
        }
        if let Some(factor) = self.by_project.get(&workload.group_id) {
            return *factor;
        }
        if let Some(factor) = self.by_domain.get(&workload.domain_name) {
            return *factor;
        }
        Decimal::ONE
    }
}

/// The immutable snapshot a tick operates on.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    pub total_capacity: ResourceSlot,
    pub known_slot_types: KnownSlotTypes,
    pub resource_occupancy: ResourceOccupancySnapshot,
    pub resource_policies: ResourcePolicySnapshot,
    pub concurrency: ConcurrencySnapshot,
    pub pending_sessions: PendingSessionSnapshot,
    pub session_dependencies: SessionDependencySnapshot,
    pub fair_share: FairShareSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tern_id::SessionId;

    use crate::workload::{KernelRequirement, SessionKind};

    fn workload_for_scopes(user: UserId, group: ProjectId, domain: &str) -> SessionWorkload {
        SessionWorkload {
            session_id: SessionId::new(),
            access_key: AccessKey::from("AKIA-TEST"),
            requested_slots: ResourceSlot::from([("cpu", 1)]),
            user_uuid: user,
            group_id: group,
            domain_name: domain.to_string(),
            scaling_group: "default".to_string(),
            kind: SessionKind::Interactive,
            priority: 0,
            enqueued_at: Utc::now(),
            kernels: vec![KernelRequirement {
                image: "python:3.13".to_string(),
                requested_slots: ResourceSlot::from([("cpu", 1)]),
            }],
            designated_agent: None,
        }
    }

    #[test]
    fn test_dependency_satisfaction() {
        let dep = SessionDependencyInfo {
            depends_on: SessionId::new(),
            dependency_name: "prep".to_string(),
            dependency_status: SessionStatus::Terminated,
            dependency_result: SessionResult::Success,
        };
        assert!(dep.is_satisfied());

        let running = SessionDependencyInfo {
            dependency_status: SessionStatus::Running,
            dependency_result: SessionResult::Undefined,
            ..dep.clone()
        };
        assert!(!running.is_satisfied());

        let failed = SessionDependencyInfo {
            dependency_status: SessionStatus::Terminated,
            dependency_result: SessionResult::Failure,
            ..dep
        };
        assert!(!failed.is_satisfied());
    }

    #[test]
    fn test_factor_lookup_prefers_most_specific_scope() {
        let user = uuid::Uuid::new_v4();
        let group = uuid::Uuid::new_v4();

        let mut fair_share = FairShareSnapshot::default();
        fair_share
            .by_domain
            .insert("default".to_string(), Decimal::new(2, 1));
        fair_share.by_project.insert(group, Decimal::new(5, 1));

        let w = workload_for_scopes(user, group, "default");
        assert_eq!(fair_share.factor_for(&w), Decimal::new(5, 1));

        fair_share.by_user.insert(user, Decimal::new(9, 1));
        assert_eq!(fair_share.factor_for(&w), Decimal::new(9, 1));
    }

    #[test]
    fn test_unknown_scope_gets_neutral_factor() {
        let fair_share = FairShareSnapshot::default();
        let w = workload_for_scopes(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), "other");
        assert_eq!(fair_share.factor_for(&w), Decimal::ONE);
    }

    #[test]
    fn test_total_occupied_sums_agents() {
        let mut occupancy = ResourceOccupancySnapshot::default();
        occupancy
            .by_agent
            .insert(AgentId::new(), ResourceSlot::from([("cpu", 4)]));
        occupancy
            .by_agent
            .insert(AgentId::new(), ResourceSlot::from([("cpu", 2), ("mem", 512)]));
        let total = occupancy.total_occupied();
        assert_eq!(total, ResourceSlot::from([("cpu", 6), ("mem", 512)]));
    }
}

//! In-process implementation of the repository collaborators.
//!
//! Backs the dummy single-node backend and the test harness: one structure
//! holds groups, policies, the pending queue, kernels, history rows, and
//! fair-share state behind an async lock, and implements every collaborator
//! trait against it. Kernels without a designated agent are attributed to
//! the store's single local agent.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tern_id::{AccessKey, AgentId, KernelId, ProjectId, SessionId, UserId};
use tern_resource::{KnownSlotTypes, ResourceSlot};

use crate::errors::{AdmissionError, CommitError, ErrorInfo, SchedulerError};
use crate::fair_share::{
    DomainFairShareRow, FairShareComputation, FairShareRows, ProjectFairShareRow, UsageHistory,
    UserFairShareRow,
};
use crate::history::{ExecutionHistoryRow, StepStatus};
use crate::kernel::{KernelRecord, KernelStatus, StatusChange};
use crate::repository::{FairShareStore, HistoryStore, KernelStore, SchedulerRepository};
use crate::snapshot::{
    ConcurrencySnapshot, FairShareSnapshot, KeyPairResourcePolicy, PendingCounts,
    PendingSessionSnapshot, ResourceOccupancySnapshot, ResourcePolicySnapshot,
    SessionDependencyInfo, SessionDependencySnapshot, SessionResult, SessionStatus,
    SystemSnapshot, UserResourcePolicy,
};
use crate::workload::{KernelSpec, SessionWorkload};

#[derive(Debug, Clone)]
struct SessionMeta {
    name: String,
    status: SessionStatus,
    result: SessionResult,
    workload: SessionWorkload,
}

#[derive(Default)]
struct Inner {
    groups: HashMap<String, ResourceSlot>,
    known_slot_types: KnownSlotTypes,
    keypair_policies: HashMap<AccessKey, KeyPairResourcePolicy>,
    user_policies: HashMap<UserId, UserResourcePolicy>,
    group_limits: HashMap<ProjectId, ResourceSlot>,
    domain_limits: HashMap<String, ResourceSlot>,
    pending: Vec<SessionWorkload>,
    sessions: HashMap<SessionId, SessionMeta>,
    dependencies: HashMap<SessionId, Vec<SessionId>>,
    rejections: HashMap<SessionId, String>,
    kernels: BTreeMap<KernelId, KernelRecord>,
    history: Vec<ExecutionHistoryRow>,
    next_history_id: u64,
    usage: HashMap<String, UsageHistory>,
    fair_share_rows: HashMap<String, FairShareRows>,
    project_domains: HashMap<ProjectId, String>,
}

/// Single-process repository used by the dummy backend and tests.
pub struct MemoryRepository {
    state: RwLock<Inner>,
    local_agent: AgentId,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Inner::default()),
            local_agent: AgentId::new(),
        }
    }

    /// The agent every unpinned kernel is attributed to.
    pub fn local_agent(&self) -> AgentId {
        self.local_agent
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub async fn add_resource_group(&self, name: &str, capacity: ResourceSlot) {
        self.state
            .write()
            .await
            .groups
            .insert(name.to_string(), capacity);
    }

    pub async fn set_known_slot_types(&self, slot_types: KnownSlotTypes) {
        self.state.write().await.known_slot_types = slot_types;
    }

    pub async fn set_keypair_policy(&self, access_key: AccessKey, policy: KeyPairResourcePolicy) {
        self.state
            .write()
            .await
            .keypair_policies
            .insert(access_key, policy);
    }

    pub async fn set_user_policy(&self, user: UserId, policy: UserResourcePolicy) {
        self.state.write().await.user_policies.insert(user, policy);
    }

    pub async fn set_group_limit(&self, project: ProjectId, limit: ResourceSlot) {
        self.state.write().await.group_limits.insert(project, limit);
    }

    pub async fn set_domain_limit(&self, domain: &str, limit: ResourceSlot) {
        self.state
            .write()
            .await
            .domain_limits
            .insert(domain.to_string(), limit);
    }

    /// Enqueues a workload as pending under a human-readable session name.
    pub async fn enqueue_workload(&self, name: &str, workload: SessionWorkload) {
        let mut state = self.state.write().await;
        state.project_domains.insert(
            workload.group_id,
            workload.domain_name.clone(),
        );
        state.sessions.insert(
            workload.session_id,
            SessionMeta {
                name: name.to_string(),
                status: SessionStatus::Pending,
                result: SessionResult::Undefined,
                workload: workload.clone(),
            },
        );
        state.pending.push(workload);
    }

    /// Declares that `session` depends on `depends_on`.
    pub async fn add_dependency(&self, session: SessionId, depends_on: SessionId) {
        self.state
            .write()
            .await
            .dependencies
            .entry(session)
            .or_default()
            .push(depends_on);
    }

    /// Overrides a session's lifecycle state (e.g. to settle a dependency).
    pub async fn set_session_state(
        &self,
        session: SessionId,
        status: SessionStatus,
        result: SessionResult,
    ) {
        if let Some(meta) = self.state.write().await.sessions.get_mut(&session) {
            meta.status = status;
            meta.result = result;
        }
    }

    pub async fn set_usage_buckets(&self, resource_group: &str, usage: UsageHistory) {
        self.state
            .write()
            .await
            .usage
            .insert(resource_group.to_string(), usage);
    }

    // ------------------------------------------------------------------
    // Inspection (tests and operators)
    // ------------------------------------------------------------------

    pub async fn session_status(&self, session: SessionId) -> Option<SessionStatus> {
        self.state
            .read()
            .await
            .sessions
            .get(&session)
            .map(|meta| meta.status)
    }

    pub async fn latest_rejection(&self, session: SessionId) -> Option<String> {
        self.state.read().await.rejections.get(&session).cloned()
    }

    pub async fn kernel_ids_for_session(&self, session: SessionId) -> Vec<KernelId> {
        self.state
            .read()
            .await
            .kernels
            .values()
            .filter(|k| k.session_id == session)
            .map(|k| k.kernel_id)
            .collect()
    }

    pub async fn pending_count(&self, resource_group: &str) -> usize {
        self.state
            .read()
            .await
            .pending
            .iter()
            .filter(|w| w.scaling_group == resource_group)
            .count()
    }

    // ------------------------------------------------------------------
    // Snapshot assembly
    // ------------------------------------------------------------------

    fn build_snapshot(&self, state: &Inner, resource_group: &str) -> Result<SystemSnapshot, SchedulerError> {
        let total_capacity = state
            .groups
            .get(resource_group)
            .cloned()
            .ok_or_else(|| SchedulerError::ResourceGroupNotFound(resource_group.to_string()))?;

        let mut occupancy = ResourceOccupancySnapshot::default();
        let mut live_sessions: HashSet<SessionId> = HashSet::new();

        for kernel in state.kernels.values() {
            if !kernel.status.occupies_resources() {
                continue;
            }
            let Some(meta) = state.sessions.get(&kernel.session_id) else {
                continue;
            };
            if meta.workload.scaling_group != resource_group {
                continue;
            }

            let agent = kernel.agent.unwrap_or(self.local_agent);
            *occupancy.by_agent.entry(agent).or_default() += &kernel.requested_slots;
            live_sessions.insert(kernel.session_id);

            // Private sessions never accumulate into tenant scopes.
            if meta.workload.kind.is_private() {
                continue;
            }
            let entry = occupancy
                .by_keypair
                .entry(meta.workload.access_key.clone())
                .or_default();
            entry.occupied_slots += &kernel.requested_slots;
            *occupancy
                .by_user
                .entry(meta.workload.user_uuid)
                .or_default() += &kernel.requested_slots;
            *occupancy
                .by_group
                .entry(meta.workload.group_id)
                .or_default() += &kernel.requested_slots;
            *occupancy
                .by_domain
                .entry(meta.workload.domain_name.clone())
                .or_default() += &kernel.requested_slots;
        }

        let mut concurrency = ConcurrencySnapshot::default();
        for session_id in &live_sessions {
            let Some(meta) = state.sessions.get(session_id) else {
                continue;
            };
            if meta.workload.kind.is_private() {
                *concurrency
                    .sftp_sessions_by_keypair
                    .entry(meta.workload.access_key.clone())
                    .or_default() += 1;
                if let Some(entry) = occupancy.by_keypair.get_mut(&meta.workload.access_key) {
                    entry.sftp_session_count += 1;
                }
            } else {
                *concurrency
                    .sessions_by_keypair
                    .entry(meta.workload.access_key.clone())
                    .or_default() += 1;
                if let Some(entry) = occupancy.by_keypair.get_mut(&meta.workload.access_key) {
                    entry.session_count += 1;
                }
            }
        }

        let mut pending_sessions = PendingSessionSnapshot::default();
        for workload in &state.pending {
            if workload.scaling_group != resource_group {
                continue;
            }
            let entry = pending_sessions
                .by_keypair
                .entry(workload.access_key.clone())
                .or_insert_with(PendingCounts::default);
            entry.count += 1;
            entry.total_slots += &workload.requested_slots;
        }

        let mut dependency_snapshot = SessionDependencySnapshot::default();
        for workload in &state.pending {
            if workload.scaling_group != resource_group {
                continue;
            }
            let Some(dep_ids) = state.dependencies.get(&workload.session_id) else {
                continue;
            };
            let infos: Vec<SessionDependencyInfo> = dep_ids
                .iter()
                .filter_map(|dep_id| {
                    state.sessions.get(dep_id).map(|meta| SessionDependencyInfo {
                        depends_on: *dep_id,
                        dependency_name: meta.name.clone(),
                        dependency_status: meta.status,
                        dependency_result: meta.result,
                    })
                })
                .collect();
            dependency_snapshot
                .by_session
                .insert(workload.session_id, infos);
        }

        let mut fair_share = FairShareSnapshot::default();
        if let Some(rows) = state.fair_share_rows.get(resource_group) {
            for row in &rows.domain {
                fair_share
                    .by_domain
                    .insert(row.domain_name.clone(), row.fair_share_factor);
            }
            for row in &rows.project {
                fair_share
                    .by_project
                    .insert(row.project_id, row.fair_share_factor);
            }
            for row in &rows.user {
                fair_share.by_user.insert(row.user_uuid, row.fair_share_factor);
            }
        }

        Ok(SystemSnapshot {
            total_capacity,
            known_slot_types: state.known_slot_types.clone(),
            resource_occupancy: occupancy,
            resource_policies: ResourcePolicySnapshot {
                keypair_policies: state.keypair_policies.clone(),
                user_policies: state.user_policies.clone(),
                group_limits: state.group_limits.clone(),
                domain_limits: state.domain_limits.clone(),
            },
            concurrency,
            pending_sessions,
            session_dependencies: dependency_snapshot,
            fair_share,
        })
    }
}

#[async_trait]
impl SchedulerRepository for MemoryRepository {
    async fn load_snapshot(
        &self,
        resource_group: &str,
    ) -> Result<SystemSnapshot, SchedulerError> {
        let state = self.state.read().await;
        self.build_snapshot(&state, resource_group)
    }

    async fn load_pending_workloads(
        &self,
        resource_group: &str,
    ) -> Result<Vec<SessionWorkload>, SchedulerError> {
        let state = self.state.read().await;
        if !state.groups.contains_key(resource_group) {
            return Err(SchedulerError::ResourceGroupNotFound(
                resource_group.to_string(),
            ));
        }
        let mut pending: Vec<SessionWorkload> = state
            .pending
            .iter()
            .filter(|w| w.scaling_group == resource_group)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
                .then(a.session_id.cmp(&b.session_id))
        });
        Ok(pending)
    }

    async fn commit_admission(
        &self,
        workload: &SessionWorkload,
        _kernel_specs: &[KernelSpec],
    ) -> Result<(), CommitError> {
        let mut state = self.state.write().await;
        let Some(index) = state
            .pending
            .iter()
            .position(|w| w.session_id == workload.session_id)
        else {
            return Err(CommitError::Conflict);
        };
        match state.sessions.get(&workload.session_id) {
            Some(meta) if meta.status == SessionStatus::Pending => {}
            _ => return Err(CommitError::Conflict),
        }
        state.pending.remove(index);
        state.rejections.remove(&workload.session_id);
        if let Some(meta) = state.sessions.get_mut(&workload.session_id) {
            meta.status = SessionStatus::Scheduled;
        }
        Ok(())
    }

    async fn cancel_workload(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<bool, SchedulerError> {
        let mut state = self.state.write().await;
        let Some(index) = state
            .pending
            .iter()
            .position(|w| w.session_id == session_id)
        else {
            return Ok(false);
        };
        state.pending.remove(index);
        state.rejections.insert(session_id, reason.to_string());
        if let Some(meta) = state.sessions.get_mut(&session_id) {
            meta.status = SessionStatus::Cancelled;
        }
        Ok(true)
    }

    async fn record_rejection(
        &self,
        session_id: SessionId,
        rejection: &AdmissionError,
    ) -> Result<(), SchedulerError> {
        self.state
            .write()
            .await
            .rejections
            .insert(session_id, rejection.to_string());
        Ok(())
    }

    async fn penalize_priority(
        &self,
        session_ids: &[SessionId],
        amount: i32,
        floor: i32,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        for workload in state.pending.iter_mut() {
            if session_ids.contains(&workload.session_id) {
                workload.priority = (workload.priority - amount).max(floor);
            }
        }
        Ok(())
    }
}

fn apply_change(kernel: &mut KernelRecord, change: &StatusChange) {
    kernel.status = change.status;
    kernel.status_changed = Utc::now();
    kernel.status_reason = change.reason.clone();
    if let Some(info) = &change.creation_info {
        kernel.creation_info = Some(info.clone());
    }
    if change.exit_code.is_some() {
        kernel.exit_code = change.exit_code;
    }
}

#[async_trait]
impl KernelStore for MemoryRepository {
    async fn insert_kernels(&self, records: Vec<KernelRecord>) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        for mut record in records {
            if record.agent.is_none() {
                record.agent = Some(self.local_agent);
            }
            state.kernels.insert(record.kernel_id, record);
        }
        Ok(())
    }

    async fn transition(
        &self,
        kernel_id: KernelId,
        expected: &[KernelStatus],
        change: StatusChange,
    ) -> Result<bool, SchedulerError> {
        let mut state = self.state.write().await;
        let Some(kernel) = state.kernels.get_mut(&kernel_id) else {
            return Err(SchedulerError::KernelNotFound(kernel_id));
        };
        if !expected.contains(&kernel.status) {
            return Ok(false);
        }
        apply_change(kernel, &change);
        Ok(true)
    }

    async fn transition_for_image(
        &self,
        agent: AgentId,
        image: &str,
        expected: &[KernelStatus],
        change: StatusChange,
    ) -> Result<Vec<KernelRecord>, SchedulerError> {
        let mut state = self.state.write().await;
        let mut affected = Vec::new();
        for kernel in state.kernels.values_mut() {
            if kernel.agent != Some(agent)
                || kernel.image != image
                || !expected.contains(&kernel.status)
            {
                continue;
            }
            apply_change(kernel, &change);
            affected.push(kernel.clone());
        }
        Ok(affected)
    }

    async fn has_non_cancelled_kernels(
        &self,
        session_id: SessionId,
    ) -> Result<bool, SchedulerError> {
        let state = self.state.read().await;
        Ok(state
            .kernels
            .values()
            .any(|k| k.session_id == session_id && k.status != KernelStatus::Cancelled))
    }

    async fn cancel_session(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<bool, SchedulerError> {
        let mut state = self.state.write().await;
        let Some(meta) = state.sessions.get_mut(&session_id) else {
            return Ok(false);
        };
        if meta.status.is_terminal() {
            return Ok(false);
        }
        meta.status = SessionStatus::Cancelled;
        state.rejections.insert(session_id, reason.to_string());
        state.pending.retain(|w| w.session_id != session_id);
        Ok(true)
    }

    async fn touch_heartbeat(
        &self,
        kernel_id: KernelId,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let mut state = self.state.write().await;
        let Some(kernel) = state.kernels.get_mut(&kernel_id) else {
            return Err(SchedulerError::KernelNotFound(kernel_id));
        };
        if kernel.status != KernelStatus::Running {
            return Ok(false);
        }
        kernel.last_heartbeat = Some(at);
        Ok(true)
    }

    async fn get_kernel(
        &self,
        kernel_id: KernelId,
    ) -> Result<Option<KernelRecord>, SchedulerError> {
        Ok(self.state.read().await.kernels.get(&kernel_id).cloned())
    }
}

#[async_trait]
impl FairShareStore for MemoryRepository {
    async fn load_usage_buckets(
        &self,
        resource_group: &str,
    ) -> Result<UsageHistory, SchedulerError> {
        Ok(self
            .state
            .read()
            .await
            .usage
            .get(resource_group)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_rows(&self, resource_group: &str) -> Result<FairShareRows, SchedulerError> {
        Ok(self
            .state
            .read()
            .await
            .fair_share_rows
            .get(resource_group)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_group_capacity(
        &self,
        resource_group: &str,
    ) -> Result<ResourceSlot, SchedulerError> {
        self.state
            .read()
            .await
            .groups
            .get(resource_group)
            .cloned()
            .ok_or_else(|| SchedulerError::ResourceGroupNotFound(resource_group.to_string()))
    }

    async fn upsert_factors(
        &self,
        resource_group: &str,
        computation: &FairShareComputation,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        let project_domains = state.project_domains.clone();
        let rows = state
            .fair_share_rows
            .entry(resource_group.to_string())
            .or_default();
        let now = Utc::now();

        for (domain_name, result) in &computation.domain {
            match rows
                .domain
                .iter_mut()
                .find(|row| &row.domain_name == domain_name)
            {
                Some(row) => {
                    row.total_decayed_usage = result.total_decayed_usage.clone();
                    row.normalized_usage = result.normalized_usage;
                    row.fair_share_factor = result.fair_share_factor;
                    row.updated_at = now;
                }
                None => rows.domain.push(DomainFairShareRow {
                    resource_group: resource_group.to_string(),
                    domain_name: domain_name.clone(),
                    weight: None,
                    resource_weights: ResourceSlot::new(),
                    total_decayed_usage: result.total_decayed_usage.clone(),
                    normalized_usage: result.normalized_usage,
                    fair_share_factor: result.fair_share_factor,
                    created_at: now,
                    updated_at: now,
                }),
            }
        }

        for (project_id, result) in &computation.project {
            match rows
                .project
                .iter_mut()
                .find(|row| &row.project_id == project_id)
            {
                Some(row) => {
                    row.total_decayed_usage = result.total_decayed_usage.clone();
                    row.normalized_usage = result.normalized_usage;
                    row.fair_share_factor = result.fair_share_factor;
                    row.updated_at = now;
                }
                None => rows.project.push(ProjectFairShareRow {
                    resource_group: resource_group.to_string(),
                    project_id: *project_id,
                    domain_name: project_domains
                        .get(project_id)
                        .cloned()
                        .unwrap_or_default(),
                    weight: None,
                    resource_weights: ResourceSlot::new(),
                    total_decayed_usage: result.total_decayed_usage.clone(),
                    normalized_usage: result.normalized_usage,
                    fair_share_factor: result.fair_share_factor,
                    created_at: now,
                    updated_at: now,
                }),
            }
        }

        for (user_key, result) in &computation.user {
            match rows.user.iter_mut().find(|row| {
                row.user_uuid == user_key.user_uuid && row.project_id == user_key.project_id
            }) {
                Some(row) => {
                    row.total_decayed_usage = result.total_decayed_usage.clone();
                    row.normalized_usage = result.normalized_usage;
                    row.fair_share_factor = result.fair_share_factor;
                    row.updated_at = now;
                }
                None => rows.user.push(UserFairShareRow {
                    resource_group: resource_group.to_string(),
                    user_uuid: user_key.user_uuid,
                    project_id: user_key.project_id,
                    domain_name: project_domains
                        .get(&user_key.project_id)
                        .cloned()
                        .unwrap_or_default(),
                    weight: None,
                    resource_weights: ResourceSlot::new(),
                    total_decayed_usage: result.total_decayed_usage.clone(),
                    normalized_usage: result.normalized_usage,
                    fair_share_factor: result.fair_share_factor,
                    created_at: now,
                    updated_at: now,
                }),
            }
        }

        Ok(())
    }
}

impl Inner {
    fn latest_row_index(&self, session_id: SessionId, step: &str) -> Option<usize> {
        // Explicit latest-open-row lookup; never rely on map ordering.
        self.history
            .iter()
            .rposition(|row| row.session_id == session_id && row.step == step)
    }

    fn push_row(&mut self, session_id: SessionId, step: &str) -> &mut ExecutionHistoryRow {
        let id = self.next_history_id;
        self.next_history_id += 1;
        self.history.push(ExecutionHistoryRow {
            id,
            session_id,
            step: step.to_string(),
            status: StepStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            retry_count: 0,
            last_retry_at: None,
            error_info: None,
            details: serde_json::Value::Null,
        });
        let index = self.history.len() - 1;
        &mut self.history[index]
    }
}

#[async_trait]
impl HistoryStore for MemoryRepository {
    async fn record_step_start(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        match state.latest_row_index(session_id, step) {
            Some(index) => match state.history[index].status {
                // Idempotent re-entry into an already-open step.
                StepStatus::InProgress => {}
                // A failed lineage re-opens as a retry, in place.
                StepStatus::Failure => {
                    let row = &mut state.history[index];
                    row.status = StepStatus::InProgress;
                    row.retry_count += 1;
                    row.last_retry_at = Some(Utc::now());
                    row.finished_at = None;
                }
                // A finished lineage starts a fresh row.
                StepStatus::Success => {
                    state.push_row(session_id, step);
                }
            },
            None => {
                state.push_row(session_id, step);
            }
        }
        Ok(())
    }

    async fn record_step_success(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        match state.latest_row_index(session_id, step) {
            Some(index) => {
                let row = &mut state.history[index];
                row.status = StepStatus::Success;
                row.finished_at = Some(Utc::now());
                row.error_info = None;
            }
            None => {
                let row = state.push_row(session_id, step);
                row.status = StepStatus::Success;
                row.finished_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn record_step_failure(
        &self,
        session_id: SessionId,
        step: &str,
        error_info: ErrorInfo,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        match state.latest_row_index(session_id, step) {
            Some(index) => {
                let row = &mut state.history[index];
                row.status = StepStatus::Failure;
                row.finished_at = Some(Utc::now());
                row.error_info = Some(error_info);
            }
            None => {
                let row = state.push_row(session_id, step);
                row.status = StepStatus::Failure;
                row.finished_at = Some(Utc::now());
                row.error_info = Some(error_info);
            }
        }
        Ok(())
    }

    async fn record_step_retry(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        match state.latest_row_index(session_id, step) {
            Some(index) => {
                let row = &mut state.history[index];
                row.retry_count += 1;
                row.status = StepStatus::InProgress;
                row.last_retry_at = Some(Utc::now());
                row.finished_at = None;
            }
            None => {
                let row = state.push_row(session_id, step);
                row.retry_count = 1;
                row.last_retry_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn merge_step_details(
        &self,
        session_id: SessionId,
        step: &str,
        details: serde_json::Value,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        let Some(index) = state.latest_row_index(session_id, step) else {
            return Ok(());
        };
        let row = &mut state.history[index];
        match (&mut row.details, details) {
            (serde_json::Value::Object(existing), serde_json::Value::Object(incoming)) => {
                for (key, value) in incoming {
                    existing.insert(key, value);
                }
            }
            (slot, incoming) => *slot = incoming,
        }
        Ok(())
    }

    async fn latest_row(
        &self,
        session_id: SessionId,
        step: &str,
    ) -> Result<Option<ExecutionHistoryRow>, SchedulerError> {
        let state = self.state.read().await;
        Ok(state
            .latest_row_index(session_id, step)
            .map(|index| state.history[index].clone()))
    }

    async fn load_rows(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ExecutionHistoryRow>, SchedulerError> {
        Ok(self
            .state
            .read()
            .await
            .history
            .iter()
            .filter(|row| row.session_id == session_id)
            .cloned()
            .collect())
    }
}

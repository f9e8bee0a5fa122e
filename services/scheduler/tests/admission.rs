//! End-to-end admission tests over the in-memory repository.
//!
//! These drive whole ticks: enqueue pending workloads, run the coordinator,
//! and assert on admissions, history rows, and kernel state.

use std::sync::Arc;

use chrono::Utc;
use tern_id::{AccessKey, SessionId};
use tern_resource::ResourceSlot;
use tern_scheduler::coordinator::{CoordinatorArgs, SchedulingCoordinator, STEP_ADMISSION};
use tern_scheduler::errors::SchedulerError;
use tern_scheduler::history::{StepStatus, StepTracker};
use tern_scheduler::kernel::KernelStateEngine;
use tern_scheduler::memory::MemoryRepository;
use tern_scheduler::repository::{HistoryStore, SchedulerRepository};
use tern_scheduler::sequencers::{sequencer_for, SequencerKind};
use tern_scheduler::snapshot::{SessionResult, SessionStatus};
use tern_scheduler::validators::SchedulingValidator;
use tern_scheduler::workload::{KernelRequirement, SessionKind, SessionWorkload};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

fn coordinator(repo: &Arc<MemoryRepository>, kind: SequencerKind) -> SchedulingCoordinator {
    init_tracing();
    SchedulingCoordinator::new(CoordinatorArgs {
        resource_group: "default".to_string(),
        repository: repo.clone(),
        kernel_store: repo.clone(),
        history_store: repo.clone(),
        validator: SchedulingValidator::with_defaults(),
        sequencer: sequencer_for(kind),
        max_scheduling_retries: 2,
        retry_priority_penalty: 1,
        min_priority: -10,
    })
}

fn cpu_workload(access_key: &str, cpu: i64) -> SessionWorkload {
    SessionWorkload {
        session_id: SessionId::new(),
        access_key: AccessKey::from(access_key),
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

#[tokio::test]
async fn test_greedy_walk_admits_until_capacity_runs_out() {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_resource_group("default", ResourceSlot::from([("cpu", 10)]))
        .await;

    let first = cpu_workload("AKIA-1", 4);
    let second = cpu_workload("AKIA-2", 4);
    let third = cpu_workload("AKIA-3", 4);
    repo.enqueue_workload("first", first.clone()).await;
    repo.enqueue_workload("second", second.clone()).await;
    repo.enqueue_workload("third", third.clone()).await;

    let coordinator = coordinator(&repo, SequencerKind::Fifo);
    let stats = coordinator.run_tick().await.unwrap();
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.capacity_skipped, 1);

    assert_eq!(
        repo.session_status(first.session_id).await,
        Some(SessionStatus::Scheduled)
    );
    assert_eq!(
        repo.session_status(second.session_id).await,
        Some(SessionStatus::Scheduled)
    );
    assert_eq!(
        repo.session_status(third.session_id).await,
        Some(SessionStatus::Pending)
    );

    // The third workload carries a capacity-style rejection in history.
    let row = repo
        .latest_row(third.session_id, STEP_ADMISSION)
        .await
        .unwrap()
        .expect("capacity rejection must be recorded");
    assert_eq!(row.status, StepStatus::Failure);
    assert_eq!(
        row.error_info.as_ref().map(|info| info.error_type.as_str()),
        Some("CapacityExceeded")
    );

    // Free the first session's resources and tick again: only the third
    // workload is admitted, the first two are not re-admitted.
    let engine = KernelStateEngine::new(repo.clone());
    for kernel_id in repo.kernel_ids_for_session(first.session_id).await {
        engine
            .mark_terminated(kernel_id, "finished", Some(0))
            .await
            .unwrap();
    }

    let stats = coordinator.run_tick().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.admitted, 1);
    assert_eq!(
        repo.session_status(third.session_id).await,
        Some(SessionStatus::Scheduled)
    );

    // The folded admission row now reads as a successful retry lineage.
    let row = repo
        .latest_row(third.session_id, STEP_ADMISSION)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, StepStatus::Success);
    assert_eq!(row.retry_count, 1);
}

#[tokio::test]
async fn test_unmet_dependency_cancels_instead_of_retrying() {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_resource_group("default", ResourceSlot::from([("cpu", 10)]))
        .await;

    let upstream = cpu_workload("AKIA-UP", 2);
    let downstream = cpu_workload("AKIA-DOWN", 2);
    repo.enqueue_workload("etl", upstream.clone()).await;
    repo.enqueue_workload("train", downstream.clone()).await;
    repo.add_dependency(downstream.session_id, upstream.session_id)
        .await;

    // The upstream session left the queue and then failed permanently.
    repo.cancel_workload(upstream.session_id, "upstream failed")
        .await
        .unwrap();
    repo.set_session_state(
        upstream.session_id,
        SessionStatus::Terminated,
        SessionResult::Failure,
    )
    .await;

    let coordinator = coordinator(&repo, SequencerKind::Fifo);
    let stats = coordinator.run_tick().await.unwrap();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.admitted, 0);

    assert_eq!(
        repo.session_status(downstream.session_id).await,
        Some(SessionStatus::Cancelled)
    );
    let rejection = repo
        .latest_rejection(downstream.session_id)
        .await
        .expect("cancellation reason must be recorded");
    assert!(rejection.contains(&format!("etl ({})", upstream.session_id)));
}

#[tokio::test]
async fn test_satisfied_dependency_admits() {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_resource_group("default", ResourceSlot::from([("cpu", 10)]))
        .await;

    let upstream = cpu_workload("AKIA-UP", 2);
    let downstream = cpu_workload("AKIA-DOWN", 2);
    repo.enqueue_workload("etl", upstream.clone()).await;
    repo.enqueue_workload("train", downstream.clone()).await;
    repo.add_dependency(downstream.session_id, upstream.session_id)
        .await;
    repo.cancel_workload(upstream.session_id, "already done")
        .await
        .unwrap();
    repo.set_session_state(
        upstream.session_id,
        SessionStatus::Terminated,
        SessionResult::Success,
    )
    .await;

    let coordinator = coordinator(&repo, SequencerKind::Fifo);
    let stats = coordinator.run_tick().await.unwrap();
    assert_eq!(stats.admitted, 1);
    assert_eq!(
        repo.session_status(downstream.session_id).await,
        Some(SessionStatus::Scheduled)
    );
}

#[tokio::test]
async fn test_quota_rejections_fold_and_penalize_priority() {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_resource_group("default", ResourceSlot::from([("cpu", 10)]))
        .await;

    let greedy = cpu_workload("AKIA-GREEDY", 8);
    repo.set_keypair_policy(
        greedy.access_key.clone(),
        tern_scheduler::snapshot::KeyPairResourcePolicy {
            name: "tiny".to_string(),
            total_resource_slots: ResourceSlot::from([("cpu", 2)]),
            max_concurrent_sessions: None,
            max_concurrent_sftp_sessions: None,
            max_pending_session_count: None,
            max_pending_session_resource_slots: None,
        },
    )
    .await;
    repo.enqueue_workload("greedy", greedy.clone()).await;

    let coordinator = coordinator(&repo, SequencerKind::Fifo);
    for _ in 0..3 {
        let stats = coordinator.run_tick().await.unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.admitted, 0);
    }

    // Three failing ticks fold into one validation row with two retries.
    let row = repo
        .latest_row(greedy.session_id, "validation")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, StepStatus::Failure);
    assert_eq!(row.retry_count, 2);
    let rows = repo.load_rows(greedy.session_id).await.unwrap();
    assert_eq!(
        rows.iter().filter(|r| r.step == "validation").count(),
        1,
        "retries must fold into a single row"
    );

    // max_scheduling_retries = 2 was reached, so the priority dropped.
    let pending = repo.load_pending_workloads("default").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].priority < 0);

    // The latest rejection stays visible on the pending workload.
    let rejection = repo.latest_rejection(greedy.session_id).await.unwrap();
    assert!(rejection.contains("resource quota"));
}

#[tokio::test]
async fn test_track_step_success_and_failure_rows() {
    let repo = Arc::new(MemoryRepository::new());
    let tracker = StepTracker::new(repo.clone());
    let session_id = SessionId::new();

    let value = tracker
        .track_step(session_id, "launch", || async { Ok::<_, SchedulerError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);

    let rows = repo.load_rows(session_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, StepStatus::Success);
    assert!(rows[0].finished_at.is_some());

    // A failing step records FAILURE with the error's type name, and the
    // error still propagates to the caller.
    let result: Result<i32, SchedulerError> = tracker
        .track_step(session_id, "teardown", || async {
            Err(SchedulerError::Repository("disk on fire".to_string()))
        })
        .await;
    assert!(matches!(result, Err(SchedulerError::Repository(_))));

    let row = repo
        .latest_row(session_id, "teardown")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, StepStatus::Failure);
    let info = row.error_info.expect("failure must carry error info");
    assert_eq!(info.error_type, "Repository");
    assert!(info.message.contains("disk on fire"));

    // Summaries aggregate duration and outcome per step lineage.
    let summaries = tracker.summarize(session_id).await.unwrap();
    assert_eq!(summaries.len(), 2);
    let launch = summaries.iter().find(|s| s.step == "launch").unwrap();
    assert_eq!(launch.status, StepStatus::Success);
    assert!(launch.duration.is_some());
    let teardown = summaries.iter().find(|s| s.step == "teardown").unwrap();
    assert_eq!(teardown.status, StepStatus::Failure);
    assert_eq!(teardown.retry_count, 0);
}

#[tokio::test]
async fn test_fair_share_sequencing_prefers_lower_factor() {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_resource_group("default", ResourceSlot::from([("cpu", 4)]))
        .await;

    let light = cpu_workload("AKIA-LIGHT", 4);
    let heavy = cpu_workload("AKIA-HEAVY", 4);
    repo.enqueue_workload("light", light.clone()).await;
    repo.enqueue_workload("heavy", heavy.clone()).await;

    // Recorded usage gives the heavy user a sub-neutral factor.
    let mut usage = tern_scheduler::fair_share::UsageHistory::default();
    usage.by_user.insert(
        tern_scheduler::fair_share::UserScopeKey {
            user_uuid: heavy.user_uuid,
            project_id: heavy.group_id,
        },
        vec![tern_scheduler::fair_share::UsageBucket {
            period_start: Utc::now().date_naive(),
            usage: ResourceSlot::from([("cpu", 50_000_000)]),
        }],
    );
    repo.set_usage_buckets("default", usage).await;

    let updater = tern_scheduler::fair_share::FairShareUpdater::new(
        repo.clone(),
        tern_scheduler::fair_share::FairShareConfig::default(),
    );
    let stats = updater
        .recompute("default", Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(stats.users, 1);

    // Capacity only fits one admission; ascending factor order puts the
    // heavy scope first and the neutral-factor scope waits.
    let coordinator = coordinator(&repo, SequencerKind::FairShare);
    let stats = coordinator.run_tick().await.unwrap();
    assert_eq!(stats.admitted, 1);
    assert_eq!(
        repo.session_status(heavy.session_id).await,
        Some(SessionStatus::Scheduled)
    );
    assert_eq!(
        repo.session_status(light.session_id).await,
        Some(SessionStatus::Pending)
    );
}

#[tokio::test]
async fn test_lifo_group_admits_newest_first() {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_resource_group("default", ResourceSlot::from([("cpu", 4)]))
        .await;

    let older = cpu_workload("AKIA-OLD", 4);
    repo.enqueue_workload("older", older.clone()).await;
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let newer = cpu_workload("AKIA-NEW", 4);
    repo.enqueue_workload("newer", newer.clone()).await;

    let coordinator = coordinator(&repo, SequencerKind::Lifo);
    let stats = coordinator.run_tick().await.unwrap();
    assert_eq!(stats.admitted, 1);
    assert_eq!(
        repo.session_status(newer.session_id).await,
        Some(SessionStatus::Scheduled)
    );
    assert_eq!(
        repo.session_status(older.session_id).await,
        Some(SessionStatus::Pending)
    );
}

//! # tern-scheduler
//!
//! Session admission-control and scheduling engine for the tern cluster
//! manager. For a continuous stream of pending compute sessions it decides
//! which may be admitted onto available capacity now and in what order,
//! enforcing per-tenant quotas, concurrency ceilings, inter-session
//! dependency ordering, and long-run fairness across users, projects, and
//! domains.
//!
//! ## Architecture
//!
//! - [`snapshot`]: immutable point-in-time cluster/tenant state, built
//!   once per tick as the single read barrier
//! - [`validators`]: pure admission checks yielding typed, user-facing
//!   rejections
//! - [`sequencers`]: pure ordering policies (FIFO, LIFO, fair-share)
//! - [`fair_share`]: periodic decayed-usage recomputation feeding the
//!   fair-share sequencer
//! - [`coordinator`]: the per-group tick (snapshot, validate, sequence,
//!   greedy commit walk)
//! - [`kernel`]: the kernel lifecycle state machine, driven by admission
//!   and by concurrent agent callbacks
//! - [`history`]: execution-history rows with retry folding
//! - [`repository`]: async collaborator traits; [`memory`] implements
//!   them in-process for the dummy backend and tests
//!
//! The engine is a library: the hosting process owns the coordinator map,
//! drives ticks through [`worker::SchedulerWorker`], and routes agent
//! lifecycle events into each coordinator's kernel state engine.

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod fair_share;
pub mod history;
pub mod kernel;
pub mod memory;
pub mod repository;
pub mod sequencers;
pub mod snapshot;
pub mod validators;
pub mod worker;
pub mod workload;

pub use config::SchedulerConfig;
pub use coordinator::{CoordinatorArgs, SchedulingCoordinator, TickStats};
pub use errors::{AdmissionError, CommitError, ErrorInfo, SchedulerError};
pub use kernel::{KernelCreationInfo, KernelStateEngine, KernelStatus};
pub use memory::MemoryRepository;
pub use snapshot::SystemSnapshot;
pub use workload::{KernelSpec, SessionWorkload};

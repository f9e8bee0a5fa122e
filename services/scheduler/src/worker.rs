//! Background tick workers.
//!
//! One worker drives one coordinator: ticks run serially for a resource
//! group, on a fixed interval, until shutdown is signaled. Different groups
//! get their own workers and schedule independently. The hosting process
//! owns the coordinator map explicitly; there is no ambient global registry
//! in the core.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::coordinator::SchedulingCoordinator;

/// Explicit map of active coordinators, owned by the hosting process and
/// passed by handle wherever lifecycle callbacks need routing.
#[derive(Default)]
pub struct CoordinatorRegistry {
    by_group: HashMap<String, Arc<SchedulingCoordinator>>,
}

impl CoordinatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coordinator: Arc<SchedulingCoordinator>) {
        self.by_group
            .insert(coordinator.resource_group().to_string(), coordinator);
    }

    pub fn get(&self, resource_group: &str) -> Option<&Arc<SchedulingCoordinator>> {
        self.by_group.get(resource_group)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.by_group.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_group.is_empty()
    }
}

/// Periodic tick loop for one coordinator.
pub struct SchedulerWorker {
    coordinator: Arc<SchedulingCoordinator>,
    interval: Duration,
}

impl SchedulerWorker {
    pub fn new(coordinator: Arc<SchedulingCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    /// Runs ticks until shutdown is signaled.
    #[instrument(skip(self, shutdown), fields(resource_group = %self.coordinator.resource_group()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting scheduler worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.coordinator.run_tick().await {
                        error!(error = %e, "Scheduling tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

//! Decayed weighted fair-share accounting.
//!
//! Out of the per-tick hot path: a periodic pass aggregates externally
//! produced usage buckets per (resource group, scope), applies half-life
//! decay, normalizes against the group's decayed capacity over the same
//! window, and writes a priority factor per scope. The factor feeds the
//! fair-share sequencer through the tick snapshot.

mod calculator;
mod types;

pub use calculator::{FactorResult, FairShareCalculator, FairShareComputation, FairShareConfig};
pub use types::{
    DomainFairShareRow, FairShareRows, ProjectFairShareRow, UsageBucket, UsageHistory,
    UserFairShareRow, UserScopeKey,
};

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use crate::errors::SchedulerError;
use crate::repository::FairShareStore;

/// Statistics from one fair-share recomputation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FairShareStats {
    pub domains: usize,
    pub projects: usize,
    pub users: usize,
}

/// Drives the periodic recomputation over one resource group.
pub struct FairShareUpdater {
    store: Arc<dyn FairShareStore>,
    calculator: FairShareCalculator,
}

impl FairShareUpdater {
    pub fn new(store: Arc<dyn FairShareStore>, config: FairShareConfig) -> Self {
        Self {
            store,
            calculator: FairShareCalculator::new(config),
        }
    }

    /// Recomputes every scope with recorded usage in the resource group and
    /// upserts the results keyed by (resource group, scope identity).
    #[instrument(skip(self))]
    pub async fn recompute(
        &self,
        resource_group: &str,
        today: NaiveDate,
    ) -> Result<FairShareStats, SchedulerError> {
        let usage = self.store.load_usage_buckets(resource_group).await?;
        let existing = self.store.load_rows(resource_group).await?;
        let capacity = self.store.load_group_capacity(resource_group).await?;

        let computation = self
            .calculator
            .calculate(today, &capacity, &usage, &existing);
        let stats = FairShareStats {
            domains: computation.domain.len(),
            projects: computation.project.len(),
            users: computation.user.len(),
        };

        self.store
            .upsert_factors(resource_group, &computation)
            .await?;

        debug!(
            resource_group,
            domains = stats.domains,
            projects = stats.projects,
            users = stats.users,
            "Fair-share factors recomputed"
        );
        Ok(stats)
    }
}

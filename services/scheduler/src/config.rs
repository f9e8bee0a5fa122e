//! Scheduler configuration.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::fair_share::FairShareConfig;
use crate::sequencers::SequencerKind;

/// Engine-wide settings plus per-resource-group sequencer overrides.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between admission ticks.
    pub tick_interval: Duration,
    /// Sequencer for groups without an explicit override.
    pub default_sequencer: SequencerKind,
    /// Per-resource-group sequencer choice.
    pub sequencer_overrides: HashMap<String, SequencerKind>,
    /// Validation failures tolerated before a workload's priority drops.
    pub max_scheduling_retries: u32,
    pub retry_priority_penalty: i32,
    pub min_priority: i32,
    pub fair_share: FairShareConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            default_sequencer: SequencerKind::Fifo,
            sequencer_overrides: HashMap::new(),
            max_scheduling_retries: 5,
            retry_priority_penalty: 1,
            min_priority: -10,
            fair_share: FairShareConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Loads settings from `TERN_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("TERN_TICK_INTERVAL_SECS") {
            let secs: u64 = raw.parse().context("invalid TERN_TICK_INTERVAL_SECS")?;
            config.tick_interval = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("TERN_DEFAULT_SEQUENCER") {
            config.default_sequencer = raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!("invalid TERN_DEFAULT_SEQUENCER: {e}"))?;
        }
        if let Ok(raw) = std::env::var("TERN_MAX_SCHEDULING_RETRIES") {
            config.max_scheduling_retries =
                raw.parse().context("invalid TERN_MAX_SCHEDULING_RETRIES")?;
        }
        if let Ok(raw) = std::env::var("TERN_FAIR_SHARE_HALF_LIFE") {
            config.fair_share.half_life_units =
                raw.parse().context("invalid TERN_FAIR_SHARE_HALF_LIFE")?;
        }
        if let Ok(raw) = std::env::var("TERN_FAIR_SHARE_LOOKBACK") {
            config.fair_share.lookback_units =
                raw.parse().context("invalid TERN_FAIR_SHARE_LOOKBACK")?;
        }

        Ok(config)
    }

    /// The sequencer a resource group should use.
    pub fn sequencer_for(&self, resource_group: &str) -> SequencerKind {
        self.sequencer_overrides
            .get(resource_group)
            .copied()
            .unwrap_or(self.default_sequencer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(10));
        assert_eq!(config.default_sequencer, SequencerKind::Fifo);
        assert_eq!(config.fair_share.half_life_units, 7);
    }

    #[test]
    fn test_group_override_wins() {
        let mut config = SchedulerConfig::default();
        config
            .sequencer_overrides
            .insert("gpu".to_string(), SequencerKind::FairShare);
        assert_eq!(config.sequencer_for("gpu"), SequencerKind::FairShare);
        assert_eq!(config.sequencer_for("cpu"), SequencerKind::Fifo);
    }
}

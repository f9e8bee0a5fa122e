//! Fair-share factor calculation.
//!
//! The decay formula weights each usage bucket by
//! `0.5 ^ (age_in_decay_units / half_life_in_decay_units)`, age measured
//! from today back to the bucket's period start. The factor formula is
//! `F = 2 ^ (-normalized_usage / weight)`: 1.0 at zero usage, strictly
//! decreasing as normalized usage grows, scaled by the scope's weight so a
//! heavier weight takes a smaller penalty for the same usage.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use tern_id::ProjectId;
use tern_resource::ResourceSlot;

use super::types::{FairShareRows, UsageBucket, UsageHistory, UserScopeKey};

const SECONDS_PER_DAY: i64 = 86_400;

/// Parameters of the decay window and factor curve.
#[derive(Debug, Clone, PartialEq)]
pub struct FairShareConfig {
    /// Half-life of usage, in decay units.
    pub half_life_units: u32,
    /// Days per decay unit (bucket granularity).
    pub decay_unit_days: u32,
    /// How many decay units of history participate.
    pub lookback_units: u32,
    /// Weight for scopes without an explicit one.
    pub default_weight: Decimal,
    /// Per-slot weights for the usage dot product.
    pub resource_weights: ResourceSlot,
}

impl Default for FairShareConfig {
    fn default() -> Self {
        let mut resource_weights = ResourceSlot::new();
        resource_weights.insert("cpu".into(), Decimal::ONE);
        // Memory is accounted in bytes, so it gets a much smaller weight.
        resource_weights.insert("mem".into(), Decimal::new(1, 3));
        resource_weights.insert("cuda.device".into(), Decimal::from(10));
        resource_weights.insert("cuda.shares".into(), Decimal::from(10));
        Self {
            half_life_units: 7,
            decay_unit_days: 1,
            lookback_units: 28,
            default_weight: Decimal::ONE,
            resource_weights,
        }
    }
}

/// Computed factor state for one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorResult {
    pub total_decayed_usage: ResourceSlot,
    pub normalized_usage: Decimal,
    pub fair_share_factor: Decimal,
}

/// Results of one recomputation across all scope levels.
#[derive(Debug, Clone, Default)]
pub struct FairShareComputation {
    pub domain: HashMap<String, FactorResult>,
    pub project: HashMap<ProjectId, FactorResult>,
    pub user: HashMap<UserScopeKey, FactorResult>,
}

/// Pure factor calculator; no I/O, no clock access.
pub struct FairShareCalculator {
    config: FairShareConfig,
}

impl FairShareCalculator {
    pub fn new(config: FairShareConfig) -> Self {
        Self { config }
    }

    /// Computes factors for every scope with usage buckets.
    ///
    /// `existing` rows contribute per-scope weight and resource-weight
    /// overrides; scopes without a row use the config defaults.
    pub fn calculate(
        &self,
        today: NaiveDate,
        total_capacity: &ResourceSlot,
        usage: &UsageHistory,
        existing: &FairShareRows,
    ) -> FairShareComputation {
        let mut result = FairShareComputation::default();

        for (domain_name, buckets) in &usage.by_domain {
            let weight = existing
                .domain_weight(domain_name)
                .unwrap_or(self.config.default_weight);
            let weights = existing
                .domain_resource_weights(domain_name)
                .unwrap_or(&self.config.resource_weights);
            result.domain.insert(
                domain_name.clone(),
                self.scope_result(buckets, today, total_capacity, weight, weights),
            );
        }

        for (project_id, buckets) in &usage.by_project {
            let weight = existing
                .project_weight(project_id)
                .unwrap_or(self.config.default_weight);
            let weights = existing
                .project_resource_weights(project_id)
                .unwrap_or(&self.config.resource_weights);
            result.project.insert(
                *project_id,
                self.scope_result(buckets, today, total_capacity, weight, weights),
            );
        }

        for (user_key, buckets) in &usage.by_user {
            let weight = existing
                .user_weight(user_key)
                .unwrap_or(self.config.default_weight);
            let weights = existing
                .user_resource_weights(user_key)
                .unwrap_or(&self.config.resource_weights);
            result.user.insert(
                *user_key,
                self.scope_result(buckets, today, total_capacity, weight, weights),
            );
        }

        result
    }

    fn scope_result(
        &self,
        buckets: &[UsageBucket],
        today: NaiveDate,
        total_capacity: &ResourceSlot,
        weight: Decimal,
        resource_weights: &ResourceSlot,
    ) -> FactorResult {
        let total_decayed_usage = self.decayed_usage(buckets, today);
        let normalized_usage =
            self.normalized_usage(&total_decayed_usage, total_capacity, resource_weights);
        let fair_share_factor = self.factor(normalized_usage, weight);
        FactorResult {
            total_decayed_usage,
            normalized_usage,
            fair_share_factor,
        }
    }

    /// Sums usage buckets with half-life decay applied per bucket age.
    fn decayed_usage(&self, buckets: &[UsageBucket], today: NaiveDate) -> ResourceSlot {
        let mut total = ResourceSlot::new();
        for bucket in buckets {
            let age_days = (today - bucket.period_start).num_days();
            if age_days < 0 {
                // A future-dated bucket carries no decay.
                total += &bucket.usage;
                continue;
            }
            let age_units = age_days / i64::from(self.config.decay_unit_days.max(1));
            if age_units >= i64::from(self.config.lookback_units) {
                continue;
            }
            total += bucket.usage.scale(self.decay_factor(age_units));
        }
        total
    }

    /// Weighted decayed usage over the group's decayed capacity for the
    /// same window, as one dimensionless scalar.
    fn normalized_usage(
        &self,
        decayed_usage: &ResourceSlot,
        total_capacity: &ResourceSlot,
        resource_weights: &ResourceSlot,
    ) -> Decimal {
        let usage_score = decayed_usage.weighted_sum(resource_weights, self.config.default_weight);
        let capacity_score = self.decayed_window_capacity(total_capacity, resource_weights);
        if capacity_score <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        usage_score / capacity_score
    }

    /// Capacity resource-seconds over the lookback window, each unit decayed
    /// exactly like the usage it normalizes.
    fn decayed_window_capacity(
        &self,
        total_capacity: &ResourceSlot,
        resource_weights: &ResourceSlot,
    ) -> Decimal {
        let per_unit = total_capacity.weighted_sum(resource_weights, self.config.default_weight)
            * Decimal::from(SECONDS_PER_DAY * i64::from(self.config.decay_unit_days.max(1)));
        (0..i64::from(self.config.lookback_units))
            .map(|age| per_unit * self.decay_factor(age))
            .sum()
    }

    /// `0.5 ^ (age / half_life)` as a decimal.
    fn decay_factor(&self, age_units: i64) -> Decimal {
        let half_life = f64::from(self.config.half_life_units.max(1));
        let exponent = -(age_units as f64) / half_life;
        pow2(exponent.max(-64.0))
    }

    /// `2 ^ (-normalized / weight)`, clamped into (0, 1].
    fn factor(&self, normalized_usage: Decimal, weight: Decimal) -> Decimal {
        let weight = if weight > Decimal::ZERO {
            weight
        } else {
            self.config.default_weight
        };
        let exponent = (-normalized_usage / weight)
            .clamp(Decimal::from(-10), Decimal::from(10))
            .to_f64()
            .unwrap_or(0.0);
        pow2(exponent).clamp(Decimal::ZERO, Decimal::ONE)
    }
}

fn pow2(exponent: f64) -> Decimal {
    Decimal::from_f64(exponent.exp2()).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset_back: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap() - chrono::Duration::days(offset_back)
    }

    fn cpu_seconds(amount: i64) -> ResourceSlot {
        ResourceSlot::from([("cpu", amount)])
    }

    fn calculator() -> FairShareCalculator {
        FairShareCalculator::new(FairShareConfig::default())
    }

    fn capacity() -> ResourceSlot {
        ResourceSlot::from([("cpu", 100)])
    }

    fn factor_for_usage(cpu_secs: i64, days_back: i64) -> Decimal {
        let mut usage = UsageHistory::default();
        usage.by_domain.insert(
            "default".to_string(),
            vec![UsageBucket {
                period_start: day(days_back),
                usage: cpu_seconds(cpu_secs),
            }],
        );
        let computation = calculator().calculate(
            day(0),
            &capacity(),
            &usage,
            &FairShareRows::default(),
        );
        computation.domain["default"].fair_share_factor
    }

    #[test]
    fn test_zero_usage_yields_neutral_factor() {
        assert_eq!(factor_for_usage(0, 0), Decimal::ONE);
    }

    #[test]
    fn test_factor_strictly_decreases_with_usage() {
        let light = factor_for_usage(100_000, 0);
        let heavy = factor_for_usage(10_000_000, 0);
        assert!(light <= Decimal::ONE);
        assert!(light > Decimal::ZERO);
        assert!(heavy < light, "heavier usage must get a smaller factor");
    }

    #[test]
    fn test_factor_stays_in_unit_interval() {
        let extreme = factor_for_usage(i64::MAX / 4, 0);
        assert!(extreme > Decimal::ZERO);
        assert!(extreme <= Decimal::ONE);
    }

    #[test]
    fn test_older_usage_decays() {
        // Same usage amount, different ages: older usage should penalize
        // less, giving a larger factor.
        let recent = factor_for_usage(10_000_000, 0);
        let old = factor_for_usage(10_000_000, 21);
        assert!(old > recent);
    }

    #[test]
    fn test_usage_outside_lookback_is_ignored() {
        let ancient = factor_for_usage(10_000_000, 400);
        assert_eq!(ancient, Decimal::ONE);
    }

    #[test]
    fn test_half_life_decay_is_half_at_half_life() {
        let calc = calculator();
        let at_half_life = calc.decay_factor(7);
        // 0.5 within rounding of the f64 conversion.
        let diff = (at_half_life - Decimal::new(5, 1)).abs();
        assert!(diff < Decimal::new(1, 6), "expected ~0.5, got {at_half_life}");
    }

    #[test]
    fn test_heavier_weight_takes_smaller_penalty() {
        let mut usage = UsageHistory::default();
        usage.by_domain.insert(
            "weighted".to_string(),
            vec![UsageBucket {
                period_start: day(0),
                usage: cpu_seconds(10_000_000),
            }],
        );
        let mut rows = FairShareRows::default();
        rows.domain
            .push(domain_row_with_weight("weighted", Decimal::from(4)));

        let with_weight = calculator()
            .calculate(day(0), &capacity(), &usage, &rows)
            .domain["weighted"]
            .fair_share_factor;
        let without_weight = calculator()
            .calculate(day(0), &capacity(), &usage, &FairShareRows::default())
            .domain["weighted"]
            .fair_share_factor;
        assert!(with_weight > without_weight);
    }

    #[test]
    fn test_user_scope_keyed_per_project() {
        let user = uuid::Uuid::new_v4();
        let project_a = uuid::Uuid::new_v4();
        let project_b = uuid::Uuid::new_v4();

        let mut usage = UsageHistory::default();
        usage.by_user.insert(
            UserScopeKey {
                user_uuid: user,
                project_id: project_a,
            },
            vec![UsageBucket {
                period_start: day(0),
                usage: cpu_seconds(10_000_000),
            }],
        );
        usage.by_user.insert(
            UserScopeKey {
                user_uuid: user,
                project_id: project_b,
            },
            vec![UsageBucket {
                period_start: day(0),
                usage: cpu_seconds(100),
            }],
        );

        let computation =
            calculator().calculate(day(0), &capacity(), &usage, &FairShareRows::default());
        let heavy = &computation.user[&UserScopeKey {
            user_uuid: user,
            project_id: project_a,
        }];
        let light = &computation.user[&UserScopeKey {
            user_uuid: user,
            project_id: project_b,
        }];
        assert!(heavy.fair_share_factor < light.fair_share_factor);
    }

    fn domain_row_with_weight(
        domain: &str,
        weight: Decimal,
    ) -> super::super::types::DomainFairShareRow {
        super::super::types::DomainFairShareRow {
            resource_group: "default".to_string(),
            domain_name: domain.to_string(),
            weight: Some(weight),
            resource_weights: ResourceSlot::new(),
            total_decayed_usage: ResourceSlot::new(),
            normalized_usage: Decimal::ZERO,
            fair_share_factor: Decimal::ONE,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}

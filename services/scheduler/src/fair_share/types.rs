//! Fair-share rows and usage-bucket inputs.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tern_id::{ProjectId, UserId};
use tern_resource::ResourceSlot;

/// One period of recorded resource usage for a scope.
///
/// Usage is measured in resource-seconds, bucketed at the configured decay
/// unit granularity; `period_start` is the first day of the bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBucket {
    pub period_start: NaiveDate,
    pub usage: ResourceSlot,
}

/// Identity of a user's fair-share scope: users are tracked per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserScopeKey {
    pub user_uuid: UserId,
    pub project_id: ProjectId,
}

/// Externally produced usage buckets grouped per scope level.
#[derive(Debug, Clone, Default)]
pub struct UsageHistory {
    pub by_domain: HashMap<String, Vec<UsageBucket>>,
    pub by_project: HashMap<ProjectId, Vec<UsageBucket>>,
    pub by_user: HashMap<UserScopeKey, Vec<UsageBucket>>,
}

/// Per-domain fair-share state for one resource group.
///
/// Created on a scope's first participation in a resource group, updated by
/// the periodic recomputation. `weight` of `None` means the group default;
/// empty `resource_weights` mean the group default table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainFairShareRow {
    pub resource_group: String,
    pub domain_name: String,
    pub weight: Option<Decimal>,
    pub resource_weights: ResourceSlot,
    pub total_decayed_usage: ResourceSlot,
    pub normalized_usage: Decimal,
    pub fair_share_factor: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-project fair-share state for one resource group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFairShareRow {
    pub resource_group: String,
    pub project_id: ProjectId,
    pub domain_name: String,
    pub weight: Option<Decimal>,
    pub resource_weights: ResourceSlot,
    pub total_decayed_usage: ResourceSlot,
    pub normalized_usage: Decimal,
    pub fair_share_factor: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user (within a project) fair-share state for one resource group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFairShareRow {
    pub resource_group: String,
    pub user_uuid: UserId,
    pub project_id: ProjectId,
    pub domain_name: String,
    pub weight: Option<Decimal>,
    pub resource_weights: ResourceSlot,
    pub total_decayed_usage: ResourceSlot,
    pub normalized_usage: Decimal,
    pub fair_share_factor: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every fair-share row of one resource group, as loaded for recomputation.
#[derive(Debug, Clone, Default)]
pub struct FairShareRows {
    pub domain: Vec<DomainFairShareRow>,
    pub project: Vec<ProjectFairShareRow>,
    pub user: Vec<UserFairShareRow>,
}

impl FairShareRows {
    pub fn domain_weight(&self, domain_name: &str) -> Option<Decimal> {
        self.domain
            .iter()
            .find(|row| row.domain_name == domain_name)
            .and_then(|row| row.weight)
    }

    pub fn project_weight(&self, project_id: &ProjectId) -> Option<Decimal> {
        self.project
            .iter()
            .find(|row| &row.project_id == project_id)
            .and_then(|row| row.weight)
    }

    pub fn user_weight(&self, key: &UserScopeKey) -> Option<Decimal> {
        self.user
            .iter()
            .find(|row| row.user_uuid == key.user_uuid && row.project_id == key.project_id)
            .and_then(|row| row.weight)
    }

    pub fn domain_resource_weights(&self, domain_name: &str) -> Option<&ResourceSlot> {
        self.domain
            .iter()
            .find(|row| row.domain_name == domain_name)
            .map(|row| &row.resource_weights)
            .filter(|weights| !weights.is_zero())
    }

    pub fn project_resource_weights(&self, project_id: &ProjectId) -> Option<&ResourceSlot> {
        self.project
            .iter()
            .find(|row| &row.project_id == project_id)
            .map(|row| &row.resource_weights)
            .filter(|weights| !weights.is_zero())
    }

    pub fn user_resource_weights(&self, key: &UserScopeKey) -> Option<&ResourceSlot> {
        self.user
            .iter()
            .find(|row| row.user_uuid == key.user_uuid && row.project_id == key.project_id)
            .map(|row| &row.resource_weights)
            .filter(|weights| !weights.is_zero())
    }
}

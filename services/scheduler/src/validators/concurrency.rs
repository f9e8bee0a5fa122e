//! Concurrency and pending-queue ceiling validators.

use tern_resource::UnspecifiedLimit;

use crate::errors::{AdmissionError, PendingLimitExceeded};
use crate::snapshot::SystemSnapshot;
use crate::workload::SessionWorkload;

use super::WorkloadValidator;

/// Active session count must stay below the keypair policy ceiling.
///
/// Private sessions are counted against `max_concurrent_sftp_sessions`;
/// everything else against `max_concurrent_sessions`. A missing policy or
/// a missing ceiling means unlimited.
pub struct ConcurrencyValidator;

impl WorkloadValidator for ConcurrencyValidator {
    fn name(&self) -> &'static str {
        "concurrency"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let Some(policy) = snapshot
            .resource_policies
            .keypair_policies
            .get(&workload.access_key)
        else {
            return Ok(());
        };

        let private = workload.kind.is_private();
        let (active, limit) = if private {
            (
                snapshot
                    .concurrency
                    .sftp_sessions_by_keypair
                    .get(&workload.access_key)
                    .copied()
                    .unwrap_or(0),
                policy.max_concurrent_sftp_sessions,
            )
        } else {
            (
                snapshot
                    .concurrency
                    .sessions_by_keypair
                    .get(&workload.access_key)
                    .copied()
                    .unwrap_or(0),
                policy.max_concurrent_sessions,
            )
        };

        match limit {
            Some(limit) if active >= limit => Err(AdmissionError::ConcurrencyLimitExceeded {
                access_key: workload.access_key.clone(),
                active,
                limit,
                private,
            }),
            _ => Ok(()),
        }
    }
}

/// Pending-queue ceilings: how many sessions a keypair may keep queued and
/// how many resources the queue may sum to. The candidate itself is part of
/// the pending snapshot.
pub struct PendingSessionCountValidator;

impl WorkloadValidator for PendingSessionCountValidator {
    fn name(&self) -> &'static str {
        "pending_session_limit"
    }

    fn validate(
        &self,
        snapshot: &SystemSnapshot,
        workload: &SessionWorkload,
    ) -> Result<(), AdmissionError> {
        let Some(policy) = snapshot
            .resource_policies
            .keypair_policies
            .get(&workload.access_key)
        else {
            return Ok(());
        };

        let pending = snapshot
            .pending_sessions
            .by_keypair
            .get(&workload.access_key)
            .cloned()
            .unwrap_or_default();

        if let Some(limit) = policy.max_pending_session_count {
            if pending.count > limit {
                return Err(AdmissionError::PendingSessionLimitExceeded(
                    PendingLimitExceeded::Count {
                        pending: pending.count,
                        limit,
                    },
                ));
            }
        }

        if let Some(limit) = &policy.max_pending_session_resource_slots {
            pending
                .total_slots
                .fits_in(limit, UnspecifiedLimit::Unlimited)
                .map_err(|shortage| {
                    AdmissionError::PendingSessionLimitExceeded(PendingLimitExceeded::Resources(
                        shortage,
                    ))
                })?;
        }

        Ok(())
    }
}

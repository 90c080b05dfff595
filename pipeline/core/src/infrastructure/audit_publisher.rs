// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory audit publisher.
//!
//! Stands in for the pull-request automation that externalizes audit changes
//! to the version-controlled registry. Enforces the same allow-list rule the
//! real publisher must: an update only advances a cycle whose current outcome
//! is in the caller-supplied set.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::domain::audit::{AuditCycle, AuditOutcome};
use crate::domain::repository::{AuditChange, AuditPublication, AuditPublisher, PublishError};

#[derive(Clone, Default)]
pub struct InMemoryAuditPublisher {
    cycles: Arc<Mutex<HashMap<String, AuditCycle>>>,
    counter: Arc<Mutex<u64>>,
}

impl InMemoryAuditPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The in-flight cycle for `audit_key`, if any.
    pub fn current_cycle(&self, audit_key: &str) -> Option<AuditCycle> {
        self.cycles
            .lock()
            .ok()
            .and_then(|cycles| cycles.get(audit_key).cloned())
    }

    fn next_ref(&self) -> Result<String, PublishError> {
        let mut counter = self
            .counter
            .lock()
            .map_err(|_| PublishError::Backend("Mutex poisoned".to_string()))?;
        *counter += 1;
        Ok(format!("audit-pr-{}", *counter))
    }
}

#[async_trait]
impl AuditPublisher for InMemoryAuditPublisher {
    async fn new_audit(&self, audit_key: &str) -> Result<AuditPublication, PublishError> {
        let started = Utc::now();
        let cycle = AuditCycle::open(started, 0.0);

        let mut cycles = self
            .cycles
            .lock()
            .map_err(|_| PublishError::Backend("Mutex poisoned".to_string()))?;
        cycles.insert(audit_key.to_string(), cycle);

        debug!(audit_key, "opened new audit cycle");
        Ok(AuditPublication {
            change: AuditChange {
                started: Some(started),
                outcome: Some(AuditOutcome::Pending),
                ..AuditChange::default()
            },
            external_ref: self.next_ref()?,
        })
    }

    async fn update_audit(
        &self,
        audit_key: &str,
        change: AuditChange,
        allowed_prior: &[AuditOutcome],
    ) -> Result<AuditPublication, PublishError> {
        let mut cycles = self
            .cycles
            .lock()
            .map_err(|_| PublishError::Backend("Mutex poisoned".to_string()))?;
        let cycle = cycles
            .get_mut(audit_key)
            .ok_or_else(|| PublishError::UnknownAuditKey(audit_key.to_string()))?;

        if !allowed_prior.contains(&cycle.outcome) {
            return Err(PublishError::OutcomeNotAllowed {
                current: cycle.outcome,
            });
        }

        if let Some(started) = change.started {
            cycle.started = started;
        }
        if change.ended.is_some() {
            cycle.ended = change.ended;
        }
        if change.dc_allocated.is_some() {
            cycle.dc_allocated = change.dc_allocated;
        }
        if let Some(outcome) = change.outcome {
            cycle.outcome = outcome;
        }
        if let Some(amount) = change.datacap_amount {
            cycle.datacap_amount = amount;
        }

        debug!(audit_key, outcome = ?cycle.outcome, "advanced audit cycle");
        let external_ref = self.next_ref()?;
        Ok(AuditPublication {
            change,
            external_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_outside_the_allow_list_is_rejected() {
        let publisher = InMemoryAuditPublisher::new();
        publisher.new_audit("rec-1").await.unwrap();

        // Advance Pending -> Rejected.
        publisher
            .update_audit(
                "rec-1",
                AuditChange {
                    outcome: Some(AuditOutcome::Rejected),
                    ..AuditChange::default()
                },
                &[AuditOutcome::Pending],
            )
            .await
            .unwrap();

        // A rejected cycle may not advance from a Pending/Approved allow-list.
        let result = publisher
            .update_audit(
                "rec-1",
                AuditChange {
                    outcome: Some(AuditOutcome::Match),
                    ..AuditChange::default()
                },
                &[AuditOutcome::Pending, AuditOutcome::Approved],
            )
            .await;
        assert!(matches!(
            result,
            Err(PublishError::OutcomeNotAllowed {
                current: AuditOutcome::Rejected
            })
        ));
    }

    #[tokio::test]
    async fn poisoned_counter_maps_to_a_backend_error() {
        let publisher = InMemoryAuditPublisher::new();
        publisher.new_audit("rec-1").await.unwrap();

        let counter = publisher.counter.clone();
        let _ = std::thread::spawn(move || {
            let _guard = counter.lock().unwrap();
            panic!("poison the counter");
        })
        .join();

        let result = publisher
            .update_audit(
                "rec-1",
                AuditChange::default(),
                &[AuditOutcome::Pending],
            )
            .await;
        assert!(matches!(result, Err(PublishError::Backend(_))));
    }

    #[tokio::test]
    async fn unknown_key_is_an_error() {
        let publisher = InMemoryAuditPublisher::new();
        let result = publisher
            .update_audit("missing", AuditChange::default(), &[AuditOutcome::Pending])
            .await;
        assert!(matches!(result, Err(PublishError::UnknownAuditKey(_))));
    }
}

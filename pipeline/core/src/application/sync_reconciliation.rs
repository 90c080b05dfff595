// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Upsert/reconciliation strategy for external sync signals.
//!
//! When an issue/audit sync signal arrives for an external key, decide
//! whether it represents a brand-new audit cycle or an update to an in-flight
//! one. The guards here are what prevent two concurrent audit cycles from
//! being opened for the same underlying allocator.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::domain::repository::{AllocatorRecord, AuditSyncSource, SyncSourceError};

/// The action a sync signal maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertStrategy {
    /// The signal targets an existing record: overwrite its fields, do not
    /// open a new audit cycle.
    Overwrite { record: AllocatorRecord },
    /// No record exists for the external id and no audit is pending: start a
    /// new audit cycle.
    StartNewAudit,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Record for issue {0} is already finished; cannot reopen a closed cycle")]
    AlreadyFinished(u64),

    #[error("A pending audit cycle already exists for audit key {0}")]
    PendingAuditExists(String),

    #[error("Cannot resolve an upsert strategy for issue {issue_number}, audit key {audit_key}")]
    CannotResolve { issue_number: u64, audit_key: String },

    #[error(transparent)]
    Source(#[from] SyncSourceError),
}

/// Resolves the upsert strategy for one external sync signal.
pub struct AuditSyncReconciler {
    source: Arc<dyn AuditSyncSource>,
}

#[async_trait]
pub trait SyncReconciliation: Send + Sync {
    async fn resolve(
        &self,
        issue_number: u64,
        audit_key: &str,
    ) -> Result<UpsertStrategy, ReconcileError>;
}

impl AuditSyncReconciler {
    pub fn new(source: Arc<dyn AuditSyncSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SyncReconciliation for AuditSyncReconciler {
    /// Decide how to apply a sync signal for `(issue_number, audit_key)`.
    ///
    /// Looks up (a) the record keyed by the external issue number and (b) the
    /// record holding the most recent audit cycle for the audit key, then:
    ///
    /// - errors if (a) is already finished — a closed cycle cannot reopen;
    /// - overwrites when both lookups name the same record, or when (a)
    ///   exists and no audit is pending anywhere;
    /// - errors if a pending audit exists on an unrelated record — no second
    ///   concurrent cycle for the same key;
    /// - starts a new audit when neither lookup finds a record;
    /// - errors as unresolvable when the audit key's history lives on a
    ///   record not keyed by this external id: overwriting has no target and
    ///   starting a fresh cycle would fork the key's history.
    async fn resolve(
        &self,
        issue_number: u64,
        audit_key: &str,
    ) -> Result<UpsertStrategy, ReconcileError> {
        let by_external = self
            .source
            .find_by("issue_number", &issue_number.to_string())
            .await?;
        let by_audit = self
            .source
            .find_with_latest_audit_by("audit_key", audit_key)
            .await?;

        if let Some(record) = &by_external {
            if record.is_finished() {
                return Err(ReconcileError::AlreadyFinished(issue_number));
            }
        }

        let same_record = matches!(
            (&by_external, &by_audit),
            (Some(a), Some(b)) if a.id == b.id
        );
        let pending_elsewhere = by_audit
            .as_ref()
            .map(AllocatorRecord::has_pending_audit)
            .unwrap_or(false);

        if same_record {
            debug!(issue_number, audit_key, "sync targets the in-flight record");
            let record = by_external.expect("same_record implies presence");
            return Ok(UpsertStrategy::Overwrite { record });
        }

        if pending_elsewhere {
            return Err(ReconcileError::PendingAuditExists(audit_key.to_string()));
        }

        match (by_external, by_audit) {
            (Some(record), _) => Ok(UpsertStrategy::Overwrite { record }),
            (None, None) => {
                debug!(issue_number, audit_key, "starting a new audit cycle");
                Ok(UpsertStrategy::StartNewAudit)
            }
            (None, Some(_)) => Err(ReconcileError::CannotResolve {
                issue_number,
                audit_key: audit_key.to_string(),
            }),
        }
    }
}

// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Collaborator Contracts
//!
//! Persistence and publication seams consumed by the core, one contract per
//! concern, implemented in `crate::infrastructure`:
//!
//! | Trait | Concern | Implementation |
//! |-------|---------|----------------|
//! | `ApplicationEventStore` | append-only event log | `InMemoryEventStore` |
//! | `AuditPublisher` | externalizing audit changes to the registry | `InMemoryAuditPublisher` |
//! | `AuditSyncSource` | read-model lookups for sync reconciliation | `InMemoryAuditSyncSource` |
//!
//! The aggregate itself never performs I/O; transient failures belong
//! entirely to these collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::application::{Application, ApplicationId};
use crate::domain::audit::{AuditCycle, AuditOutcome};
use crate::domain::events::ApplicationEvent;

/// Optimistic-concurrency expectation for [`ApplicationEventStore::save`].
///
/// Services in this pipeline save with `Any` on purpose: command ingestion
/// is polling-based with at-least-once redelivery, and per-aggregate
/// serialization is the caller's responsibility, so last-writer-wins on the
/// log is the accepted trade-off. `Exact` remains available for callers that
/// do serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("Version conflict for {aggregate_id}: expected {expected}, stored {stored}")]
    VersionConflict {
        aggregate_id: ApplicationId,
        expected: u64,
        stored: u64,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Append-only event log, one stream per aggregate id.
#[async_trait]
pub trait ApplicationEventStore: Send + Sync {
    /// Load the ordered event stream for `id`. An unknown id yields an empty
    /// stream.
    async fn load(&self, id: ApplicationId) -> Result<Vec<ApplicationEvent>, EventStoreError>;

    /// Drain the aggregate's pending events and append them to its stream.
    /// Returns the events persisted, in order, for publication.
    async fn save(
        &self,
        application: &mut Application,
        expected: ExpectedVersion,
    ) -> Result<Vec<ApplicationEvent>, EventStoreError>;
}

/// A change to one audit cycle, as published to the external registry.
/// Unset fields are left untouched by the publisher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditChange {
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub dc_allocated: Option<DateTime<Utc>>,
    pub outcome: Option<AuditOutcome>,
    pub datacap_amount: Option<f64>,
}

/// Result of externalizing an audit change: the change as applied plus a
/// reference to the published artifact (pull request, issue, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPublication {
    pub change: AuditChange,
    pub external_ref: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The cycle's current outcome is outside the caller-supplied allow-list;
    /// nothing was published.
    #[error("Audit outcome {current:?} may not be advanced from here")]
    OutcomeNotAllowed { current: AuditOutcome },

    #[error("No audit record for key {0}")]
    UnknownAuditKey(String),

    #[error("Publisher backend error: {0}")]
    Backend(String),
}

/// Externalizes audit-cycle changes to the version-controlled registry.
#[async_trait]
pub trait AuditPublisher: Send + Sync {
    /// Open a brand-new audit cycle for `audit_key`.
    async fn new_audit(&self, audit_key: &str) -> Result<AuditPublication, PublishError>;

    /// Advance the in-flight cycle for `audit_key`. Must reject with
    /// [`PublishError::OutcomeNotAllowed`] when the cycle's current outcome
    /// is not in `allowed_prior`, so only specific prior states may advance.
    async fn update_audit(
        &self,
        audit_key: &str,
        change: AuditChange,
        allowed_prior: &[AuditOutcome],
    ) -> Result<AuditPublication, PublishError>;
}

/// Lifecycle of an allocator read-model record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Active,
    Finished,
}

/// Read-model document reconciled against external sync signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorRecord {
    pub id: Uuid,
    /// External key: the tracking issue number.
    pub issue_number: u64,
    /// Internal audit key shared by all cycles of one allocator.
    pub audit_key: String,
    pub status: RecordStatus,
    pub audit_cycles: Vec<AuditCycle>,
}

impl AllocatorRecord {
    pub fn is_finished(&self) -> bool {
        self.status == RecordStatus::Finished
    }

    /// Whether the most recent audit cycle is still pending.
    pub fn has_pending_audit(&self) -> bool {
        self.audit_cycles
            .last()
            .map(AuditCycle::is_pending)
            .unwrap_or(false)
    }

    pub fn latest_audit(&self) -> Option<&AuditCycle> {
        self.audit_cycles.last()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncSourceError {
    #[error("Sync source error: {0}")]
    Backend(String),
}

/// Read-model lookups backing the sync reconciliation strategy.
#[async_trait]
pub trait AuditSyncSource: Send + Sync {
    /// Find the record whose field `key` equals `value`.
    async fn find_by(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<AllocatorRecord>, SyncSourceError>;

    /// Find the record holding the most recent audit cycle for the audit
    /// key identified by `(key, value)`.
    async fn find_with_latest_audit_by(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<AllocatorRecord>, SyncSourceError>;
}

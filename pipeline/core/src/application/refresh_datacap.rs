// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Refresh DataCap Use Case
//!
//! Orchestrates the recurring refresh/audit cycle once capital is allocated.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Drive the aggregate through `request_datacap_refresh`
//!   → externalize the doubled request → `begin_refresh_review`, and classify
//!   closing audit cycles for publication.
//! - **Collaborators:**
//!   - Domain: `Application` aggregate, `AuditOutcomeResolver`
//!   - Infrastructure: `ApplicationEventStore`, `AuditPublisher`, `EventBus`

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::application::{Application, ApplicationId};
use crate::domain::audit::{AuditCycle, AuditOutcome, AuditOutcomeResolver};
use crate::domain::events::EventSource;
use crate::domain::repository::{
    ApplicationEventStore, AuditChange, AuditPublisher, ExpectedVersion,
};
use crate::infrastructure::event_bus::EventBus;

/// Prior outcomes allowed to advance when a closing audit is published.
const ADVANCEABLE_OUTCOMES: [AuditOutcome; 2] =
    [AuditOutcome::Pending, AuditOutcome::Approved];

/// Refresh/audit workflow over one application.
#[async_trait]
pub trait RefreshDatacapUseCase: Send + Sync {
    /// Open a refresh: doubles the allocated instruction, publishes the new
    /// audit cycle, and re-enters governance review.
    ///
    /// # Errors
    ///
    /// - Phase violation when the application is not in `DcAllocated`
    /// - Publisher failure when the audit cycle cannot be externalized
    async fn request_refresh(&self, id: ApplicationId, audit_key: &str) -> Result<()>;

    /// Classify a completed audit cycle against its predecessor and publish
    /// the outcome. Only cycles whose current outcome is `Pending` or
    /// `Approved` may be advanced.
    async fn finalize_audit(
        &self,
        audit_key: &str,
        completed: AuditCycle,
        previous: Option<AuditCycle>,
    ) -> Result<AuditOutcome>;
}

pub struct StandardRefreshDatacapService {
    event_store: Arc<dyn ApplicationEventStore>,
    publisher: Arc<dyn AuditPublisher>,
    event_bus: Arc<EventBus>,
}

impl StandardRefreshDatacapService {
    pub fn new(
        event_store: Arc<dyn ApplicationEventStore>,
        publisher: Arc<dyn AuditPublisher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            event_store,
            publisher,
            event_bus,
        }
    }
}

#[async_trait]
impl RefreshDatacapUseCase for StandardRefreshDatacapService {
    async fn request_refresh(&self, id: ApplicationId, audit_key: &str) -> Result<()> {
        // Step 1: Rebuild the aggregate from its log
        let log = self
            .event_store
            .load(id)
            .await
            .context("Failed to load application event stream")?;
        let mut application = Application::from_events(id, log);

        // Step 2: Guarded command — doubles the last instruction
        application.request_datacap_refresh(EventSource::RefreshAutomation)?;

        // Persist before publishing so a publisher failure never loses the
        // refresh request. ExpectedVersion::Any: per-aggregate serialization
        // is owned by the polling layer (see repository docs).
        let mut recorded = self
            .event_store
            .save(&mut application, ExpectedVersion::Any)
            .await
            .context("Failed to persist refresh request")?;

        // Step 3: Externalize the doubled request as a fresh audit cycle
        let publication = self
            .publisher
            .new_audit(audit_key)
            .await
            .context("Failed to publish new audit cycle")?;
        info!(
            application_id = %id,
            external_ref = %publication.external_ref,
            "refresh audit cycle published"
        );

        // Step 4: Back into governance review for the doubled amount
        application.begin_refresh_review(EventSource::RefreshAutomation)?;
        recorded.extend(
            self.event_store
                .save(&mut application, ExpectedVersion::Any)
                .await
                .context("Failed to persist review re-entry")?,
        );

        for event in recorded {
            self.event_bus.publish(event);
        }
        Ok(())
    }

    async fn finalize_audit(
        &self,
        audit_key: &str,
        completed: AuditCycle,
        previous: Option<AuditCycle>,
    ) -> Result<AuditOutcome> {
        let outcome =
            AuditOutcomeResolver::resolve(previous.as_ref(), Some(&completed));
        debug!(audit_key, ?outcome, "classified audit cycle");

        let change = AuditChange {
            started: Some(completed.started),
            ended: completed.ended,
            dc_allocated: completed.dc_allocated,
            outcome: Some(outcome),
            datacap_amount: Some(completed.datacap_amount),
        };

        self.publisher
            .update_audit(audit_key, change, &ADVANCEABLE_OUTCOMES)
            .await
            .context("Failed to publish audit outcome")?;

        Ok(outcome)
    }
}

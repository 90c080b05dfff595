// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the `Application` aggregate.
//!
//! Every event is an immutable envelope of `aggregate_id`, `timestamp`,
//! `source`, and a transition-specific payload. The append-only log of these
//! envelopes is the sole source of truth for an application; the aggregate's
//! fields are rebuilt by folding the log in order.
//!
//! Payloads carry everything the reducer needs, including ledger snapshots
//! and timestamps, so that applying an event never consults a clock or a
//! collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::application::{
    AllocationMethod, ApplicantProfile, ApplicationId, ApplicationInstruction,
};

/// Who or what triggered an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// The applicant, via the intake form or a later edit.
    Applicant,
    /// A governance reviewer, identified by address.
    Governance { reviewer_address: String },
    /// A poller watching on-chain approval sources.
    ChainPoller,
    /// The scheduled refresh/audit automation.
    RefreshAutomation,
    /// Internal bookkeeping.
    System,
}

/// Immutable domain-event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationEvent {
    pub aggregate_id: ApplicationId,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub payload: ApplicationEventPayload,
}

impl ApplicationEvent {
    /// Build an envelope stamped with an explicit timestamp. Commands that
    /// derive timestamped values (instruction start times, grant times) pass
    /// the same instant here so the payload and envelope never diverge.
    pub fn at(
        aggregate_id: ApplicationId,
        timestamp: DateTime<Utc>,
        source: EventSource,
        payload: ApplicationEventPayload,
    ) -> Self {
        Self {
            aggregate_id,
            timestamp,
            source,
            payload,
        }
    }

    /// Wire name of the event, e.g. `"governance-review-approved"`.
    pub fn event_name(&self) -> &'static str {
        self.payload.event_name()
    }
}

/// Transition-specific payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApplicationEventPayload {
    Created {
        applicant: ApplicantProfile,
        requested_amount: f64,
        path: crate::domain::allocation_path::AllocationPath,
    },
    Edited {
        applicant: ApplicantProfile,
    },
    KycStarted,
    KycApproved {
        verification_ref: Option<String>,
    },
    KycRejected {
        reason: Option<String>,
    },
    KycRevoked,
    GovernanceReviewStarted {
        /// The fresh instruction under negotiation. `None` when the review
        /// re-opens after a refresh, where the pending instruction was
        /// already pushed by `DatacapRefreshRequested`.
        instruction: Option<ApplicationInstruction>,
    },
    GovernanceReviewApproved {
        /// Full ledger snapshot at approval time.
        instructions: Vec<ApplicationInstruction>,
        reviewer_address: String,
    },
    GovernanceReviewRejected {
        instructions: Vec<ApplicationInstruction>,
        reason: String,
        reviewer_address: String,
    },
    RkhApprovalStarted {
        threshold: usize,
    },
    RkhApprovalsUpdated {
        message_id: String,
        approvals: Vec<String>,
        threshold: usize,
    },
    RkhApprovalCompleted {
        instructions: Vec<ApplicationInstruction>,
    },
    MetaAllocatorApprovalStarted,
    MetaAllocatorApprovalCompleted {
        block_number: u64,
        tx_hash: String,
        instructions: Vec<ApplicationInstruction>,
    },
    DatacapAllocationUpdated {
        amount: f64,
        instructions: Vec<ApplicationInstruction>,
    },
    DatacapRefreshRequested {
        instruction: ApplicationInstruction,
        method: AllocationMethod,
    },
}

impl ApplicationEventPayload {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "application-created",
            Self::Edited { .. } => "application-edited",
            Self::KycStarted => "kyc-started",
            Self::KycApproved { .. } => "kyc-approved",
            Self::KycRejected { .. } => "kyc-rejected",
            Self::KycRevoked => "kyc-revoked",
            Self::GovernanceReviewStarted { .. } => "governance-review-started",
            Self::GovernanceReviewApproved { .. } => "governance-review-approved",
            Self::GovernanceReviewRejected { .. } => "governance-review-rejected",
            Self::RkhApprovalStarted { .. } => "rkh-approval-started",
            Self::RkhApprovalsUpdated { .. } => "rkh-approval-updated",
            Self::RkhApprovalCompleted { .. } => "rkh-approval-completed",
            Self::MetaAllocatorApprovalStarted => "meta-allocator-approval-started",
            Self::MetaAllocatorApprovalCompleted { .. } => {
                "meta-allocator-approval-completed"
            }
            Self::DatacapAllocationUpdated { .. } => "datacap-allocation-updated",
            Self::DatacapRefreshRequested { .. } => "datacap-refresh-requested",
        }
    }
}

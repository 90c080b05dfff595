// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Application Aggregate
//!
//! Aggregate root for one DataCap allocation request. Owns the authoritative
//! lifecycle phase, the ordered instruction ledger, and the multisig /
//! meta-allocator approval counters. State is event-rebuilt: every command
//! guards the current phase, derives its payload, and records events that the
//! reducer in [`Application::apply`] folds back into state.
//!
//! ## Lifecycle
//!
//! ```text
//! KycPhase ─ approve_kyc ─▶ GovernanceReviewPhase
//!    │                          │ approve_governance_review (2×2 matrix)
//!    │ reject_kyc               ├─▶ RkhApprovalPhase ──▶ DcAllocated
//!    ▼                          ├─▶ MetaApprovalPhase ─▶ DcAllocated
//! Rejected ◀─ reject_governance_review ─┤
//!                                       └─▶ DcAllocated (fast path)
//! DcAllocated ─ request_datacap_refresh ─▶ InRefresh
//! InRefresh ─ begin_refresh_review ─▶ GovernanceReviewPhase (cycle repeats)
//! ```
//!
//! ## Invariants
//!
//! - `phase` is always one of the closed [`ApplicationPhase`] set.
//! - Every mutation of ledger entries or counters is paired with exactly one
//!   recorded event; there is no silent state change.
//! - Ledger entries are never deleted; the last entry is the instruction
//!   under negotiation.
//! - The reducer is pure: timestamps and derived instruction values are
//!   computed in the command and carried on the event.
//!
//! ## Concurrency
//!
//! The aggregate provides no intrinsic mutual exclusion. Independent pollers
//! may race on the same aggregate id; callers serialize per id or accept
//! last-writer-wins on the store (see [`crate::domain::repository`]).
//! Commands are safe under at-least-once redelivery — see the no-op guard in
//! [`Application::update_rkh_approvals`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::allocation_path::AllocationPath;
use crate::domain::event_sourcing::EventSourced;
use crate::domain::events::{ApplicationEvent, ApplicationEventPayload, EventSource};

/// Multisig quorum required on the root-key-holder pathway.
pub const RKH_APPROVAL_THRESHOLD: usize = 2;

/// Unique identifier for an allocation application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationPhase {
    KycPhase,
    GovernanceReviewPhase,
    RkhApprovalPhase,
    MetaApprovalPhase,
    Rejected,
    DcAllocated,
    InRefresh,
}

/// Which authority grants the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationMethod {
    RkhAllocator,
    MetaAllocator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionStatus {
    Pending,
    Granted,
    Denied,
}

/// One entry in the instruction ledger. Created when governance review
/// starts or a refresh is requested; advanced in place only by the command
/// actively negotiating it; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInstruction {
    pub method: AllocationMethod,
    pub datacap_amount: f64,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub allocated_timestamp: Option<DateTime<Utc>>,
    pub status: InstructionStatus,
    pub is_mdma_allocator: Option<bool>,
}

/// Applicant identity fields carried on the intake form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub name: String,
    pub organization: Option<String>,
    pub address: String,
}

/// Intake parameters for [`Application::create`].
#[derive(Debug, Clone)]
pub struct CreateApplicationParams {
    pub id: ApplicationId,
    pub applicant: ApplicantProfile,
    pub requested_amount: f64,
}

#[derive(Debug, Clone, Default)]
pub struct KycApprovalData {
    pub verification_ref: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KycRejectionData {
    pub reason: Option<String>,
}

/// Reviewer classification of the allocator, from the governance review
/// payload. `Manual` routes the provisional method to the meta-allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocatorClassification {
    Manual,
    Automated,
    MarketBased,
}

/// Payload of an approving governance review.
#[derive(Debug, Clone)]
pub struct GovernanceReviewApproval {
    pub final_datacap: f64,
    pub classification: AllocatorClassification,
    pub reviewer_address: String,
    pub is_mdma_allocator: bool,
}

#[derive(Debug, Clone)]
pub struct GovernanceReviewRejection {
    pub reason: String,
    pub reviewer_address: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    /// Raised by every guarded command when the current phase is outside the
    /// command's allowed set. No mutation and no event is emitted.
    #[error("Invalid operation for the current phase")]
    InvalidPhase {
        command: &'static str,
        phase: ApplicationPhase,
    },

    #[error("No instruction is under negotiation")]
    EmptyLedger { command: &'static str },
}

impl ApplicationError {
    /// Stable domain error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPhase { .. } => "PHASE_VIOLATION",
            Self::EmptyLedger { .. } => "EMPTY_LEDGER",
        }
    }
}

/// Aggregate root for one DataCap allocation request.
///
/// Fields are a derived cache over the event log; rebuild with
/// [`Application::from_events`]. `pending_events` is excluded from
/// serialization — serialized form reflects state only.
#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: ApplicationId,
    applicant: ApplicantProfile,
    requested_amount: f64,
    phase: ApplicationPhase,
    instructions: Vec<ApplicationInstruction>,
    approvals: Vec<String>,
    approval_threshold: usize,
    is_meta_allocator: bool,
    is_mdma: bool,
    allocation_path: Option<AllocationPath>,
    milestones: BTreeMap<String, DateTime<Utc>>,
    version: u64,
    #[serde(skip)]
    pending_events: Vec<ApplicationEvent>,
}

impl Application {
    fn blank(id: ApplicationId) -> Self {
        Self {
            id,
            applicant: ApplicantProfile::default(),
            requested_amount: 0.0,
            phase: ApplicationPhase::KycPhase,
            instructions: Vec::new(),
            approvals: Vec::new(),
            approval_threshold: 0,
            is_meta_allocator: false,
            is_mdma: false,
            allocation_path: None,
            milestones: BTreeMap::new(),
            version: 0,
            pending_events: Vec::new(),
        }
    }

    /// Open a new application. The caller resolves the allocation path (via
    /// [`crate::domain::allocation_path::AllocationPathResolver`]) before
    /// invoking this, keeping resolver calls out of the reducer.
    pub fn create(
        params: CreateApplicationParams,
        path: AllocationPath,
        source: EventSource,
    ) -> Self {
        let mut application = Self::blank(params.id);
        let now = Utc::now();
        application.record(ApplicationEvent::at(
            params.id,
            now,
            source.clone(),
            ApplicationEventPayload::Created {
                applicant: params.applicant,
                requested_amount: params.requested_amount,
                path,
            },
        ));
        application.record(ApplicationEvent::at(
            params.id,
            now,
            source,
            ApplicationEventPayload::KycStarted,
        ));
        application
    }

    /// Rebuild the aggregate by folding a persisted log.
    pub fn from_events<I>(id: ApplicationId, events: I) -> Self
    where
        I: IntoIterator<Item = ApplicationEvent>,
    {
        let mut application = Self::blank(id);
        application.replay(events);
        application
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn phase(&self) -> ApplicationPhase {
        self.phase
    }

    pub fn applicant(&self) -> &ApplicantProfile {
        &self.applicant
    }

    pub fn requested_amount(&self) -> f64 {
        self.requested_amount
    }

    /// The full instruction ledger, oldest first.
    pub fn instructions(&self) -> &[ApplicationInstruction] {
        &self.instructions
    }

    /// The instruction under negotiation (last ledger entry).
    pub fn current_instruction(&self) -> Option<&ApplicationInstruction> {
        self.instructions.last()
    }

    pub fn approvals(&self) -> &[String] {
        &self.approvals
    }

    pub fn approval_threshold(&self) -> usize {
        self.approval_threshold
    }

    pub fn is_meta_allocator(&self) -> bool {
        self.is_meta_allocator
    }

    pub fn is_mdma(&self) -> bool {
        self.is_mdma
    }

    pub fn allocation_path(&self) -> Option<&AllocationPath> {
        self.allocation_path.as_ref()
    }

    /// Latest timestamp per transition name, e.g. `"kyc-approved"`.
    pub fn milestones(&self) -> &BTreeMap<String, DateTime<Utc>> {
        &self.milestones
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Update applicant fields. Allowed from any phase except `Rejected`;
    /// never touches the ledger.
    pub fn edit(
        &mut self,
        applicant: ApplicantProfile,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase(
            "edit",
            &[
                ApplicationPhase::KycPhase,
                ApplicationPhase::GovernanceReviewPhase,
                ApplicationPhase::RkhApprovalPhase,
                ApplicationPhase::MetaApprovalPhase,
                ApplicationPhase::DcAllocated,
                ApplicationPhase::InRefresh,
            ],
        )?;
        self.record(ApplicationEvent::at(
            self.id,
            Utc::now(),
            source,
            ApplicationEventPayload::Edited { applicant },
        ));
        Ok(())
    }

    /// Approve identity verification and open governance review with a fresh
    /// pending instruction derived from the requested amount and the cached
    /// allocation path.
    pub fn approve_kyc(
        &mut self,
        data: KycApprovalData,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase("approve_kyc", &[ApplicationPhase::KycPhase])?;

        let now = Utc::now();
        let method = if self.is_meta_allocator {
            AllocationMethod::MetaAllocator
        } else {
            AllocationMethod::RkhAllocator
        };
        let instruction = ApplicationInstruction {
            method,
            datacap_amount: self.requested_amount,
            start_timestamp: Some(now),
            end_timestamp: None,
            allocated_timestamp: None,
            status: InstructionStatus::Pending,
            is_mdma_allocator: None,
        };

        self.record(ApplicationEvent::at(
            self.id,
            now,
            source.clone(),
            ApplicationEventPayload::KycApproved {
                verification_ref: data.verification_ref,
            },
        ));
        self.record(ApplicationEvent::at(
            self.id,
            now,
            source,
            ApplicationEventPayload::GovernanceReviewStarted {
                instruction: Some(instruction),
            },
        ));
        Ok(())
    }

    pub fn reject_kyc(
        &mut self,
        data: KycRejectionData,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase("reject_kyc", &[ApplicationPhase::KycPhase])?;
        self.record(ApplicationEvent::at(
            self.id,
            Utc::now(),
            source,
            ApplicationEventPayload::KycRejected {
                reason: data.reason,
            },
        ));
        Ok(())
    }

    /// Revert the KYC-approved bookkeeping. The phase enum value stays
    /// `GovernanceReviewPhase`; only the milestone record is withdrawn.
    pub fn revoke_kyc(&mut self, source: EventSource) -> Result<(), ApplicationError> {
        self.ensure_phase("revoke_kyc", &[ApplicationPhase::GovernanceReviewPhase])?;
        self.record(ApplicationEvent::at(
            self.id,
            Utc::now(),
            source,
            ApplicationEventPayload::KycRevoked,
        ));
        Ok(())
    }

    /// Approve the governance review and select the completion pathway.
    ///
    /// The reviewer's classification fixes the provisional method
    /// (`Manual` → meta-allocator, anything else → RKH) and the final
    /// approved amount on the instruction under negotiation. The completion
    /// action then follows the 2×2 table over
    /// `(is_meta_allocator, is_mdma)`:
    ///
    /// | meta | mdma | action |
    /// |------|------|--------|
    /// | t    | t    | grant immediately, `DcAllocated` |
    /// | t    | f    | await on-chain confirmation, `MetaApprovalPhase` |
    /// | f    | t    | grant immediately, `DcAllocated` |
    /// | f    | f    | multisig quorum of [`RKH_APPROVAL_THRESHOLD`], `RkhApprovalPhase` |
    pub fn approve_governance_review(
        &mut self,
        review: GovernanceReviewApproval,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase(
            "approve_governance_review",
            &[ApplicationPhase::GovernanceReviewPhase],
        )?;

        let now = Utc::now();
        // Derive the next instruction value first; the event carries it and
        // only the reducer performs the mutation.
        let mut ledger = self.instructions.clone();
        let current = ledger.last_mut().ok_or(ApplicationError::EmptyLedger {
            command: "approve_governance_review",
        })?;
        current.method = match review.classification {
            AllocatorClassification::Manual => AllocationMethod::MetaAllocator,
            _ => AllocationMethod::RkhAllocator,
        };
        current.datacap_amount = review.final_datacap;
        current.is_mdma_allocator = Some(review.is_mdma_allocator);

        self.record(ApplicationEvent::at(
            self.id,
            now,
            source.clone(),
            ApplicationEventPayload::GovernanceReviewApproved {
                instructions: ledger,
                reviewer_address: review.reviewer_address,
            },
        ));

        match (self.is_meta_allocator, self.is_mdma) {
            // Both MDMA cells of the table grant immediately.
            (_, true) => {
                let granted = self.granted_ledger(now)?;
                let amount = review.final_datacap;
                self.record(ApplicationEvent::at(
                    self.id,
                    now,
                    source,
                    ApplicationEventPayload::DatacapAllocationUpdated {
                        amount,
                        instructions: granted,
                    },
                ));
            }
            (true, false) => {
                self.record(ApplicationEvent::at(
                    self.id,
                    now,
                    source,
                    ApplicationEventPayload::MetaAllocatorApprovalStarted,
                ));
            }
            (false, false) => {
                self.record(ApplicationEvent::at(
                    self.id,
                    now,
                    source,
                    ApplicationEventPayload::RkhApprovalStarted {
                        threshold: RKH_APPROVAL_THRESHOLD,
                    },
                ));
            }
        }
        Ok(())
    }

    pub fn reject_governance_review(
        &mut self,
        rejection: GovernanceReviewRejection,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase(
            "reject_governance_review",
            &[ApplicationPhase::GovernanceReviewPhase],
        )?;

        let now = Utc::now();
        let mut ledger = self.instructions.clone();
        let current = ledger.last_mut().ok_or(ApplicationError::EmptyLedger {
            command: "reject_governance_review",
        })?;
        current.status = InstructionStatus::Denied;
        current.end_timestamp = Some(now);

        self.record(ApplicationEvent::at(
            self.id,
            now,
            source,
            ApplicationEventPayload::GovernanceReviewRejected {
                instructions: ledger,
                reason: rejection.reason,
                reviewer_address: rejection.reviewer_address,
            },
        ));
        Ok(())
    }

    /// Fold a fresh multisig approval snapshot from the chain poller.
    ///
    /// No-op (no event) when the approval count is unchanged, which makes the
    /// command safe to call repeatedly with the same external signal.
    /// Reaching the threshold drives the phase to `DcAllocated`;
    /// [`Application::complete_rkh_approval`] is the independent second path
    /// there, triggered by the final approved transaction observed on-chain.
    pub fn update_rkh_approvals(
        &mut self,
        message_id: String,
        approvals: Vec<String>,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase(
            "update_rkh_approvals",
            &[ApplicationPhase::RkhApprovalPhase],
        )?;

        if approvals.len() == self.approvals.len() {
            return Ok(());
        }

        self.record(ApplicationEvent::at(
            self.id,
            Utc::now(),
            source,
            ApplicationEventPayload::RkhApprovalsUpdated {
                message_id,
                approvals,
                threshold: self.approval_threshold,
            },
        ));
        Ok(())
    }

    /// Mark the instruction granted after the final approved multisig
    /// transaction lands on-chain.
    pub fn complete_rkh_approval(
        &mut self,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase(
            "complete_rkh_approval",
            &[ApplicationPhase::RkhApprovalPhase],
        )?;

        let now = Utc::now();
        let instructions = self.granted_ledger(now)?;
        self.record(ApplicationEvent::at(
            self.id,
            now,
            source,
            ApplicationEventPayload::RkhApprovalCompleted { instructions },
        ));
        Ok(())
    }

    /// Mark the instruction granted after the meta-allocator contract
    /// confirms the allocation on-chain.
    pub fn complete_meta_allocator_approval(
        &mut self,
        block_number: u64,
        tx_hash: String,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase(
            "complete_meta_allocator_approval",
            &[
                ApplicationPhase::GovernanceReviewPhase,
                ApplicationPhase::MetaApprovalPhase,
                ApplicationPhase::DcAllocated,
            ],
        )?;

        let now = Utc::now();
        let instructions = self.granted_ledger(now)?;
        self.record(ApplicationEvent::at(
            self.id,
            now,
            source,
            ApplicationEventPayload::MetaAllocatorApprovalCompleted {
                block_number,
                tx_hash,
                instructions,
            },
        ));
        Ok(())
    }

    /// Open a refresh: double the previous instruction's amount, copy its
    /// method, and push a fresh pending ledger entry.
    pub fn request_datacap_refresh(
        &mut self,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase(
            "request_datacap_refresh",
            &[ApplicationPhase::DcAllocated],
        )?;

        let previous = self
            .instructions
            .last()
            .ok_or(ApplicationError::EmptyLedger {
                command: "request_datacap_refresh",
            })?;

        let now = Utc::now();
        let instruction = ApplicationInstruction {
            method: previous.method,
            datacap_amount: previous.datacap_amount * 2.0,
            start_timestamp: Some(now),
            end_timestamp: None,
            allocated_timestamp: None,
            status: InstructionStatus::Pending,
            is_mdma_allocator: previous.is_mdma_allocator,
        };
        let method = instruction.method;

        self.record(ApplicationEvent::at(
            self.id,
            now,
            source,
            ApplicationEventPayload::DatacapRefreshRequested {
                instruction,
                method,
            },
        ));
        Ok(())
    }

    /// Re-enter governance review once the refresh audit workflow has
    /// published the doubled request.
    pub fn begin_refresh_review(
        &mut self,
        source: EventSource,
    ) -> Result<(), ApplicationError> {
        self.ensure_phase("begin_refresh_review", &[ApplicationPhase::InRefresh])?;
        self.record(ApplicationEvent::at(
            self.id,
            Utc::now(),
            source,
            ApplicationEventPayload::GovernanceReviewStarted { instruction: None },
        ));
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn ensure_phase(
        &self,
        command: &'static str,
        allowed: &[ApplicationPhase],
    ) -> Result<(), ApplicationError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ApplicationError::InvalidPhase {
                command,
                phase: self.phase,
            })
        }
    }

    /// Clone the ledger with the last entry marked granted at `at`.
    fn granted_ledger(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<ApplicationInstruction>, ApplicationError> {
        let mut ledger = self.instructions.clone();
        let current = ledger.last_mut().ok_or(ApplicationError::EmptyLedger {
            command: "grant",
        })?;
        current.status = InstructionStatus::Granted;
        current.allocated_timestamp = Some(at);
        Ok(ledger)
    }
}

impl EventSourced for Application {
    type Event = ApplicationEvent;

    fn apply(&mut self, event: &ApplicationEvent) {
        self.milestones
            .insert(event.event_name().to_string(), event.timestamp);

        match &event.payload {
            ApplicationEventPayload::Created {
                applicant,
                requested_amount,
                path,
            } => {
                self.applicant = applicant.clone();
                self.requested_amount = *requested_amount;
                self.is_meta_allocator = path.is_meta_allocator;
                self.allocation_path = Some(path.clone());
                self.phase = ApplicationPhase::KycPhase;
            }
            ApplicationEventPayload::Edited { applicant } => {
                self.applicant = applicant.clone();
            }
            ApplicationEventPayload::KycStarted
            | ApplicationEventPayload::KycApproved { .. } => {}
            ApplicationEventPayload::KycRejected { .. } => {
                self.phase = ApplicationPhase::Rejected;
            }
            ApplicationEventPayload::KycRevoked => {
                self.milestones.remove("kyc-approved");
            }
            ApplicationEventPayload::GovernanceReviewStarted { instruction } => {
                if let Some(instruction) = instruction {
                    self.instructions.push(instruction.clone());
                }
                self.phase = ApplicationPhase::GovernanceReviewPhase;
            }
            ApplicationEventPayload::GovernanceReviewApproved {
                instructions, ..
            } => {
                self.instructions = instructions.clone();
                self.is_mdma = instructions
                    .last()
                    .and_then(|i| i.is_mdma_allocator)
                    .unwrap_or(false);
            }
            ApplicationEventPayload::GovernanceReviewRejected {
                instructions, ..
            } => {
                self.instructions = instructions.clone();
                self.phase = ApplicationPhase::Rejected;
            }
            ApplicationEventPayload::RkhApprovalStarted { threshold } => {
                self.approval_threshold = *threshold;
                self.approvals.clear();
                self.phase = ApplicationPhase::RkhApprovalPhase;
            }
            ApplicationEventPayload::RkhApprovalsUpdated {
                approvals,
                threshold,
                ..
            } => {
                self.approvals = approvals.clone();
                if approvals.len() >= *threshold {
                    self.phase = ApplicationPhase::DcAllocated;
                }
            }
            ApplicationEventPayload::RkhApprovalCompleted { instructions } => {
                self.instructions = instructions.clone();
                self.phase = ApplicationPhase::DcAllocated;
            }
            ApplicationEventPayload::MetaAllocatorApprovalStarted => {
                self.phase = ApplicationPhase::MetaApprovalPhase;
            }
            ApplicationEventPayload::MetaAllocatorApprovalCompleted {
                instructions,
                ..
            } => {
                self.instructions = instructions.clone();
                self.phase = ApplicationPhase::DcAllocated;
            }
            ApplicationEventPayload::DatacapAllocationUpdated {
                instructions, ..
            } => {
                self.instructions = instructions.clone();
                self.phase = ApplicationPhase::DcAllocated;
            }
            ApplicationEventPayload::DatacapRefreshRequested {
                instruction, ..
            } => {
                self.instructions.push(instruction.clone());
                self.phase = ApplicationPhase::InRefresh;
            }
        }
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    fn pending(&self) -> &[ApplicationEvent] {
        &self.pending_events
    }

    fn pending_mut(&mut self) -> &mut Vec<ApplicationEvent> {
        &mut self.pending_events
    }
}

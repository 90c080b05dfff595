// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the Application lifecycle state machine:
//! phase guards, the governance-review decision matrix, multisig quorum
//! tracking, the refresh cycle, and replay idempotence.

use datacap_core::domain::allocation_path::{AllocationPath, AuditType, Pathway};
use datacap_core::domain::application::{
    AllocatorClassification, ApplicantProfile, Application, ApplicationError,
    ApplicationId, ApplicationPhase, CreateApplicationParams, GovernanceReviewApproval,
    GovernanceReviewRejection, InstructionStatus, KycApprovalData, KycRejectionData,
    RKH_APPROVAL_THRESHOLD,
};
use datacap_core::domain::event_sourcing::EventSourced;
use datacap_core::domain::events::EventSource;

fn rkh_path() -> AllocationPath {
    AllocationPath {
        pathway: Pathway::Rkh,
        address: "f080".to_string(),
        audit_type: AuditType::MarketBased,
        is_meta_allocator: false,
    }
}

fn mdma_path() -> AllocationPath {
    AllocationPath {
        pathway: Pathway::Mdma,
        address: "0xMDMA".to_string(),
        audit_type: AuditType::Enterprise,
        is_meta_allocator: true,
    }
}

fn new_application(path: AllocationPath) -> Application {
    Application::create(
        CreateApplicationParams {
            id: ApplicationId::new(),
            applicant: ApplicantProfile {
                name: "Example Storage Co".to_string(),
                organization: Some("Example Org".to_string()),
                address: "f1applicant".to_string(),
            },
            requested_amount: 10.0,
        },
        path,
        EventSource::Applicant,
    )
}

fn reviewer() -> EventSource {
    EventSource::Governance {
        reviewer_address: "f1reviewer".to_string(),
    }
}

fn approval(is_mdma: bool, classification: AllocatorClassification) -> GovernanceReviewApproval {
    GovernanceReviewApproval {
        final_datacap: 10.0,
        classification,
        reviewer_address: "f1reviewer".to_string(),
        is_mdma_allocator: is_mdma,
    }
}

/// Drive a fresh application into the requested phase.
fn in_phase(phase: ApplicationPhase) -> Application {
    let mut application = new_application(match phase {
        ApplicationPhase::MetaApprovalPhase => mdma_path(),
        _ => rkh_path(),
    });
    match phase {
        ApplicationPhase::KycPhase => {}
        ApplicationPhase::Rejected => {
            application
                .reject_kyc(KycRejectionData::default(), EventSource::System)
                .unwrap();
        }
        ApplicationPhase::GovernanceReviewPhase => {
            application
                .approve_kyc(KycApprovalData::default(), EventSource::System)
                .unwrap();
        }
        ApplicationPhase::RkhApprovalPhase => {
            application
                .approve_kyc(KycApprovalData::default(), EventSource::System)
                .unwrap();
            application
                .approve_governance_review(
                    approval(false, AllocatorClassification::MarketBased),
                    reviewer(),
                )
                .unwrap();
        }
        ApplicationPhase::MetaApprovalPhase => {
            application
                .approve_kyc(KycApprovalData::default(), EventSource::System)
                .unwrap();
            application
                .approve_governance_review(
                    approval(false, AllocatorClassification::Manual),
                    reviewer(),
                )
                .unwrap();
        }
        ApplicationPhase::DcAllocated => {
            application
                .approve_kyc(KycApprovalData::default(), EventSource::System)
                .unwrap();
            application
                .approve_governance_review(
                    approval(false, AllocatorClassification::MarketBased),
                    reviewer(),
                )
                .unwrap();
            application
                .complete_rkh_approval(EventSource::ChainPoller)
                .unwrap();
        }
        ApplicationPhase::InRefresh => {
            application
                .approve_kyc(KycApprovalData::default(), EventSource::System)
                .unwrap();
            application
                .approve_governance_review(
                    approval(false, AllocatorClassification::MarketBased),
                    reviewer(),
                )
                .unwrap();
            application
                .complete_rkh_approval(EventSource::ChainPoller)
                .unwrap();
            application
                .request_datacap_refresh(EventSource::RefreshAutomation)
                .unwrap();
        }
    }
    assert_eq!(application.phase(), phase, "setup must land in {phase:?}");
    application
}

const ALL_PHASES: [ApplicationPhase; 7] = [
    ApplicationPhase::KycPhase,
    ApplicationPhase::GovernanceReviewPhase,
    ApplicationPhase::RkhApprovalPhase,
    ApplicationPhase::MetaApprovalPhase,
    ApplicationPhase::Rejected,
    ApplicationPhase::DcAllocated,
    ApplicationPhase::InRefresh,
];

type Command = Box<dyn Fn(&mut Application) -> Result<(), ApplicationError>>;

fn guarded_commands() -> Vec<(&'static str, Vec<ApplicationPhase>, Command)> {
    vec![
        (
            "approve_kyc",
            vec![ApplicationPhase::KycPhase],
            Box::new(|a| a.approve_kyc(KycApprovalData::default(), EventSource::System)),
        ),
        (
            "reject_kyc",
            vec![ApplicationPhase::KycPhase],
            Box::new(|a| a.reject_kyc(KycRejectionData::default(), EventSource::System)),
        ),
        (
            "revoke_kyc",
            vec![ApplicationPhase::GovernanceReviewPhase],
            Box::new(|a| a.revoke_kyc(EventSource::System)),
        ),
        (
            "approve_governance_review",
            vec![ApplicationPhase::GovernanceReviewPhase],
            Box::new(|a| {
                a.approve_governance_review(
                    approval(false, AllocatorClassification::MarketBased),
                    reviewer(),
                )
            }),
        ),
        (
            "reject_governance_review",
            vec![ApplicationPhase::GovernanceReviewPhase],
            Box::new(|a| {
                a.reject_governance_review(
                    GovernanceReviewRejection {
                        reason: "insufficient history".to_string(),
                        reviewer_address: "f1reviewer".to_string(),
                    },
                    reviewer(),
                )
            }),
        ),
        (
            "update_rkh_approvals",
            vec![ApplicationPhase::RkhApprovalPhase],
            Box::new(|a| {
                a.update_rkh_approvals(
                    "msg-1".to_string(),
                    vec!["f1signer1".to_string()],
                    EventSource::ChainPoller,
                )
            }),
        ),
        (
            "complete_rkh_approval",
            vec![ApplicationPhase::RkhApprovalPhase],
            Box::new(|a| a.complete_rkh_approval(EventSource::ChainPoller)),
        ),
        (
            "complete_meta_allocator_approval",
            vec![
                ApplicationPhase::GovernanceReviewPhase,
                ApplicationPhase::MetaApprovalPhase,
                ApplicationPhase::DcAllocated,
            ],
            Box::new(|a| {
                a.complete_meta_allocator_approval(
                    123,
                    "0xhash".to_string(),
                    EventSource::ChainPoller,
                )
            }),
        ),
        (
            "request_datacap_refresh",
            vec![ApplicationPhase::DcAllocated],
            Box::new(|a| a.request_datacap_refresh(EventSource::RefreshAutomation)),
        ),
        (
            "begin_refresh_review",
            vec![ApplicationPhase::InRefresh],
            Box::new(|a| a.begin_refresh_review(EventSource::RefreshAutomation)),
        ),
    ]
}

#[test]
fn every_command_rejects_every_disallowed_phase_without_mutation() {
    for (name, allowed, command) in guarded_commands() {
        for phase in ALL_PHASES {
            if allowed.contains(&phase) {
                continue;
            }
            let mut application = in_phase(phase);
            application.take_pending();
            let before = serde_json::to_value(&application).unwrap();

            let err = command(&mut application)
                .expect_err(&format!("{name} must fail in {phase:?}"));
            assert_eq!(err.code(), "PHASE_VIOLATION", "{name} in {phase:?}");
            assert_eq!(
                err.to_string(),
                "Invalid operation for the current phase"
            );

            let after = serde_json::to_value(&application).unwrap();
            assert_eq!(before, after, "{name} mutated state in {phase:?}");
            assert!(
                application.take_pending().is_empty(),
                "{name} emitted events in {phase:?}"
            );
        }
    }
}

// ── Governance-review decision matrix ────────────────────────────────────────

#[test]
fn meta_allocator_with_mdma_grants_immediately() {
    let mut application = new_application(mdma_path());
    application
        .approve_kyc(KycApprovalData::default(), EventSource::System)
        .unwrap();
    application
        .approve_governance_review(approval(true, AllocatorClassification::Manual), reviewer())
        .unwrap();

    assert_eq!(application.phase(), ApplicationPhase::DcAllocated);
    let instruction = application.current_instruction().unwrap();
    assert_eq!(instruction.status, InstructionStatus::Granted);
    assert_eq!(
        application.allocation_path().unwrap().pathway,
        Pathway::Mdma
    );
    let names: Vec<_> = application
        .take_pending()
        .iter()
        .map(|e| e.event_name())
        .collect();
    assert!(names.contains(&"governance-review-approved"));
    assert!(names.contains(&"datacap-allocation-updated"));
}

#[test]
fn meta_allocator_without_mdma_awaits_onchain_confirmation() {
    let mut application = new_application(mdma_path());
    application
        .approve_kyc(KycApprovalData::default(), EventSource::System)
        .unwrap();
    application
        .approve_governance_review(approval(false, AllocatorClassification::Manual), reviewer())
        .unwrap();

    assert_eq!(application.phase(), ApplicationPhase::MetaApprovalPhase);
    assert_eq!(
        application.current_instruction().unwrap().status,
        InstructionStatus::Pending
    );
    let names: Vec<_> = application
        .take_pending()
        .iter()
        .map(|e| e.event_name())
        .collect();
    assert!(names.contains(&"meta-allocator-approval-started"));

    // On-chain confirmation then grants.
    application
        .complete_meta_allocator_approval(99, "0xabc".to_string(), EventSource::ChainPoller)
        .unwrap();
    assert_eq!(application.phase(), ApplicationPhase::DcAllocated);
    assert_eq!(
        application.current_instruction().unwrap().status,
        InstructionStatus::Granted
    );
}

#[test]
fn root_key_pathway_with_mdma_grants_immediately() {
    let mut application = new_application(rkh_path());
    application
        .approve_kyc(KycApprovalData::default(), EventSource::System)
        .unwrap();
    application
        .approve_governance_review(
            approval(true, AllocatorClassification::MarketBased),
            reviewer(),
        )
        .unwrap();

    assert_eq!(application.phase(), ApplicationPhase::DcAllocated);
    assert_eq!(
        application.current_instruction().unwrap().status,
        InstructionStatus::Granted
    );
}

#[test]
fn root_key_pathway_without_mdma_enters_multisig_quorum() {
    let mut application = new_application(rkh_path());
    application
        .approve_kyc(KycApprovalData::default(), EventSource::System)
        .unwrap();
    application
        .approve_governance_review(
            approval(false, AllocatorClassification::MarketBased),
            reviewer(),
        )
        .unwrap();

    assert_eq!(application.phase(), ApplicationPhase::RkhApprovalPhase);
    assert_eq!(application.approval_threshold(), RKH_APPROVAL_THRESHOLD);
    let names: Vec<_> = application
        .take_pending()
        .iter()
        .map(|e| e.event_name())
        .collect();
    assert!(names.contains(&"rkh-approval-started"));
}

#[test]
fn manual_classification_routes_the_method_to_meta_allocator() {
    let mut application = new_application(mdma_path());
    application
        .approve_kyc(KycApprovalData::default(), EventSource::System)
        .unwrap();
    application
        .approve_governance_review(approval(false, AllocatorClassification::Manual), reviewer())
        .unwrap();

    use datacap_core::domain::application::AllocationMethod;
    assert_eq!(
        application.current_instruction().unwrap().method,
        AllocationMethod::MetaAllocator
    );
}

// ── Multisig quorum tracking ─────────────────────────────────────────────────

#[test]
fn redelivered_approval_snapshot_is_a_no_op() {
    let mut application = in_phase(ApplicationPhase::RkhApprovalPhase);
    application.take_pending();

    application
        .update_rkh_approvals(
            "msg-7".to_string(),
            vec!["f1signer1".to_string()],
            EventSource::ChainPoller,
        )
        .unwrap();
    assert_eq!(application.take_pending().len(), 1);
    assert_eq!(application.approvals(), ["f1signer1".to_string()]);

    // Same snapshot redelivered: zero events.
    application
        .update_rkh_approvals(
            "msg-7".to_string(),
            vec!["f1signer1".to_string()],
            EventSource::ChainPoller,
        )
        .unwrap();
    assert!(application.take_pending().is_empty());
    assert_eq!(application.phase(), ApplicationPhase::RkhApprovalPhase);
}

#[test]
fn reaching_the_threshold_allocates() {
    let mut application = in_phase(ApplicationPhase::RkhApprovalPhase);

    application
        .update_rkh_approvals(
            "msg-7".to_string(),
            vec!["f1signer1".to_string()],
            EventSource::ChainPoller,
        )
        .unwrap();
    assert_eq!(application.phase(), ApplicationPhase::RkhApprovalPhase);

    application
        .update_rkh_approvals(
            "msg-7".to_string(),
            vec!["f1signer1".to_string(), "f1signer2".to_string()],
            EventSource::ChainPoller,
        )
        .unwrap();
    assert_eq!(application.phase(), ApplicationPhase::DcAllocated);
}

#[test]
fn explicit_completion_is_an_independent_path_to_allocation() {
    // The final approved transaction observed on-chain can land before the
    // approvals snapshot ever reaches the threshold.
    let mut application = in_phase(ApplicationPhase::RkhApprovalPhase);
    application
        .complete_rkh_approval(EventSource::ChainPoller)
        .unwrap();

    assert_eq!(application.phase(), ApplicationPhase::DcAllocated);
    assert_eq!(
        application.current_instruction().unwrap().status,
        InstructionStatus::Granted
    );
}

// ── Refresh cycle ────────────────────────────────────────────────────────────

#[test]
fn refresh_doubles_the_allocated_amount() {
    let mut application = in_phase(ApplicationPhase::DcAllocated);
    assert_eq!(application.current_instruction().unwrap().datacap_amount, 10.0);

    application
        .request_datacap_refresh(EventSource::RefreshAutomation)
        .unwrap();

    assert_eq!(application.phase(), ApplicationPhase::InRefresh);
    assert_eq!(application.instructions().len(), 2);
    let refreshed = application.current_instruction().unwrap();
    assert_eq!(refreshed.datacap_amount, 20.0);
    assert_eq!(refreshed.status, InstructionStatus::Pending);
    assert!(refreshed.start_timestamp.is_some());

    // The previous grant is preserved, never rewritten.
    assert_eq!(
        application.instructions()[0].status,
        InstructionStatus::Granted
    );
}

#[test]
fn refresh_review_re_enters_the_decision_matrix() {
    let mut application = in_phase(ApplicationPhase::InRefresh);
    application
        .begin_refresh_review(EventSource::RefreshAutomation)
        .unwrap();
    assert_eq!(application.phase(), ApplicationPhase::GovernanceReviewPhase);
    // No duplicate instruction: the refresh already pushed the pending entry.
    assert_eq!(application.instructions().len(), 2);

    application
        .approve_governance_review(
            GovernanceReviewApproval {
                final_datacap: 20.0,
                classification: AllocatorClassification::MarketBased,
                reviewer_address: "f1reviewer".to_string(),
                is_mdma_allocator: false,
            },
            reviewer(),
        )
        .unwrap();
    assert_eq!(application.phase(), ApplicationPhase::RkhApprovalPhase);
}

// ── Replay ───────────────────────────────────────────────────────────────────

#[test]
fn full_lifecycle_replays_deterministically() {
    let mut application = in_phase(ApplicationPhase::InRefresh);
    application
        .begin_refresh_review(EventSource::RefreshAutomation)
        .unwrap();

    let log = application.take_pending();
    let rebuilt = Application::from_events(application.id, log.clone());
    let rebuilt_twice = Application::from_events(application.id, log);

    assert_eq!(
        serde_json::to_value(&application).unwrap(),
        serde_json::to_value(&rebuilt).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&rebuilt).unwrap(),
        serde_json::to_value(&rebuilt_twice).unwrap()
    );
    assert_eq!(rebuilt.version(), rebuilt_twice.version());
}

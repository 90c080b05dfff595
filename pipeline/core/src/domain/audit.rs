// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Audit cycles and outcome classification.
//!
//! Once DataCap is allocated, the application re-enters review periodically.
//! Each pass is one [`AuditCycle`]; its outcome is assigned by comparing the
//! cycle's allocated amount against the immediately preceding cycle's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relative tolerance for comparing PiB amounts that went through byte
/// conversion.
const AMOUNT_EPSILON: f64 = 1e-9;

/// Lifecycle and classification tags for an audit cycle.
///
/// `Pending`/`Approved`/`Rejected` track the cycle while it is in flight;
/// `Match`/`Double`/`Throttle`/`Unknown` classify the allocation delta once
/// the cycle closes. An equal amount classifies as `Match` — the single
/// canonical value for that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Pending,
    Approved,
    Rejected,
    /// Allocated amount unchanged from the previous cycle.
    Match,
    /// Allocated amount doubled.
    Double,
    /// Allocated amount halved.
    Throttle,
    /// No previous or current cycle to compare, or an irregular delta.
    Unknown,
}

/// One pass through the refresh/audit workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditCycle {
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub dc_allocated: Option<DateTime<Utc>>,
    pub outcome: AuditOutcome,
    pub datacap_amount: f64,
}

impl AuditCycle {
    /// Open a new pending cycle for `datacap_amount` PiB.
    pub fn open(started: DateTime<Utc>, datacap_amount: f64) -> Self {
        Self {
            started,
            ended: None,
            dc_allocated: None,
            outcome: AuditOutcome::Pending,
            datacap_amount,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == AuditOutcome::Pending
    }
}

/// Pure classification of the delta between two successive audit cycles.
pub struct AuditOutcomeResolver;

impl AuditOutcomeResolver {
    /// Classify `current` against `previous`.
    ///
    /// Equal amounts → [`AuditOutcome::Match`], doubled →
    /// [`AuditOutcome::Double`], halved → [`AuditOutcome::Throttle`].
    /// Any other delta, or a missing cycle on either side, is
    /// [`AuditOutcome::Unknown`].
    pub fn resolve(
        previous: Option<&AuditCycle>,
        current: Option<&AuditCycle>,
    ) -> AuditOutcome {
        let (Some(previous), Some(current)) = (previous, current) else {
            return AuditOutcome::Unknown;
        };

        let before = previous.datacap_amount;
        let after = current.datacap_amount;

        if amounts_equal(after, before) {
            AuditOutcome::Match
        } else if amounts_equal(after, before * 2.0) {
            AuditOutcome::Double
        } else if amounts_equal(after, before / 2.0) {
            AuditOutcome::Throttle
        } else {
            AuditOutcome::Unknown
        }
    }
}

fn amounts_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= AMOUNT_EPSILON * a.abs().max(b.abs()).max(1.0)
}

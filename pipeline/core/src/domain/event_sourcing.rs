// Copyright (c) 2026 DataCap Pipeline contributors
// SPDX-License-Identifier: AGPL-3.0

//! Event-sourcing kernel shared by event-rebuilt aggregates.
//!
//! The persisted event log is the sole source of truth; an aggregate's
//! in-memory fields are a derived cache rebuilt by folding the log in order.
//!
//! # Invariants
//!
//! - `apply` is a pure reducer: `(state, event) -> state`. No clocks, no
//!   collaborator calls, no I/O. Anything non-deterministic is computed in
//!   the command layer and carried on the event itself, so replay never
//!   re-triggers a side effect.
//! - `record` is write-through: the event is applied to current state the
//!   moment it is recorded, then queued for persistence.
//! - `replay` over the same log is idempotent — folding a log into a fresh
//!   aggregate twice yields identical state both times.

/// An aggregate whose state is derived from an ordered event log.
///
/// Implementors provide the reducer (`apply`), version storage, and the
/// pending-event buffer; `record`, `replay`, and `take_pending` come for
/// free and every command method is expected to follow the sequence:
/// guard precondition, compute payload, `record` exactly one (or a small
/// fixed number of) event(s).
pub trait EventSourced {
    type Event;

    /// Fold one event into current state. Pure and deterministic.
    fn apply(&mut self, event: &Self::Event);

    /// Number of events folded into this aggregate so far.
    fn version(&self) -> u64;

    fn bump_version(&mut self);

    /// Events recorded since the last persistence, in recording order.
    fn pending(&self) -> &[Self::Event];

    fn pending_mut(&mut self) -> &mut Vec<Self::Event>;

    /// Apply `event` to current state and queue it for persistence.
    fn record(&mut self, event: Self::Event) {
        self.apply(&event);
        self.bump_version();
        self.pending_mut().push(event);
    }

    /// Rebuild state by folding a previously persisted log. No side effects.
    fn replay<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Self::Event>,
    {
        for event in events {
            self.apply(&event);
            self.bump_version();
        }
    }

    /// Drain the pending buffer for persistence by the event store.
    fn take_pending(&mut self) -> Vec<Self::Event> {
        std::mem::take(self.pending_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        total: i64,
        version: u64,
        pending: Vec<i64>,
    }

    impl EventSourced for Counter {
        type Event = i64;

        fn apply(&mut self, event: &i64) {
            self.total += *event;
        }

        fn version(&self) -> u64 {
            self.version
        }

        fn bump_version(&mut self) {
            self.version += 1;
        }

        fn pending(&self) -> &[i64] {
            &self.pending
        }

        fn pending_mut(&mut self) -> &mut Vec<i64> {
            &mut self.pending
        }
    }

    #[test]
    fn record_is_write_through() {
        let mut counter = Counter::default();
        counter.record(5);
        counter.record(-2);

        assert_eq!(counter.total, 3);
        assert_eq!(counter.version(), 2);
        assert_eq!(counter.pending(), &[5, -2]);
    }

    #[test]
    fn take_pending_drains_the_buffer() {
        let mut counter = Counter::default();
        counter.record(1);

        assert_eq!(counter.take_pending(), vec![1]);
        assert!(counter.pending().is_empty());
        // State and version survive the drain.
        assert_eq!(counter.total, 1);
        assert_eq!(counter.version(), 1);
    }

    #[test]
    fn replay_rebuilds_identical_state() {
        let log = vec![3, 4, -1];

        let mut first = Counter::default();
        first.replay(log.clone());

        let mut second = Counter::default();
        second.replay(log);

        assert_eq!(first.total, second.total);
        assert_eq!(first.version(), second.version());
        assert!(first.pending().is_empty());
    }
}

//! Deferred reclamation invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoUseAfterReclaim | No node is freed while a validated hazard names it |
//! | BoundedReclamation | Pending records stay under a bound |
//! | ReclamationAccounting | retired = reclaimed + pending |
//! | SlotsWithinCapacity | Claimed hazard slots never exceed the table |
//!
//! `BoundedReclamation` defaults to the quiescent bound: once the last
//! reclamation pass has run with no concurrent retirements, only records
//! whose address is still watched can remain, and each claimed slot
//! watches at most one address.

use crate::counterexample::{Counterexample, MemoryIssue};
use crate::property::{PropertyChecker, PropertyResult};

/// Observable state of a reclamation domain.
pub trait ReclamationProperties {
    /// Nodes handed to the reclaimer.
    fn retired_count(&self) -> u64;

    /// Nodes whose destructor has run.
    fn reclaimed_count(&self) -> u64;

    /// Nodes retired but not yet reclaimed.
    fn pending_count(&self) -> u64;

    /// `(address, holder thread)` for every node freed while a validated
    /// hazard still named it. Empty unless the domain is instrumented.
    fn premature_reclaims(&self) -> Vec<(usize, u64)>;

    /// Fixed size of the hazard slot table.
    fn hazard_slots_capacity(&self) -> usize;

    /// Slots currently owned by a thread.
    fn claimed_slots_count(&self) -> usize;
}

/// Checks the reclamation invariants.
pub struct ReclamationPropertyChecker<'a, T: ReclamationProperties> {
    domain: &'a T,
    pending_bound: Option<u64>,
}

impl<'a, T: ReclamationProperties> ReclamationPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(domain: &'a T) -> Self {
        Self {
            domain,
            pending_bound: None,
        }
    }

    /// Replace the quiescent bound, e.g. while operations are in flight.
    #[must_use]
    pub fn with_pending_bound(mut self, bound: u64) -> Self {
        self.pending_bound = Some(bound);
        self
    }

    fn check_no_use_after_reclaim(&self) -> PropertyResult {
        let premature = self.domain.premature_reclaims();
        let Some(&(address, holder)) = premature.first() else {
            return PropertyResult::pass("NoUseAfterReclaim");
        };

        let mut ce = Counterexample::new();
        for &(address, holder_thread) in &premature {
            ce.add_memory_issue(MemoryIssue::UseAfterReclaim {
                address,
                holder_thread,
            });
        }
        PropertyResult::fail(
            "NoUseAfterReclaim",
            format!(
                "{} premature reclaim(s); first at 0x{address:x} held by thread {holder}",
                premature.len()
            ),
            Some(ce),
        )
    }

    fn check_bounded_reclamation(&self) -> PropertyResult {
        let pending = self.domain.pending_count();
        let bound = self
            .pending_bound
            .unwrap_or(self.domain.claimed_slots_count() as u64);

        if pending > bound {
            return PropertyResult::fail(
                "BoundedReclamation",
                format!(
                    "Pending reclamation {pending} exceeds bound {bound} (claimed slots={})",
                    self.domain.claimed_slots_count()
                ),
                None,
            );
        }
        PropertyResult::pass("BoundedReclamation")
    }

    fn check_accounting(&self) -> PropertyResult {
        let retired = self.domain.retired_count();
        let reclaimed = self.domain.reclaimed_count();
        let pending = self.domain.pending_count();

        if retired != reclaimed + pending {
            return PropertyResult::fail(
                "ReclamationAccounting",
                format!("retired={retired} but reclaimed={reclaimed} + pending={pending}"),
                None,
            );
        }
        PropertyResult::pass("ReclamationAccounting")
    }

    fn check_slots_within_capacity(&self) -> PropertyResult {
        let claimed = self.domain.claimed_slots_count();
        let capacity = self.domain.hazard_slots_capacity();

        if claimed > capacity {
            return PropertyResult::fail(
                "SlotsWithinCapacity",
                format!("{claimed} slots claimed from a table of {capacity}"),
                None,
            );
        }
        PropertyResult::pass("SlotsWithinCapacity")
    }
}

impl<T: ReclamationProperties> PropertyChecker for ReclamationPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_use_after_reclaim(),
            self.check_bounded_reclamation(),
            self.check_accounting(),
            self.check_slots_within_capacity(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Snapshot {
        retired: u64,
        reclaimed: u64,
        pending: u64,
        premature: Vec<(usize, u64)>,
        capacity: usize,
        claimed: usize,
    }

    impl ReclamationProperties for Snapshot {
        fn retired_count(&self) -> u64 {
            self.retired
        }

        fn reclaimed_count(&self) -> u64 {
            self.reclaimed
        }

        fn pending_count(&self) -> u64 {
            self.pending
        }

        fn premature_reclaims(&self) -> Vec<(usize, u64)> {
            self.premature.clone()
        }

        fn hazard_slots_capacity(&self) -> usize {
            self.capacity
        }

        fn claimed_slots_count(&self) -> usize {
            self.claimed
        }
    }

    #[test]
    fn test_quiescent_domain_passes() {
        let snapshot = Snapshot {
            retired: 10,
            reclaimed: 9,
            pending: 1,
            capacity: 4,
            claimed: 1,
            ..Snapshot::default()
        };

        let checker = ReclamationPropertyChecker::new(&snapshot);
        assert!(checker.all_hold(), "{}", checker.report());
    }

    #[test]
    fn test_premature_reclaim_detected() {
        let snapshot = Snapshot {
            premature: vec![(0xbeef, 3)],
            capacity: 4,
            ..Snapshot::default()
        };

        let failures = ReclamationPropertyChecker::new(&snapshot).failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "NoUseAfterReclaim");
        assert!(failures[0].violation.as_ref().unwrap().contains("0xbeef"));
    }

    #[test]
    fn test_pending_over_quiescent_bound() {
        let snapshot = Snapshot {
            retired: 5,
            pending: 5,
            capacity: 4,
            claimed: 2,
            ..Snapshot::default()
        };

        let checker = ReclamationPropertyChecker::new(&snapshot);
        assert_eq!(checker.failures()[0].name, "BoundedReclamation");
        assert!(checker.with_pending_bound(8).all_hold());
    }

    #[test]
    fn test_accounting_mismatch_detected() {
        let snapshot = Snapshot {
            retired: 5,
            reclaimed: 3,
            pending: 1,
            capacity: 4,
            claimed: 1,
            ..Snapshot::default()
        };

        let failures = ReclamationPropertyChecker::new(&snapshot).failures();
        assert_eq!(failures[0].name, "ReclamationAccounting");
    }
}

//! Stack wrapper that records what went in and out, for property checks.
//!
//! The tracker sits beside the stack, never inside it: `HazardStack`'s
//! push and pop stay lock-free, and the recording happens after each
//! operation completes. Under concurrency the recorded order is a
//! completion order, not a linearization, which is why LIFO replay is
//! only checked for single-thread histories.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use hs_core::{ReclamationProperties, StackHistory, StackProperties};
use hs_dst::DstTestableStack;

use crate::domain::Domain;
use crate::hazard::current_thread_id;
use crate::stack::HazardStack;

#[derive(Default)]
struct Tracker {
    pushed: HashSet<u64>,
    popped: Vec<u64>,
    history: StackHistory,
    step: u64,
}

/// `HazardStack<u64>` plus a record of every completed operation.
pub struct TrackedStack {
    stack: HazardStack<u64>,
    tracker: Mutex<Tracker>,
}

impl TrackedStack {
    #[must_use]
    pub fn new() -> Self {
        Self::with_domain(Arc::clone(Domain::global()))
    }

    #[must_use]
    pub fn with_domain(domain: Arc<Domain>) -> Self {
        Self {
            stack: HazardStack::with_domain(domain),
            tracker: Mutex::new(Tracker::default()),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &HazardStack<u64> {
        &self.stack
    }

    #[must_use]
    pub fn domain(&self) -> &Domain {
        self.stack.domain()
    }

    pub fn push(&self, value: u64) {
        self.stack.push(value);

        let mut tracker = self.tracker.lock().unwrap();
        let fresh = tracker.pushed.insert(value);
        debug_assert!(fresh, "value {value} pushed twice");
        tracker.step += 1;
        let step = tracker.step;
        tracker.history.record_push(current_thread_id(), value, step);
    }

    pub fn pop(&self) -> Option<u64> {
        let result = self.stack.pop();

        let mut tracker = self.tracker.lock().unwrap();
        tracker.popped.extend(result);
        tracker.step += 1;
        let step = tracker.step;
        tracker.history.record_pop(current_thread_id(), result, step);
        result
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Contents top to bottom. Only exact while the stack is quiescent.
    #[must_use]
    pub fn get_contents(&self) -> Vec<u64> {
        self.stack.snapshot()
    }
}

impl Default for TrackedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl StackProperties for TrackedStack {
    fn pushed_elements(&self) -> HashSet<u64> {
        self.tracker.lock().unwrap().pushed.clone()
    }

    fn popped_elements(&self) -> Vec<u64> {
        self.tracker.lock().unwrap().popped.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.get_contents()
    }

    fn history(&self) -> StackHistory {
        self.tracker.lock().unwrap().history.clone()
    }
}

impl ReclamationProperties for TrackedStack {
    fn retired_count(&self) -> u64 {
        self.domain().retired_count()
    }

    fn reclaimed_count(&self) -> u64 {
        self.domain().reclaimed_count()
    }

    fn pending_count(&self) -> u64 {
        self.domain().pending_count()
    }

    fn premature_reclaims(&self) -> Vec<(usize, u64)> {
        self.domain().premature_reclaims()
    }

    fn hazard_slots_capacity(&self) -> usize {
        self.domain().hazard_slots_capacity()
    }

    fn claimed_slots_count(&self) -> usize {
        self.domain().claimed_slots_count()
    }
}

impl DstTestableStack for TrackedStack {
    fn new() -> Self {
        TrackedStack::new()
    }

    fn push(&self, value: u64) {
        TrackedStack::push(self, value);
    }

    fn pop(&self) -> Option<u64> {
        TrackedStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        TrackedStack::is_empty(self)
    }

    fn get_contents(&self) -> Vec<u64> {
        TrackedStack::get_contents(self)
    }

    fn reclaim(&self) {
        self.domain().reclaim();
    }
}

//! Kani proof harnesses for the hazard stack.
//!
//! Bounded model checking of the sequential contract and of the
//! reclamation bookkeeping.
//!
//! # Running the proofs
//!
//! ```bash
//! cargo kani -p hs-stack
//! cargo kani -p hs-stack --harness proof_lifo_order
//! ```
//!
//! Kani does not explore thread interleavings. Concurrent behaviour is
//! covered by the loom models in `tests/loom_hazard.rs`.

#[cfg(kani)]
mod proofs {
    use std::sync::Arc;

    use crate::config::DomainConfig;
    use crate::domain::Domain;
    use crate::hazard::HazardRegistry;
    use crate::stack::HazardStack;

    fn small_stack() -> HazardStack<u64> {
        HazardStack::with_domain(Domain::new(DomainConfig::default().with_hazard_slots(2)).unwrap())
    }

    #[kani::proof]
    #[kani::unwind(5)]
    fn proof_pop_returns_pushed_value() {
        let stack = small_stack();
        let value: u64 = kani::any();

        stack.push(value);
        kani::assert(
            stack.pop() == Some(value),
            "Pop must return the value that was just pushed",
        );
        kani::assert(stack.pop().is_none(), "Stack must be empty again");
    }

    #[kani::proof]
    #[kani::unwind(5)]
    fn proof_lifo_order() {
        let stack = small_stack();
        let v1: u64 = kani::any();
        let v2: u64 = kani::any();
        kani::assume(v1 != v2);

        stack.push(v1);
        stack.push(v2);

        kani::assert(stack.pop() == Some(v2), "Last pushed must pop first");
        kani::assert(stack.pop() == Some(v1), "First pushed must pop last");
    }

    #[kani::proof]
    #[kani::unwind(8)]
    fn proof_pop_count_bounded() {
        let stack = small_stack();
        let mut pushed_count: u64 = 0;
        let mut popped_count: u64 = 0;

        for _ in 0..5u8 {
            if kani::any() {
                pushed_count += 1;
                stack.push(pushed_count);
            } else if stack.pop().is_some() {
                popped_count += 1;
            }
        }

        kani::assert(
            popped_count <= pushed_count,
            "Cannot pop more elements than pushed",
        );
    }

    /// With no concurrent readers every retired node is freed on the spot.
    #[kani::proof]
    #[kani::unwind(6)]
    fn proof_sequential_pops_leave_nothing_pending() {
        let domain = Domain::new(DomainConfig::default().with_hazard_slots(2)).unwrap();
        let stack = HazardStack::with_domain(Arc::clone(&domain));

        let n: u8 = kani::any();
        kani::assume(n <= 4);
        for i in 0..n {
            stack.push(u64::from(i));
        }
        while stack.pop().is_some() {}

        kani::assert(domain.pending_count() == 0, "Nothing may stay pending");
        let stats = domain.stats();
        kani::assert(stats.retired == u64::from(n), "Every pop retires a node");
        kani::assert(stats.reclaimed == stats.retired, "Every retired node is freed");
    }

    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_claim_respects_capacity() {
        let registry = HazardRegistry::with_capacity(2);
        let a: u64 = kani::any();
        let b: u64 = kani::any();
        let c: u64 = kani::any();
        kani::assume(a != 0 && b != 0 && c != 0);

        kani::assert(registry.try_claim(a).is_ok(), "First claim fits");
        kani::assert(registry.try_claim(b).is_ok(), "Second claim fits");
        kani::assert(registry.try_claim(c).is_err(), "Third claim must fail");
        kani::assert(registry.claimed_count() == 2, "Claims never exceed capacity");
    }
}

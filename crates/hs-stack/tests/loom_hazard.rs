//! Loom models of the hazard-pointer pop protocol.
//!
//! Under `--cfg loom` the stack head, the hazard slots and the
//! pending-delete list run on loom atomics, so these tests explore every
//! interleaving (up to the preemption bound) of the real `HazardStack`,
//! `HazardRegistry` and `Reclaimer`. A [`ReclaimAudit`] observer records
//! each validated hazard; freeing a node while any thread holds it fails
//! the model.
//!
//! Run with:
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test -p hs-stack --test loom_hazard --release
//! ```

#![cfg(loom)]

use std::sync::Arc;

use hs_stack::{Domain, DomainConfig, HazardStack, ReclaimAudit, ReclaimObserver};
use loom::sync::atomic::{AtomicPtr, Ordering};
use loom::thread;

/// Two spawned threads plus the model's main thread.
const SLOTS: usize = 3;

fn audited_stack() -> (Arc<HazardStack<u64>>, Arc<Domain>, Arc<ReclaimAudit>) {
    let audit = Arc::new(ReclaimAudit::new());
    let domain =
        Domain::with_observer(DomainConfig::default().with_hazard_slots(SLOTS), audit.clone())
            .unwrap();
    let stack = Arc::new(HazardStack::with_domain(Arc::clone(&domain)));
    (stack, domain, audit)
}

fn bounded(f: impl Fn() + Sync + Send + 'static) {
    let mut builder = loom::model::Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(f);
}

unsafe fn free_u64(address: *mut ()) {
    drop(Box::from_raw(address.cast::<u64>()));
}

/// Exactly one of two concurrent pops gets the only value.
#[test]
fn test_loom_concurrent_pop_single_value() {
    bounded(|| {
        let (stack, domain, audit) = audited_stack();
        stack.push(1);

        let s1 = Arc::clone(&stack);
        let s2 = Arc::clone(&stack);
        let h1 = thread::spawn(move || s1.pop());
        let h2 = thread::spawn(move || s2.pop());

        match (h1.join().unwrap(), h2.join().unwrap()) {
            (Some(1), None) | (None, Some(1)) => {}
            other => panic!("Unexpected result: {other:?}"),
        }
        assert!(audit.premature_reclaims().is_empty());
        assert_eq!(domain.stats().retired, 1);
    });
}

/// Two pops on a two-element stack: no value lost or returned twice, and
/// no node freed under a validated hazard.
#[test]
fn test_loom_concurrent_pops_no_use_after_reclaim() {
    bounded(|| {
        let (stack, _domain, audit) = audited_stack();
        stack.push(1);
        stack.push(2);

        let s1 = Arc::clone(&stack);
        let s2 = Arc::clone(&stack);
        let h1 = thread::spawn(move || s1.pop());
        let h2 = thread::spawn(move || s2.pop());

        let mut values = vec![h1.join().unwrap().unwrap(), h2.join().unwrap().unwrap()];
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
        assert!(
            audit.premature_reclaims().is_empty(),
            "freed under a hazard: {:?}",
            audit.premature_reclaims()
        );
    });
}

/// Push racing pop: the popped value plus what remains is exactly what
/// was pushed.
#[test]
fn test_loom_push_pop() {
    bounded(|| {
        let (stack, _domain, audit) = audited_stack();
        stack.push(1);

        let s1 = Arc::clone(&stack);
        let s2 = Arc::clone(&stack);
        let h1 = thread::spawn(move || s1.push(2));
        let h2 = thread::spawn(move || s2.pop());

        h1.join().unwrap();
        let popped = h2.join().unwrap();
        assert!(popped.is_some());

        let mut values: Vec<u64> = popped.into_iter().collect();
        while let Some(v) = stack.pop() {
            values.push(v);
        }
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
        assert!(audit.premature_reclaims().is_empty());
    });
}

/// Once every thread is done, one more pass reclaims every retired node.
#[test]
fn test_loom_reclamation_drains_when_quiescent() {
    bounded(|| {
        let (stack, domain, audit) = audited_stack();
        stack.push(1);
        stack.push(2);

        let s1 = Arc::clone(&stack);
        let s2 = Arc::clone(&stack);
        let h1 = thread::spawn(move || s1.pop());
        let h2 = thread::spawn(move || s2.pop());
        h1.join().unwrap();
        h2.join().unwrap();

        domain.reclaim();
        assert_eq!(domain.pending_count(), 0);
        let stats = domain.stats();
        assert_eq!(stats.retired, 2);
        assert_eq!(stats.reclaimed, 2);
        assert_eq!(audit.freed().len(), 2);
    });
}

/// A reader protects a shared pointer while a writer unlinks and retires
/// it. Retiring frees on the spot only when no validated hazard names
/// the address; otherwise the record waits for a later pass.
#[test]
fn test_loom_retire_fast_path_respects_hazard() {
    bounded(|| {
        let (_stack, domain, audit) = audited_stack();
        let value = Box::into_raw(Box::new(7u64));
        let shared = Arc::new(AtomicPtr::new(value));

        let reader = {
            let (domain, shared) = (Arc::clone(&domain), Arc::clone(&shared));
            thread::spawn(move || {
                let guard = domain.hazard_slot().unwrap();
                let protected = guard.protect(&shared);
                if !protected.is_null() {
                    // Safety: validated against `shared` while published.
                    assert_eq!(unsafe { *protected }, 7);
                }
            })
        };
        let writer = {
            let (domain, shared) = (Arc::clone(&domain), Arc::clone(&shared));
            thread::spawn(move || {
                let old = shared.swap(std::ptr::null_mut(), Ordering::SeqCst);
                // Safety: the swap unlinked `old`; it is retired once.
                unsafe { domain.retire(old.cast(), free_u64) };
            })
        };
        reader.join().unwrap();
        writer.join().unwrap();

        assert!(
            audit.premature_reclaims().is_empty(),
            "freed under a hazard: {:?}",
            audit.premature_reclaims()
        );
        domain.reclaim();
        assert_eq!(domain.pending_count(), 0);
        assert!(audit.was_freed(value as usize));
    });
}

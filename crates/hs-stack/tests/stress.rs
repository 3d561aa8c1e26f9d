//! Multi-threaded stress tests for `HazardStack`.
//!
//! Real OS threads push and pop with seeded delays while an audit
//! observer watches every validated hazard and every free. Meant to be run
//! under a memory-error detector as well:
//!
//! ```bash
//! RUSTFLAGS="-Zsanitizer=address" cargo +nightly test -p hs-stack --test stress \
//!     --target x86_64-unknown-linux-gnu
//! STRESS_THREADS=4 STRESS_OPS=200 cargo +nightly miri test -p hs-stack --test stress
//! ```

#![cfg(not(loom))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use hs_core::{PropertyChecker, ReclamationPropertyChecker, StackPropertyChecker};
use hs_dst::{get_or_generate_seed, run_stress, StressConfig};
use hs_stack::{
    Domain, DomainConfig, HazardStack, ReclaimAudit, ReclaimObserver, TrackedStack,
};

fn audited_domain() -> (Arc<Domain>, Arc<ReclaimAudit>) {
    let audit = Arc::new(ReclaimAudit::new());
    let domain = Domain::with_observer(DomainConfig::default(), audit.clone()).unwrap();
    (domain, audit)
}

/// 8 threads, 10^5 operations, then check conservation and that nothing
/// was freed under a validated hazard.
#[test]
fn test_stress_no_loss_no_double_return() {
    let seed = get_or_generate_seed();
    let (domain, audit) = audited_domain();
    let stack: HazardStack<u64> = HazardStack::with_domain(Arc::clone(&domain));
    let config = StressConfig::from_env(seed);

    let report = run_stress(&stack, &config);
    println!("{}", report.format());

    if let Err(violation) = report.verify() {
        panic!("{violation} ({})", report.format());
    }
    assert!(
        audit.premature_reclaims().is_empty(),
        "premature reclaims: {:?} (DST_SEED={seed})",
        audit.premature_reclaims()
    );
}

/// With no hazard held, a final pass leaves nothing pending and the
/// accounting balances.
#[test]
fn test_reclamation_drains_when_contention_subsides() {
    let seed = get_or_generate_seed();
    let (domain, _audit) = audited_domain();
    let stack: HazardStack<u64> = HazardStack::with_domain(Arc::clone(&domain));
    let config = StressConfig {
        operations_per_thread: 2_000,
        ..StressConfig::from_env(seed)
    };

    let report = run_stress(&stack, &config);
    report.verify().unwrap();

    domain.reclaim();
    assert_eq!(domain.pending_count(), 0, "DST_SEED={seed}");

    let checker = ReclamationPropertyChecker::new(&*domain);
    assert!(checker.all_hold(), "{}", checker.report());
    let stats = domain.stats();
    assert_eq!(stats.retired, (report.popped.len() + report.remaining.len()) as u64);
}

/// Pending records stay bounded while poppers run: a record outlives a
/// pass only while a live slot watches it, so each thread accounts for at
/// most one watched record plus one retired since its last pass. Once
/// the poppers are gone a final pass empties the list.
#[test]
fn test_pending_stays_bounded_under_load() {
    let (domain, _audit) = audited_domain();
    let stack = Arc::new(HazardStack::with_domain(Arc::clone(&domain)));
    let threads_count = 6;
    let max_pending = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(threads_count));

    let handles: Vec<_> = (0..threads_count as u64)
        .map(|t| {
            let (stack, domain, max_pending, barrier) = (
                stack.clone(),
                domain.clone(),
                max_pending.clone(),
                barrier.clone(),
            );
            thread::spawn(move || {
                barrier.wait();
                for i in 0..2_000u64 {
                    stack.push((t << 32) | i);
                    stack.pop();
                    let pending = domain.pending_count() as usize;
                    max_pending.fetch_max(pending, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let bound = threads_count * 2;
    assert!(
        max_pending.load(Ordering::Relaxed) <= bound,
        "pending peaked at {} (bound {bound})",
        max_pending.load(Ordering::Relaxed)
    );

    domain.reclaim();
    assert_eq!(domain.pending_count(), 0);
    let stats = domain.stats();
    assert_eq!(stats.retired, stats.reclaimed);
}

/// Concurrent history through the tracked wrapper: conservation holds
/// and LIFO replay is skipped for multi-thread histories.
#[test]
fn test_tracked_stack_concurrent_properties() {
    let (domain, _audit) = audited_domain();
    let stack = TrackedStack::with_domain(domain);

    thread::scope(|s| {
        for t in 0..4u64 {
            let stack = &stack;
            s.spawn(move || {
                for i in 1..=250u64 {
                    stack.push(t * 1_000 + i);
                    if i % 3 == 0 {
                        stack.pop();
                    }
                }
            });
        }
    });

    let checker = StackPropertyChecker::new(&stack);
    assert!(checker.all_hold(), "{}", checker.report());
    let reclamation = ReclamationPropertyChecker::new(&stack).with_pending_bound(u64::MAX);
    assert!(reclamation.all_hold(), "{}", reclamation.report());
}

/// Stacks sharing the process-wide domain keep independent contents.
#[test]
fn test_global_domain_shared_by_stacks() {
    let a = HazardStack::new();
    let b = HazardStack::new();
    assert!(Arc::ptr_eq(a.domain(), b.domain()));

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..500u64 {
                a.push(i);
            }
        });
        s.spawn(|| {
            for i in 0..500u64 {
                b.push(i + 10_000);
            }
        });
    });

    let mut from_a = 0;
    while let Some(v) = a.pop() {
        assert!(v < 500);
        from_a += 1;
    }
    let mut from_b = 0;
    while let Some(v) = b.pop() {
        assert!(v >= 10_000);
        from_b += 1;
    }
    assert_eq!((from_a, from_b), (500, 500));
}

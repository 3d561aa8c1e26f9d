//! Reclaimer.
//!
//! Frees retired nodes once no hazard slot names them. There is no
//! background thread: every pop ends with a [`Reclaimer::scan`], so the
//! pending list is drained by the same threads that fill it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(loom)]
use loom::sync::atomic::fence;
#[cfg(not(loom))]
use std::sync::atomic::fence;

use crate::hazard::HazardRegistry;
use crate::retire::{Destructor, ReclamationList};

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimPass {
    pub freed: u64,
    /// Records still watched and put back on the list
    pub deferred: u64,
}

impl ReclaimPass {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.freed == 0 && self.deferred == 0
    }
}

/// Running counters of a reclaimer.
#[derive(Debug, Default)]
pub struct ReclaimStats {
    retired: AtomicU64,
    reclaimed: AtomicU64,
    deferred: AtomicU64,
    passes: AtomicU64,
}

/// Point-in-time copy of [`ReclaimStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimSnapshot {
    pub retired: u64,
    pub reclaimed: u64,
    /// Times a record was found watched and requeued
    pub deferred: u64,
    pub passes: u64,
}

impl ReclaimStats {
    #[must_use]
    pub fn snapshot(&self) -> ReclaimSnapshot {
        ReclaimSnapshot {
            retired: self.retired.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }
}

/// Instrumentation hook for reclamation.
///
/// `on_protect` fires after a hazard is validated and `on_unprotect`
/// before it is cleared, so an observer's view of held addresses is
/// always a subset of what the registry protects.
pub trait ReclaimObserver: Send + Sync {
    fn on_protect(&self, _address: usize, _thread: u64) {}

    fn on_unprotect(&self, _thread: u64) {}

    /// Called immediately before the destructor of `address` runs.
    fn before_free(&self, address: usize);

    /// `(address, holder thread)` pairs freed while held.
    fn premature_reclaims(&self) -> Vec<(usize, u64)> {
        Vec::new()
    }
}

/// Observer that records every validated hazard and flags any free of an
/// address a thread still holds.
#[derive(Debug, Default)]
pub struct ReclaimAudit {
    /// Validated hazard per thread
    holds: Mutex<HashMap<u64, usize>>,
    freed: Mutex<Vec<usize>>,
    premature: Mutex<Vec<(usize, u64)>>,
}

impl ReclaimAudit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every address freed so far, in order.
    #[must_use]
    pub fn freed(&self) -> Vec<usize> {
        self.freed.lock().unwrap().clone()
    }

    #[must_use]
    pub fn was_freed(&self, address: usize) -> bool {
        self.freed.lock().unwrap().contains(&address)
    }
}

impl ReclaimObserver for ReclaimAudit {
    fn on_protect(&self, address: usize, thread: u64) {
        self.holds.lock().unwrap().insert(thread, address);
    }

    fn on_unprotect(&self, thread: u64) {
        self.holds.lock().unwrap().remove(&thread);
    }

    fn before_free(&self, address: usize) {
        let holds = self.holds.lock().unwrap();
        let mut premature = self.premature.lock().unwrap();
        premature.extend(
            holds
                .iter()
                .filter(|(_, held)| **held == address)
                .map(|(thread, _)| (address, *thread)),
        );
        self.freed.lock().unwrap().push(address);
    }

    fn premature_reclaims(&self) -> Vec<(usize, u64)> {
        self.premature.lock().unwrap().clone()
    }
}

/// Pending-delete list plus the policy for draining it.
pub struct Reclaimer {
    list: ReclamationList,
    stats: ReclaimStats,
    observer: Option<Arc<dyn ReclaimObserver>>,
}

impl Reclaimer {
    #[must_use]
    pub fn new(observer: Option<Arc<dyn ReclaimObserver>>) -> Self {
        Self {
            list: ReclamationList::new(),
            stats: ReclaimStats::default(),
            observer,
        }
    }

    #[inline]
    pub fn observer(&self) -> Option<&dyn ReclaimObserver> {
        self.observer.as_deref()
    }

    /// Hand over an unlinked node. Freed on the spot when nothing watches
    /// it, queued otherwise.
    ///
    /// # Safety
    ///
    /// `address` must be unreachable from any shared structure, retired at
    /// most once, and valid to pass to `destructor`.
    pub unsafe fn retire(&self, registry: &HazardRegistry, address: *mut (), destructor: Destructor) {
        self.stats.retired.fetch_add(1, Ordering::Relaxed);

        // Pairs with the fence between publish and re-read in `protect`.
        fence(Ordering::SeqCst);
        if registry.is_watched(address) {
            self.list.add(address, destructor);
            return;
        }
        if let Some(observer) = &self.observer {
            observer.before_free(address as usize);
        }
        destructor(address);
        self.stats.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain the list, free every unwatched record, requeue the rest.
    pub fn scan(&self, registry: &HazardRegistry) -> ReclaimPass {
        let mut pass = ReclaimPass::default();

        let drained = self.list.drain_all();
        fence(Ordering::SeqCst);
        for record in drained {
            let address = record.address();
            if registry.is_watched(address) {
                self.list.requeue(record);
                pass.deferred += 1;
                continue;
            }
            if let Some(observer) = &self.observer {
                observer.before_free(address as usize);
            }
            // Safety: unlinked before retirement and no hazard names it;
            // a later publish of this address cannot validate.
            unsafe { self.list.reclaim(record) };
            pass.freed += 1;
        }

        self.stats.passes.fetch_add(1, Ordering::Relaxed);
        if !pass.is_empty() {
            self.stats.reclaimed.fetch_add(pass.freed, Ordering::Relaxed);
            self.stats.deferred.fetch_add(pass.deferred, Ordering::Relaxed);
            tracing::trace!(freed = pass.freed, deferred = pass.deferred, "reclamation pass");
        }
        pass
    }

    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> u64 {
        self.list.pending_count()
    }

    #[must_use]
    pub fn stats(&self) -> ReclaimSnapshot {
        self.stats.snapshot()
    }
}

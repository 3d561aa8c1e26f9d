//! Hazard Pointer Registry.
//!
//! A fixed table of slots, each an `(owner, watched)` pair. A thread
//! claims one slot per domain on first use and keeps it until the thread
//! exits. While popping, it publishes the address of the node it is about
//! to dereference; the reclaimer frees nothing a slot names.
//!
//! # Protocol
//!
//! ```text
//! reader                          reclaimer
//! ------                          ---------
//! candidate = head                CAS head: X -> X.next
//! watched   = candidate           fence(SeqCst)
//! fence(SeqCst)                   is_watched(X)
//! head == candidate ?               watched: requeue
//!   yes: X is live, deref is safe   free:    destructor(X)
//!   no:  retry
//! ```
//!
//! The two fences are ordered one way or the other. If the reader's comes
//! first, the scan sees the hazard. If the reclaimer's comes first, the
//! re-read sees the new head and the reader retries.

use std::cell::{Cell, RefCell};
use std::ptr;
use std::rc::Rc;
use std::sync::{Arc, Weak};

#[cfg(loom)]
use loom::sync::atomic::{fence, AtomicPtr, AtomicU64, Ordering};
#[cfg(loom)]
use loom::thread_local;

#[cfg(not(loom))]
use std::sync::atomic::{fence, AtomicPtr, AtomicU64, Ordering};

use crate::domain::Domain;
use crate::error::{Error, Result};

/// Owner marker of a slot nobody holds.
pub const UNCLAIMED: u64 = 0;

// ============ Thread Identity ============

/// Global counter for thread identities. Starts at 1, 0 is `UNCLAIMED`.
static NEXT_THREAD_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);

    // Slots this thread owns, one per domain it has popped from.
    static SLOTS: RefCell<SlotCache> = RefCell::new(SlotCache::default());
}

/// Stable, process-unique, non-zero identity of the calling thread.
///
/// During thread-local teardown a fresh identity is handed out instead.
#[inline]
pub fn current_thread_id() -> u64 {
    THREAD_ID
        .try_with(|id| *id)
        .unwrap_or_else(|_| NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
}

// ============ Registry ============

/// One hazard slot, padded to a cache line so publishing never contends
/// with a neighbour.
#[repr(C, align(64))]
struct HazardSlot {
    owner: AtomicU64,
    watched: AtomicPtr<()>,
}

impl HazardSlot {
    fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNCLAIMED),
            watched: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

/// Fixed-capacity table of hazard slots.
pub struct HazardRegistry {
    slots: Box<[HazardSlot]>,
}

impl HazardRegistry {
    /// A table of `capacity` unclaimed slots. An empty table refuses every
    /// claim.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| HazardSlot::new()).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim an unclaimed slot for `owner`.
    pub fn try_claim(&self, owner: u64) -> Result<usize> {
        debug_assert_ne!(owner, UNCLAIMED);

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.owner.load(Ordering::Relaxed) != UNCLAIMED {
                continue;
            }
            if slot
                .owner
                .compare_exchange(UNCLAIMED, owner, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(owner, index, "hazard slot claimed");
                }
                return Ok(index);
            }
        }

        let capacity = self.capacity();
        tracing::warn!(owner, capacity, "hazard slots exhausted");
        Err(Error::SlotsExhausted { capacity })
    }

    /// Give a slot back. The watch is cleared before the owner so the
    /// next claimant never inherits a stale hazard.
    pub fn release(&self, index: usize, owner: u64) {
        let slot = &self.slots[index];
        slot.watched.store(ptr::null_mut(), Ordering::SeqCst);
        let released = slot
            .owner
            .compare_exchange(owner, UNCLAIMED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok();
        debug_assert!(released, "slot {index} released by a thread that does not own it");
        tracing::trace!(owner, index, "hazard slot released");
    }

    #[inline]
    pub fn publish(&self, index: usize, address: *mut ()) {
        self.slots[index].watched.store(address, Ordering::SeqCst);
    }

    #[inline]
    pub fn clear(&self, index: usize) {
        self.slots[index].watched.store(ptr::null_mut(), Ordering::SeqCst);
    }

    /// Whether any slot currently names `address`.
    ///
    /// A snapshot: a slot may start watching `address` right after the
    /// scan passes it. That is still safe for an unlinked node, because
    /// the watcher's re-read of the head will not validate it. Callers
    /// issue a `SeqCst` fence between unlinking and this scan.
    pub fn is_watched(&self, address: *mut ()) -> bool {
        debug_assert!(!address.is_null());
        self.slots
            .iter()
            .any(|slot| slot.watched.load(Ordering::SeqCst) == address)
    }

    #[must_use]
    pub fn claimed_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.owner.load(Ordering::Acquire) != UNCLAIMED)
            .count()
    }

    /// Addresses currently watched, for diagnostics.
    #[must_use]
    pub fn watched_addresses(&self) -> Vec<usize> {
        self.slots
            .iter()
            .map(|slot| slot.watched.load(Ordering::SeqCst) as usize)
            .filter(|address| *address != 0)
            .collect()
    }
}

// ============ Per-Thread Slot Cache ============

struct CachedSlot {
    domain: Weak<Domain>,
    index: usize,
    owner: u64,
    /// Set while a guard on this slot is alive.
    leased: Rc<Cell<bool>>,
}

#[derive(Default)]
struct SlotCache {
    entries: Vec<CachedSlot>,
}

impl SlotCache {
    fn lease(&mut self, domain: &Arc<Domain>, owner: u64) -> Result<(usize, Rc<Cell<bool>>)> {
        // Domains that are gone took their registry with them.
        self.entries.retain(|entry| entry.domain.strong_count() > 0);

        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| ptr::eq(entry.domain.as_ptr(), Arc::as_ptr(domain)))
        {
            if entry.leased.replace(true) {
                return Err(Error::SlotInUse);
            }
            return Ok((entry.index, Rc::clone(&entry.leased)));
        }

        let index = domain.registry().try_claim(owner)?;
        let leased = Rc::new(Cell::new(true));
        self.entries.push(CachedSlot {
            domain: Arc::downgrade(domain),
            index,
            owner,
            leased: Rc::clone(&leased),
        });
        Ok((index, leased))
    }
}

impl Drop for SlotCache {
    fn drop(&mut self) {
        for entry in self.entries.drain(..) {
            if let Some(domain) = entry.domain.upgrade() {
                domain.registry().release(entry.index, entry.owner);
            }
        }
    }
}

/// Hand out the calling thread's slot in `domain`, claiming it on first use.
pub(crate) fn acquire(domain: &Arc<Domain>) -> Result<HazardGuard<'_>> {
    let owner = current_thread_id();
    match SLOTS.try_with(|cache| cache.borrow_mut().lease(domain, owner)) {
        Ok(leased) => {
            let (index, lease) = leased?;
            Ok(HazardGuard {
                domain,
                index,
                owner,
                lease: Some(lease),
            })
        }
        // The cache is already torn down: borrow a slot for this call only.
        Err(_) => Ok(HazardGuard {
            domain,
            index: domain.registry().try_claim(owner)?,
            owner,
            lease: None,
        }),
    }
}

// ============ Guard ============

/// Per-call handle on the calling thread's hazard slot.
///
/// A thread holds at most one live guard per domain; asking for a second
/// fails with [`Error::SlotInUse`]. Dropping the guard clears the watch.
///
/// A guard stays on the thread that took it:
///
/// ```compile_fail
/// use hs_stack::{Domain, DomainConfig};
///
/// fn assert_send<T: Send>(_: T) {}
///
/// let domain = Domain::new(DomainConfig::default()).unwrap();
/// assert_send(domain.hazard_slot().unwrap());
/// ```
pub struct HazardGuard<'d> {
    domain: &'d Domain,
    index: usize,
    owner: u64,
    /// `None` for a slot claimed after thread-local teardown, released on
    /// drop. The `Rc` keeps the guard on its thread.
    lease: Option<Rc<Cell<bool>>>,
}

impl HazardGuard<'_> {
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Load `src` and publish it until the published value is still what
    /// `src` holds. The returned pointer, if non-null, stays live until
    /// this guard is cleared, protects something else, or is dropped.
    pub fn protect<T>(&self, src: &AtomicPtr<T>) -> *mut T {
        // The previous hold ends as soon as the slot is overwritten.
        if let Some(observer) = self.domain.observer() {
            observer.on_unprotect(self.owner);
        }
        let mut candidate = src.load(Ordering::SeqCst);
        loop {
            if candidate.is_null() {
                self.clear();
                return candidate;
            }
            self.domain.registry().publish(self.index, candidate.cast());
            fence(Ordering::SeqCst);

            let current = src.load(Ordering::SeqCst);
            if current == candidate {
                if let Some(observer) = self.domain.observer() {
                    observer.on_protect(candidate as usize, self.owner);
                }
                return candidate;
            }
            candidate = current;
            #[cfg(loom)]
            loom::thread::yield_now();
        }
    }

    /// Publish `address` without validation. The caller must fence and
    /// check that the node is still reachable afterwards.
    #[inline]
    pub fn publish(&self, address: *mut ()) {
        self.domain.registry().publish(self.index, address);
    }

    #[inline]
    pub fn clear(&self) {
        if let Some(observer) = self.domain.observer() {
            observer.on_unprotect(self.owner);
        }
        self.domain.registry().clear(self.index);
    }
}

impl Drop for HazardGuard<'_> {
    fn drop(&mut self) {
        self.clear();
        match &self.lease {
            Some(lease) => lease.set(false),
            None => self.domain.registry().release(self.index, self.owner),
        }
    }
}

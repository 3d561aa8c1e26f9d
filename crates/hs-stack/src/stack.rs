//! Lock-free Treiber stack with hazard-pointer reclamation.
//!
//! # Invariants
//!
//! | Property | Verified By |
//! |----------|-------------|
//! | NoLostElements | DST, stress, loom |
//! | NoDuplicates | DST, loom |
//! | NoDoubleReturn | DST, stress, loom |
//! | LIFO_Order | DST (single thread) |
//! | NoUseAfterReclaim | audit observer, stress under ASan/Miri |
//!
//! # Node lifecycle
//!
//! ```text
//! push ──> live ──(pop CAS)──> unlinked-pending ──(no hazard)──> reclaimed
//!                                    │    ▲
//!                                    └────┘ watched: requeued
//! ```
//!
//! A node's `next` is written only before the push CAS publishes it and
//! never again, so readers holding a hazard may read it freely.

use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::Arc;

#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, Ordering};

#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, Ordering};

use hs_dst::DstTestableStack;

use crate::domain::Domain;
use crate::error::Result;

struct Node<T> {
    /// Moved out by the popping thread; the node is freed without it.
    value: ManuallyDrop<T>,
    next: *mut Node<T>,
}

/// Destructor handed to the reclaimer: frees the node, not the value.
unsafe fn free_node<T>(address: *mut ()) {
    drop(Box::from_raw(address.cast::<Node<T>>()));
}

/// An unbounded lock-free LIFO stack.
///
/// Operations are linearizable and lock-free. Popped nodes are retired to
/// the stack's [`Domain`] and freed once no thread's hazard names them.
pub struct HazardStack<T> {
    head: AtomicPtr<Node<T>>,
    domain: Arc<Domain>,
    _owns: PhantomData<Box<Node<T>>>,
}

impl<T> HazardStack<T> {
    /// Empty stack in the process-wide domain.
    #[must_use]
    pub fn new() -> Self {
        Self::with_domain(Arc::clone(Domain::global()))
    }

    #[must_use]
    pub fn with_domain(domain: Arc<Domain>) -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            domain,
            _owns: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Push a value onto the stack.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            value: ManuallyDrop::new(value),
            next: ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // Safety: `node` is not shared until the CAS succeeds.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => {
                    head = current;
                    #[cfg(loom)]
                    loom::thread::yield_now();
                }
            }
        }
    }

    /// Pop the top value, `Ok(None)` when empty.
    ///
    /// Fails when the calling thread has no hazard slot yet and the
    /// domain's table is full, or when the thread already holds a
    /// [`HazardGuard`](crate::HazardGuard) in the stack's domain. Every
    /// successful call ends with a reclamation pass.
    pub fn try_pop(&self) -> Result<Option<T>> {
        let unlinked = {
            let guard = self.domain.hazard_slot()?;
            loop {
                let head = guard.protect(&self.head);
                if head.is_null() {
                    break None;
                }
                // Safety: `head` was validated and stays live while watched.
                let next = unsafe { (*head).next };
                if self
                    .head
                    .compare_exchange(head, next, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    guard.clear();
                    break Some(head);
                }
                #[cfg(loom)]
                loom::thread::yield_now();
            }
        };

        let value = unlinked.map(|node| unsafe {
            // Safety: the CAS made this thread the node's only owner; other
            // hazard holders only ever read `next`.
            let value = ManuallyDrop::into_inner(ptr::read(ptr::addr_of!((*node).value)));
            self.domain.retire(node.cast(), free_node::<T>);
            value
        });

        self.domain.reclaim();
        Ok(value)
    }

    /// Pop the top value, `None` when empty.
    ///
    /// # Panics
    ///
    /// When the domain has no hazard slot left for this thread, or the
    /// thread already holds a guard in the domain. The table is sized to
    /// the maximum number of concurrent poppers, so both are usage errors.
    pub fn pop(&self) -> Option<T> {
        match self.try_pop() {
            Ok(value) => value,
            Err(e) => panic!("pop failed: {e}"),
        }
    }

    /// Whether the stack was empty at the instant of the load.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Contents top to bottom.
    ///
    /// Pops everything and pushes it back, so it is memory safe under any
    /// interleaving but only exact while no other thread uses the stack.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut drained = Vec::new();
        while let Some(value) = self.pop() {
            drained.push(value);
        }
        let contents = drained.clone();
        for value in drained.into_iter().rev() {
            self.push(value);
        }
        contents
    }
}

impl<T> Default for HazardStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for HazardStack<T> {
    fn drop(&mut self) {
        // Exclusive access: nobody can be inside push or pop.
        let mut current = self.head.load(Ordering::Acquire);
        while !current.is_null() {
            // Safety: live nodes are owned by the chain alone.
            let mut node = unsafe { Box::from_raw(current) };
            current = node.next;
            unsafe { ManuallyDrop::drop(&mut node.value) };
        }
        self.domain.reclaim();
    }
}

// Safety: values cross threads through push/pop; nodes are only freed
// once no hazard names them.
unsafe impl<T: Send> Send for HazardStack<T> {}
unsafe impl<T: Send> Sync for HazardStack<T> {}

impl DstTestableStack for HazardStack<u64> {
    fn new() -> Self {
        HazardStack::new()
    }

    fn push(&self, value: u64) {
        HazardStack::push(self, value);
    }

    fn pop(&self) -> Option<u64> {
        HazardStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        HazardStack::is_empty(self)
    }

    fn get_contents(&self) -> Vec<u64> {
        self.snapshot()
    }

    fn reclaim(&self) {
        self.domain.reclaim();
    }
}

//! Reclamation List.
//!
//! A lock-free singly-linked list of pending-delete records, pushed with
//! the same head CAS loop as the stack. The reclaimer takes the whole
//! list in one `swap` and scans it privately while other threads keep
//! adding to a fresh list.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::AtomicU64;

#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, Ordering};

#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, Ordering};

/// Type-erased destructor for a retired address.
pub type Destructor = unsafe fn(*mut ());

/// A retired address waiting for its destructor.
pub struct RetireRecord {
    address: *mut (),
    destructor: Destructor,
    next: *mut RetireRecord,
}

impl RetireRecord {
    #[inline]
    #[must_use]
    pub fn address(&self) -> *mut () {
        self.address
    }
}

/// List of records retired but not yet reclaimed.
pub struct ReclamationList {
    head: AtomicPtr<RetireRecord>,
    pending: AtomicU64,
}

impl ReclamationList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            pending: AtomicU64::new(0),
        }
    }

    /// Queue `address` for deferred destruction.
    pub fn add(&self, address: *mut (), destructor: Destructor) {
        debug_assert!(!address.is_null());
        let record = Box::into_raw(Box::new(RetireRecord {
            address,
            destructor,
            next: ptr::null_mut(),
        }));
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.link(record, record);
    }

    /// Put a drained record back. Accounting is unchanged: it never
    /// stopped being pending.
    pub fn requeue(&self, record: Box<RetireRecord>) {
        let record = Box::into_raw(record);
        self.link(record, record);
    }

    /// Link the chain `first..=last` in front of the current head.
    fn link(&self, first: *mut RetireRecord, last: *mut RetireRecord) {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // Safety: `last` is not yet shared; only this thread writes it.
            unsafe { (*last).next = head };
            match self
                .head
                .compare_exchange_weak(head, first, Ordering::Release, Ordering::Relaxed)
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

    /// Detach every record at once.
    ///
    /// Records the caller does not consume are linked back when the chain
    /// is dropped.
    pub fn drain_all(&self) -> RetiredChain<'_> {
        RetiredChain {
            list: self,
            next: self.head.swap(ptr::null_mut(), Ordering::Acquire),
            _owned: PhantomData,
        }
    }

    /// Run the record's destructor and forget the record.
    ///
    /// # Safety
    ///
    /// No thread may access the record's address again.
    pub unsafe fn reclaim(&self, record: Box<RetireRecord>) {
        (record.destructor)(record.address);
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records added and not yet reclaimed.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }
}

impl Default for ReclamationList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReclamationList {
    fn drop(&mut self) {
        // Exclusive access; the load only has to see the last link.
        let mut current = self.head.load(Ordering::Acquire);
        while !current.is_null() {
            // Safety: exclusive access, and no thread can hold a hazard
            // into a domain that is being dropped.
            let record = unsafe { Box::from_raw(current) };
            current = record.next;
            unsafe { (record.destructor)(record.address) };
        }
    }
}

/// Records detached by [`ReclamationList::drain_all`].
pub struct RetiredChain<'a> {
    list: &'a ReclamationList,
    next: *mut RetireRecord,
    _owned: PhantomData<Box<RetireRecord>>,
}

impl Iterator for RetiredChain<'_> {
    type Item = Box<RetireRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        // Safety: the swap made this chain private to us.
        let mut record = unsafe { Box::from_raw(self.next) };
        self.next = std::mem::replace(&mut record.next, ptr::null_mut());
        Some(record)
    }
}

impl Drop for RetiredChain<'_> {
    fn drop(&mut self) {
        if self.next.is_null() {
            return;
        }
        let first = self.next;
        let mut last = first;
        // Safety: the remaining chain is still private to us.
        unsafe {
            while !(*last).next.is_null() {
                last = (*last).next;
            }
        }
        self.list.link(first, last);
    }
}

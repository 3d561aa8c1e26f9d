//! Reclamation domain.
//!
//! A domain owns one hazard table and one pending-delete list. Stacks
//! sharing a domain share both; a stack with its own domain keeps its
//! reclamation bookkeeping private. Threads cache one slot per domain.

use std::sync::{Arc, OnceLock};

use hs_core::ReclamationProperties;

use crate::config::DomainConfig;
use crate::error::Result;
use crate::hazard::{self, HazardGuard, HazardRegistry};
use crate::reclaim::{ReclaimObserver, ReclaimPass, ReclaimSnapshot, Reclaimer};
use crate::retire::Destructor;

static GLOBAL: OnceLock<Arc<Domain>> = OnceLock::new();

pub struct Domain {
    config: DomainConfig,
    registry: HazardRegistry,
    reclaimer: Reclaimer,
}

impl Domain {
    /// Build a domain after validating `config`.
    pub fn new(config: DomainConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::build(config, None))
    }

    /// A domain that reports every protect, unprotect and free to
    /// `observer`.
    pub fn with_observer(
        config: DomainConfig,
        observer: Arc<dyn ReclaimObserver>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::build(config, Some(observer)))
    }

    fn build(config: DomainConfig, observer: Option<Arc<dyn ReclaimObserver>>) -> Arc<Self> {
        Arc::new(Self {
            registry: HazardRegistry::with_capacity(config.hazard_slots_count),
            reclaimer: Reclaimer::new(observer),
            config,
        })
    }

    /// Process-wide default domain, created on first use.
    pub fn global() -> &'static Arc<Domain> {
        GLOBAL.get_or_init(|| Self::build(DomainConfig::default(), None))
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &HazardRegistry {
        &self.registry
    }

    #[inline]
    pub(crate) fn observer(&self) -> Option<&dyn ReclaimObserver> {
        self.reclaimer.observer()
    }

    /// The calling thread's hazard slot, claimed on first use and kept
    /// until the thread exits.
    ///
    /// Fails with [`Error::SlotsExhausted`](crate::Error::SlotsExhausted)
    /// when every slot belongs to another live thread, and with
    /// [`Error::SlotInUse`](crate::Error::SlotInUse) while this thread
    /// already holds a guard in this domain.
    pub fn hazard_slot(self: &Arc<Self>) -> Result<HazardGuard<'_>> {
        hazard::acquire(self)
    }

    /// Retire an unlinked node.
    ///
    /// # Safety
    ///
    /// `address` must no longer be reachable from any shared structure,
    /// must be retired once, and `destructor(address)` must be sound once
    /// no hazard names it.
    pub unsafe fn retire(&self, address: *mut (), destructor: Destructor) {
        self.reclaimer.retire(&self.registry, address, destructor);
    }

    /// Run one reclamation pass.
    pub fn reclaim(&self) -> ReclaimPass {
        self.reclaimer.scan(&self.registry)
    }

    #[must_use]
    pub fn pending_count(&self) -> u64 {
        self.reclaimer.pending_count()
    }

    #[must_use]
    pub fn stats(&self) -> ReclaimSnapshot {
        self.reclaimer.stats()
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("hazard_slots_count", &self.config.hazard_slots_count)
            .field("claimed_slots", &self.registry.claimed_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl ReclamationProperties for Domain {
    fn retired_count(&self) -> u64 {
        self.stats().retired
    }

    fn reclaimed_count(&self) -> u64 {
        self.stats().reclaimed
    }

    fn pending_count(&self) -> u64 {
        Domain::pending_count(self)
    }

    fn premature_reclaims(&self) -> Vec<(usize, u64)> {
        self.observer()
            .map(|observer| observer.premature_reclaims())
            .unwrap_or_default()
    }

    fn hazard_slots_capacity(&self) -> usize {
        self.registry.capacity()
    }

    fn claimed_slots_count(&self) -> usize {
        self.registry.claimed_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reclaim::ReclaimAudit;
    use hs_core::{PropertyChecker, ReclamationPropertyChecker};

    unsafe fn free_u64(address: *mut ()) {
        drop(Box::from_raw(address.cast::<u64>()));
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(Domain::global(), Domain::global()));
        assert_eq!(Domain::global().registry().capacity(), 100);
    }

    #[test]
    fn test_zero_slots_rejected() {
        let err = Domain::new(DomainConfig::default().with_hazard_slots(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let audit = Arc::new(ReclaimAudit::new());
        assert!(Domain::with_observer(DomainConfig::default().with_hazard_slots(0), audit).is_err());
    }

    #[test]
    fn test_retire_and_reclaim_accounting() {
        let audit = Arc::new(ReclaimAudit::new());
        let domain = Domain::with_observer(DomainConfig::default().with_hazard_slots(4), audit).unwrap();

        let guard = domain.hazard_slot().unwrap();
        let held = Box::into_raw(Box::new(1u64)).cast::<()>();
        guard.publish(held);

        unsafe {
            domain.retire(held, free_u64);
            domain.retire(Box::into_raw(Box::new(2u64)).cast(), free_u64);
        }
        assert_eq!(domain.pending_count(), 1);

        let checker = ReclamationPropertyChecker::new(&*domain);
        assert!(checker.all_hold(), "{}", checker.report());

        drop(guard);
        assert_eq!(domain.reclaim().freed, 1);
        assert_eq!(domain.pending_count(), 0);
        assert!(ReclamationPropertyChecker::new(&*domain).all_hold());
    }

    #[test]
    fn test_drop_frees_pending() {
        let domain = Domain::new(DomainConfig::default()).unwrap();
        let guard = domain.hazard_slot().unwrap();
        let held = Box::into_raw(Box::new(3u64)).cast::<()>();
        guard.publish(held);
        unsafe { domain.retire(held, free_u64) };
        drop(guard);

        assert_eq!(domain.pending_count(), 1);
        drop(domain);
    }
}

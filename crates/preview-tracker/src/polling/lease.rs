//! Single-owner lease for the polling runtime.
//!
//! Only one runtime per registry may poll at a time. The registry is a plain
//! cloneable handle, so tests and embedders can create isolated ones;
//! [`OwnershipRegistry::global`] is the process-wide default.
//!
//! The registry also carries the set of jobs with a status check in flight.
//! It outlives any single owner, so a remounted runtime still sees checks its
//! predecessor started until they resolve.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

static GLOBAL: OnceLock<OwnershipRegistry> = OnceLock::new();
static NEXT_LEASE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Default)]
pub struct OwnershipRegistry {
    holder: Arc<Mutex<Option<u64>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> OwnershipRegistry {
        GLOBAL.get_or_init(OwnershipRegistry::new).clone()
    }

    pub(crate) fn in_flight(&self) -> Arc<Mutex<HashSet<String>>> {
        Arc::clone(&self.in_flight)
    }

    fn lock(&self) -> MutexGuard<'_, Option<u64>> {
        match self.holder.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Ownership registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Takes the lease if nobody holds it.
    pub fn acquire(&self) -> Option<OwnershipLease> {
        let mut holder = self.lock();
        if holder.is_some() {
            return None;
        }
        let id = NEXT_LEASE.fetch_add(1, Ordering::Relaxed);
        *holder = Some(id);
        Some(OwnershipLease {
            registry: self.clone(),
            id,
        })
    }

    pub fn is_held(&self) -> bool {
        self.lock().is_some()
    }

    /// Gives the lease back. Equivalent to dropping it.
    pub fn release(&self, lease: OwnershipLease) {
        drop(lease);
    }

    fn release_id(&self, id: u64) {
        let mut holder = self.lock();
        if *holder == Some(id) {
            *holder = None;
        }
    }
}

/// Proof of ownership. Released when dropped.
#[derive(Debug)]
pub struct OwnershipLease {
    registry: OwnershipRegistry,
    id: u64,
}

impl OwnershipLease {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for OwnershipLease {
    fn drop(&mut self) {
        self.registry.release_id(self.id);
    }
}

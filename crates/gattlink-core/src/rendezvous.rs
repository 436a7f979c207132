//! Counting wait/signal points bridging transport callbacks to blocked callers

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::state::PendingOperation;

// ----------------------------------------------------------------------------
// Rendezvous Primitive
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    permits: usize,
    waiters: usize,
}

/// A counting signal with an initial count of zero.
///
/// Completions call [`signal`](Self::signal); the blocked operation calls
/// [`wait`](Self::wait) or [`wait_timeout`](Self::wait_timeout) and consumes
/// one permit when it wakes.
#[derive(Debug)]
pub struct Rendezvous {
    name: &'static str,
    counters: Mutex<Counters>,
    cond: Condvar,
}

impl Rendezvous {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            counters: Mutex::new(Counters::default()),
            cond: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add one permit and wake a waiter
    pub fn signal(&self) {
        let mut counters = self.counters.lock();
        counters.permits += 1;
        trace!(rendezvous = self.name, permits = counters.permits, "signal");
        self.cond.notify_one();
    }

    /// Block until a permit is available, then consume it
    pub fn wait(&self) {
        let mut counters = self.counters.lock();
        counters.waiters += 1;
        while counters.permits == 0 {
            self.cond.wait(&mut counters);
        }
        counters.waiters -= 1;
        counters.permits -= 1;
    }

    /// Block until a permit is available or `timeout` elapses.
    ///
    /// Returns `true` when a permit was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counters = self.counters.lock();
        counters.waiters += 1;
        while counters.permits == 0 {
            if self.cond.wait_until(&mut counters, deadline).timed_out() {
                break;
            }
        }
        counters.waiters -= 1;
        if counters.permits > 0 {
            counters.permits -= 1;
            true
        } else {
            trace!(rendezvous = self.name, ?timeout, "wait timed out");
            false
        }
    }

    /// Consume one permit if one is pending
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_up_to(1) == 1
    }

    /// Consume at most `max` pending permits, returning how many were taken
    pub fn try_acquire_up_to(&self, max: usize) -> usize {
        let mut counters = self.counters.lock();
        let taken = counters.permits.min(max);
        counters.permits -= taken;
        taken
    }

    /// Release one permit to a thread that is currently waiting.
    ///
    /// Does nothing when every waiter already has a permit available, so it
    /// never leaves a stale permit behind. Returns whether a permit was added.
    pub fn interrupt(&self) -> bool {
        let mut counters = self.counters.lock();
        if counters.waiters > counters.permits {
            counters.permits += 1;
            trace!(rendezvous = self.name, "interrupted waiter");
            self.cond.notify_one();
            true
        } else {
            false
        }
    }

    /// Discard every pending permit, returning how many there were
    pub fn drain(&self) -> usize {
        let mut counters = self.counters.lock();
        std::mem::take(&mut counters.permits)
    }

    pub fn pending(&self) -> usize {
        self.counters.lock().permits
    }

    pub fn waiters(&self) -> usize {
        self.counters.lock().waiters
    }
}

// ----------------------------------------------------------------------------
// Rendezvous Set
// ----------------------------------------------------------------------------

/// One rendezvous per asynchronous operation class
#[derive(Debug)]
pub(crate) struct RendezvousSet {
    pub connect: Rendezvous,
    pub disconnect: Rendezvous,
    pub discover_services: Rendezvous,
    pub discover_characteristics: Rendezvous,
    pub configure: Rendezvous,
    pub read: Rendezvous,
}

impl RendezvousSet {
    pub fn new() -> Self {
        Self {
            connect: Rendezvous::new("connect"),
            disconnect: Rendezvous::new("disconnect"),
            discover_services: Rendezvous::new("discover-services"),
            discover_characteristics: Rendezvous::new("discover-characteristics"),
            configure: Rendezvous::new("configure-notification"),
            read: Rendezvous::new("read-notification"),
        }
    }

    pub fn all(&self) -> [&Rendezvous; 6] {
        [
            &self.connect,
            &self.disconnect,
            &self.discover_services,
            &self.discover_characteristics,
            &self.configure,
            &self.read,
        ]
    }

    pub fn for_operation(&self, operation: PendingOperation) -> &Rendezvous {
        match operation {
            PendingOperation::DiscoverServices => &self.discover_services,
            PendingOperation::DiscoverCharacteristics => &self.discover_characteristics,
            PendingOperation::ConfigureNotification => &self.configure,
        }
    }

    /// Drain every rendezvous, returning the total number of discarded permits
    pub fn drain_all(&self) -> usize {
        self.all().iter().map(|r| r.drain()).sum()
    }
}

//! Queue of unsolicited characteristic-change events

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::rendezvous::Rendezvous;

/// A characteristic value pushed by the remote device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification<C> {
    pub characteristic: C,
    pub value: Vec<u8>,
}

impl<C> Notification<C> {
    pub fn new(characteristic: C, value: Vec<u8>) -> Self {
        Self {
            characteristic,
            value,
        }
    }
}

/// FIFO buffer shared by the event sink (producer) and `read` (consumer).
///
/// Uses its own lock so neither side contends with the session state lock.
/// The ready rendezvous is signaled and consumed under the same lock, which
/// keeps its permit count equal to the queue length (plus interrupts).
#[derive(Debug)]
pub(crate) struct NotificationQueue<C> {
    items: Mutex<VecDeque<Notification<C>>>,
}

impl<C> NotificationQueue<C> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append one notification and signal `ready`
    pub fn push(&self, notification: Notification<C>, ready: &Rendezvous) {
        let mut items = self.items.lock();
        items.push_back(notification);
        ready.signal();
    }

    /// Move every queued notification into `out`.
    ///
    /// The caller has already consumed one permit from `ready`; the permits of
    /// the remaining drained items are consumed here so a coalesced batch
    /// counts as one delivery.
    pub fn drain_into(&self, out: &mut Vec<Notification<C>>, ready: &Rendezvous) -> usize {
        let mut items = self.items.lock();
        let drained = items.len();
        if drained > 1 {
            ready.try_acquire_up_to(drained - 1);
        }
        out.extend(items.drain(..));
        drained
    }

    /// Drop every queued notification together with all `ready` permits
    pub fn clear(&self, ready: &Rendezvous) -> usize {
        let mut items = self.items.lock();
        let cleared = items.len();
        items.clear();
        ready.drain();
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

//! Single-slot delivery channel with change detection.
//!
//! Holds at most one undelivered render. Offers never block: when the slot is
//! already occupied the new render is dropped and the older one stays queued.
//! The fingerprint and the slot share one lock so a concurrent take never
//! observes a half-applied update.

use std::sync::Mutex;

use crate::fingerprint::Fingerprint;

/// Outcome of offering a fresh render to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Same content as the last delivered render; nothing queued.
    Unchanged,
    /// Content changed and was queued for the caller.
    Queued,
    /// Content changed but the slot still held an unread render.
    Dropped,
}

struct SlotState {
    pending: Option<String>,
    last_delivered: Fingerprint,
}

pub struct DeliverySlot {
    state: Mutex<SlotState>,
}

impl DeliverySlot {
    /// Creates the slot with `initial` recorded as last delivered and queued.
    pub fn new(initial: String) -> Self {
        let slot = Self {
            state: Mutex::new(SlotState {
                pending: None,
                last_delivered: Fingerprint::of(&initial),
            }),
        };
        slot.try_put(initial);
        slot
    }

    /// Queues `content` if its fingerprint differs from the last delivered one.
    pub fn offer(&self, content: String) -> Offer {
        let fingerprint = Fingerprint::of(&content);
        let mut state = self.lock();
        if fingerprint == state.last_delivered {
            return Offer::Unchanged;
        }
        state.last_delivered = fingerprint;
        if Self::put_locked(&mut state, content) {
            Offer::Queued
        } else {
            Offer::Dropped
        }
    }

    /// Takes the queued render, if any.
    pub fn take(&self) -> Option<String> {
        self.lock().pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    fn try_put(&self, content: String) -> bool {
        Self::put_locked(&mut self.lock(), content)
    }

    fn put_locked(state: &mut SlotState, content: String) -> bool {
        if state.pending.is_some() {
            return false;
        }
        state.pending = Some(content);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        // Recover from poisoning - state is replaced whole under the lock
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

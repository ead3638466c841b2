//! Single-subscriber fan-out for the global input hook
//!
//! The slot owns the only `Sender` of the active subscription, so closing
//! the slot disconnects the subscriber's stream. Subscriptions are told
//! apart by a generation id; a stale release never clears a newer one.

use super::{RawInput, Subscription};
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{const_mutex, Mutex};

pub(crate) struct SubscriberSlot {
    state: Mutex<SlotState>,
}

struct SlotState {
    next_id: u64,
    current: Option<(u64, Sender<RawInput>)>,
    /// Set once the hook is gone for good
    closed: Option<String>,
}

impl SubscriberSlot {
    pub(crate) const fn new() -> Self {
        Self {
            state: const_mutex(SlotState {
                next_id: 0,
                current: None,
                closed: None,
            }),
        }
    }

    pub(crate) fn subscribe(&'static self) -> Result<Subscription> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(Error::capture_unavailable(format!(
                "Input hook stopped: {}",
                reason
            )));
        }
        if state.current.is_some() {
            return Err(Error::capture_unavailable(
                "The global input hook is already held by another capture",
            ));
        }

        let id = state.next_id;
        state.next_id += 1;
        let (tx, rx) = unbounded();
        state.current = Some((id, tx));
        tracing::debug!(id, "input hook subscriber registered");

        Ok(Subscription::new(rx, move || self.release(id)))
    }

    fn release(&self, id: u64) {
        let mut state = self.state.lock();
        if matches!(state.current, Some((current, _)) if current == id) {
            state.current = None;
            tracing::debug!(id, "input hook subscriber released");
        }
    }

    /// Forward one notification to the subscriber, if any
    pub(crate) fn send(&self, raw: RawInput) {
        let mut state = self.state.lock();
        let gone = match &state.current {
            Some((_, tx)) => tx.send(raw).is_err(),
            None => false,
        };
        if gone {
            state.current = None;
            tracing::warn!("input hook subscriber went away without releasing");
        }
    }

    /// Mark the hook dead. The active subscriber's stream disconnects and
    /// every later `subscribe` fails.
    pub(crate) fn close(&self, reason: String) {
        let mut state = self.state.lock();
        if state.current.take().is_some() {
            tracing::warn!(%reason, "input hook stopped during an active capture");
        }
        state.closed = Some(reason);
    }
}

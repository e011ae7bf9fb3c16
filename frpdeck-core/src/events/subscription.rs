//! Scoped subscription handles and the teardown list that owns them

use super::bus::BusInner;
use super::topic::Topic;
use crate::error::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, Weak};
use uuid::Uuid;

/// Handle to a live subscription.
///
/// Releasing happens exactly once, either through [`release`](Self::release)
/// or when the handle is dropped.
#[must_use = "dropping a SubscriptionHandle ends the subscription"]
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    topic: Topic,
    bus: Weak<BusInner>,
    released: AtomicBool,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: Uuid, topic: Topic, bus: Weak<BusInner>) -> Self {
        Self {
            id,
            topic,
            bus,
            released: AtomicBool::new(false),
        }
    }

    /// Get the subscription ID
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// Get the topic
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Whether the subscription has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// End the subscription. Events already queued are still handled.
    pub fn release(self) {
        self.release_once();
    }

    fn release_once(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        // The bus may already be gone; nothing left to remove then.
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.topic, self.id);
        }
        tracing::debug!(topic = %self.topic, subscription = %self.id, "Released subscription");
        true
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[derive(Default)]
struct ListState {
    handles: Vec<SubscriptionHandle>,
    listening: bool,
    generation: u64,
}

/// Ordered collection of teardown handles with an idempotent attach.
#[derive(Default)]
pub struct Subscriptions {
    state: Mutex<ListState>,
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Subscriptions")
            .field("listening", &state.listening)
            .field("handles", &state.handles.len())
            .finish()
    }
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether listeners are attached (or being attached)
    pub fn is_listening(&self) -> bool {
        self.state().listening
    }

    /// Number of held handles
    pub fn len(&self) -> usize {
        self.state().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `setup` unless already listening.
    ///
    /// Returns `Ok(false)` when this call was a no-op. If `setup` fails the
    /// list goes back to not listening. If [`detach`](Self::detach) runs while
    /// `setup` is in progress, the new handles are released immediately.
    pub async fn attach<F, Fut>(&self, setup: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<SubscriptionHandle>>>,
    {
        let generation = {
            let mut state = self.state();
            if state.listening {
                return Ok(false);
            }
            state.listening = true;
            state.generation
        };

        let handles = match setup().await {
            Ok(handles) => handles,
            Err(e) => {
                let mut state = self.state();
                if state.generation == generation {
                    state.listening = false;
                }
                return Err(e);
            }
        };

        let mut state = self.state();
        if state.generation != generation {
            drop(state);
            drop(handles);
            tracing::debug!("Detached during attach; released new subscriptions");
            return Ok(false);
        }
        state.handles.extend(handles);
        Ok(true)
    }

    /// Release every held handle in registration order and clear the list.
    ///
    /// Returns the number of handles released. Safe to call when empty.
    pub fn detach(&self) -> usize {
        let handles = {
            let mut state = self.state();
            state.listening = false;
            state.generation += 1;
            std::mem::take(&mut state.handles)
        };
        let count = handles.len();
        for handle in handles {
            handle.release();
        }
        count
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.detach();
    }
}

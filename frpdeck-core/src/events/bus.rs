//! In-process event bus for backend topics
//!
//! Each subscription owns an unbounded queue drained by a single task, so a
//! subscriber sees its topic's events in publish order and one handler never
//! runs concurrently with itself. Topics that must stay ordered relative to
//! each other share one queue through [`EventBus::subscribe_ordered`].

use super::subscription::SubscriptionHandle;
use super::topic::{BackendEvent, Topic};
use crate::error::{DeckError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Future returned by an event handler
pub type HandlerFuture = futures::future::BoxFuture<'static, Result<()>>;

struct Subscriber {
    id: Uuid,
    sender: mpsc::UnboundedSender<BackendEvent>,
}

#[derive(Default)]
pub(crate) struct BusInner {
    topics: Mutex<HashMap<Topic, Vec<Subscriber>>>,
}

impl BusInner {
    fn topics(&self) -> MutexGuard<'_, HashMap<Topic, Vec<Subscriber>>> {
        // Poison is ignored: the map holds no cross-entry invariant.
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove a subscriber; its queue drains and the task ends
    pub(crate) fn remove(&self, topic: Topic, id: Uuid) -> bool {
        let mut topics = self.topics();
        let Some(subs) = topics.get_mut(&topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner").finish_non_exhaustive()
    }
}

/// Fan-out bus for parsed [`BackendEvent`]s
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.inner.topics();
        let counts: HashMap<_, _> = topics.iter().map(|(t, s)| (t.name(), s.len())).collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every subscriber of its topic.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: BackendEvent) -> usize {
        let topic = event.topic();
        let mut topics = self.inner.topics();
        let Some(subs) = topics.get_mut(&topic) else {
            tracing::trace!(topic = %topic, "No subscribers for event");
            return 0;
        };

        // Closed queues belong to handlers whose task is gone.
        subs.retain(|s| s.sender.send(event.clone()).is_ok());
        subs.len()
    }

    /// Parse a raw backend payload and publish it.
    ///
    /// Malformed payloads are rejected here and never reach a subscriber.
    pub fn publish_raw(&self, topic: &str, payload: serde_json::Value) -> Result<usize> {
        match BackendEvent::parse(topic, payload) {
            Ok(event) => Ok(self.publish(event)),
            Err(e) => {
                tracing::warn!(topic, error = %e, "Dropping malformed backend event");
                Err(e)
            }
        }
    }

    /// Register a handler for a topic.
    ///
    /// The handler runs on a dedicated task until the returned handle is
    /// released or dropped. Handler errors are logged and do not end the
    /// subscription.
    pub async fn subscribe<F>(&self, topic: Topic, handler: F) -> Result<SubscriptionHandle>
    where
        F: Fn(BackendEvent) -> HandlerFuture + Send + Sync + 'static,
    {
        let mut handles = self.subscribe_ordered(&[topic], handler).await?;
        handles
            .pop()
            .ok_or_else(|| DeckError::UnknownTopic(topic.name().to_string()))
    }

    /// Register one handler for several topics sharing a single queue.
    ///
    /// Events are handled in the order they were published, across all of
    /// `topics`. One handle is returned per topic; the task ends once every
    /// handle is released.
    pub async fn subscribe_ordered<F>(
        &self,
        topics: &[Topic],
        handler: F,
    ) -> Result<Vec<SubscriptionHandle>>
    where
        F: Fn(BackendEvent) -> HandlerFuture + Send + Sync + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BackendEvent>();
        let queue = Uuid::new_v4();

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let topic = event.topic();
                if let Err(e) = handler(event).await {
                    tracing::warn!(topic = %topic, queue = %queue, error = %e, "Event handler failed");
                }
            }
            tracing::debug!(queue = %queue, "Subscription closed");
        });

        let mut registry = self.inner.topics();
        let handles = topics
            .iter()
            .map(|&topic| {
                let id = Uuid::new_v4();
                registry.entry(topic).or_default().push(Subscriber {
                    id,
                    sender: sender.clone(),
                });
                tracing::debug!(topic = %topic, subscription = %id, queue = %queue, "Subscribed");
                SubscriptionHandle::new(id, topic, Arc::downgrade(&self.inner))
            })
            .collect();
        Ok(handles)
    }

    /// Current number of subscribers on a topic
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.topics().get(&topic).map_or(0, Vec::len)
    }
}

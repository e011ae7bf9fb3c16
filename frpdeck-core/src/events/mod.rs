//! Backend event adapter
//!
//! Raw `(topic, payload)` pairs are parsed once into [`BackendEvent`] and
//! routed through an [`EventBus`]. Subscriptions are scoped: a
//! [`SubscriptionHandle`] ends its subscription exactly once, and
//! [`Subscriptions`] collects handles for a single teardown.

mod bus;
mod subscription;
mod topic;

pub use bus::{EventBus, HandlerFuture};
pub use subscription::{SubscriptionHandle, Subscriptions};
pub use topic::{BackendEvent, Topic};

//! # frpdeck-core - State reconciliation for an frpc agent
//!
//! Keeps a consistent view of agent versions, the single active version and
//! the agent's output while commands and backend events race each other:
//! - Version catalog with an at-most-one-active invariant
//! - Download coordination with replay-safe progress and completion-once
//! - Activation state machine that rejects, never queues, concurrent requests
//! - Bounded, sequenced log sink for stdout/stderr
//! - Typed event bus with scoped, exactly-once subscriptions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frpdeck_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(facade: Arc<dyn CommandFacade>) -> Result<()> {
//! let notifier = Notifier::default();
//! let catalog = VersionCatalog::new(notifier.clone());
//! catalog.refresh(facade.as_ref(), &[]).await?;
//!
//! let activation = ActivationMachine::new(facade, catalog.clone(), notifier);
//! activation.activate("frp_0.61.0_linux_amd64.tar.gz").await?;
//! # Ok(())
//! # }
//! ```
//!
//! The process supervisor and the top-level wiring live in
//! `frpdeck-supervisor`.
//!
//! ## Feature Flags
//!
//! - `test-support`: exposes [`testing`] (stub facade, fixed clock) to other crates

pub mod activation;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod events;
pub mod facade;
pub mod logs;
pub mod notify;
pub mod stores;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::activation::{ActivationIntent, ActivationMachine};
    pub use crate::catalog::VersionCatalog;
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{
        ConfigBuilder, DeckConfig, DownloadConfig, EventConfig, LogConfig, TelemetryConfig,
    };
    pub use crate::domain::{
        ActiveRecord, Auth, AuthMethod, ClientConfig, DomainKind, HttpProxy, HttpSwitch,
        HttpsProxy, ProcessState, Proxy, ProxyCommon, Switches, VersionRecord, WebServer,
    };
    pub use crate::download::DownloadCoordinator;
    pub use crate::error::{BackendError, DeckError, Result};
    pub use crate::events::{
        BackendEvent, EventBus, HandlerFuture, SubscriptionHandle, Subscriptions, Topic,
    };
    pub use crate::facade::{CommandFacade, FacadeResult};
    pub use crate::logs::{LogEntry, LogSink, LogStream};
    pub use crate::notify::{DeckUpdate, Notice, Notifier};
    pub use crate::stores::{ConfigStore, ProxyStore, SettingsStore};
    pub use crate::telemetry::init_tracing;
}

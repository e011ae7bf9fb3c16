//! Top-level wiring
//!
//! A [`Deck`] owns one instance of every component, routes backend events to
//! them and fans their state changes out to observers. It is the only place
//! where components are connected to each other.

use crate::Result;
use crate::process::ProcessSupervisor;
use frpdeck_core::activation::ActivationMachine;
use frpdeck_core::catalog::VersionCatalog;
use frpdeck_core::clock::{Clock, SystemClock};
use frpdeck_core::config::DeckConfig;
use frpdeck_core::download::DownloadCoordinator;
use frpdeck_core::error::DeckError;
use frpdeck_core::events::{BackendEvent, EventBus, HandlerFuture, Subscriptions, Topic};
use frpdeck_core::facade::CommandFacade;
use frpdeck_core::logs::{LogSink, LogStream};
use frpdeck_core::notify::{DeckUpdate, Notifier};
use frpdeck_core::stores::{ConfigStore, ProxyStore, SettingsStore};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const PROCESS_TOPICS: [Topic; 3] = [
    Topic::ProcessStdout,
    Topic::ProcessStderr,
    Topic::ProcessExit,
];

/// Routes parsed events to the component that owns them
#[derive(Clone)]
struct Router {
    downloads: DownloadCoordinator,
    activation: ActivationMachine,
    process: ProcessSupervisor,
}

impl Router {
    fn handler(&self) -> impl Fn(BackendEvent) -> HandlerFuture + Send + Sync + 'static {
        let router = self.clone();
        move |event| {
            let router = router.clone();
            Box::pin(async move {
                router.dispatch(event).await;
                Ok(())
            }) as HandlerFuture
        }
    }

    async fn dispatch(&self, event: BackendEvent) {
        match event {
            BackendEvent::DownloadProgress { name, progress } => {
                self.downloads.on_progress(&name, progress).await;
            }
            BackendEvent::ActivationStatus { status, name } => {
                self.activation.on_status(status, name.as_deref()).await;
            }
            BackendEvent::ProcessStdout { text } => {
                self.process.on_output(LogStream::Stdout, &text).await;
            }
            BackendEvent::ProcessStderr { text } => {
                self.process.on_output(LogStream::Stderr, &text).await;
            }
            BackendEvent::ProcessExit { code } => {
                self.process.on_exit(code).await;
            }
        }
    }
}

/// The reconciliation core, assembled
pub struct Deck {
    facade: Arc<dyn CommandFacade>,
    bus: EventBus,
    notifier: Notifier,
    config: DeckConfig,
    catalog: VersionCatalog,
    downloads: DownloadCoordinator,
    activation: ActivationMachine,
    process: ProcessSupervisor,
    logs: LogSink,
    config_store: ConfigStore,
    proxies: ProxyStore,
    settings: SettingsStore,
    subscriptions: Subscriptions,
}

impl std::fmt::Debug for Deck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deck")
            .field("bus", &self.bus)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl Deck {
    /// Build every component around `facade` and `bus`
    pub fn new(facade: Arc<dyn CommandFacade>, bus: EventBus, config: DeckConfig) -> Self {
        Self::with_clock(facade, bus, config, Arc::new(SystemClock))
    }

    /// Like [`Deck::new`] with an explicit time source for log stamps
    pub fn with_clock(
        facade: Arc<dyn CommandFacade>,
        bus: EventBus,
        config: DeckConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifier = Notifier::new(config.events.update_buffer);
        let catalog = VersionCatalog::new(notifier.clone());
        let downloads = DownloadCoordinator::new(
            facade.clone(),
            catalog.clone(),
            notifier.clone(),
            config.downloads.grace_delay,
        );
        let activation = ActivationMachine::new(facade.clone(), catalog.clone(), notifier.clone());
        let logs = LogSink::new(config.logs.capacity, clock, notifier.clone());
        let process = ProcessSupervisor::new(facade.clone(), logs.clone(), notifier.clone());

        Self {
            config_store: ConfigStore::new(facade.clone()),
            proxies: ProxyStore::new(facade.clone()),
            settings: SettingsStore::new(facade.clone()),
            facade,
            bus,
            notifier,
            config,
            catalog,
            downloads,
            activation,
            process,
            logs,
            subscriptions: Subscriptions::new(),
        }
    }

    fn router(&self) -> Router {
        Router {
            downloads: self.downloads.clone(),
            activation: self.activation.clone(),
            process: self.process.clone(),
        }
    }

    /// Subscribe to every backend topic.
    ///
    /// Returns `false` when already attached.
    pub async fn attach(&self) -> Result<bool> {
        let router = self.router();
        let bus = self.bus.clone();
        let attached = self
            .subscriptions
            .attach(|| async move {
                let mut handles = Vec::with_capacity(Topic::ALL.len());
                for topic in [Topic::DownloadProgress, Topic::ActivationStatus] {
                    handles.push(bus.subscribe(topic, router.handler()).await?);
                }
                // Output must reach the log sink before the exit that follows it.
                handles.extend(
                    bus.subscribe_ordered(&PROCESS_TOPICS, router.handler())
                        .await?,
                );
                Ok::<_, DeckError>(handles)
            })
            .await?;

        if attached {
            info!("Deck attached to {} topics", Topic::ALL.len());
        } else {
            debug!("Deck already attached");
        }
        Ok(attached)
    }

    /// Release every subscription. Safe to call repeatedly.
    pub fn detach(&self) -> usize {
        let released = self.subscriptions.detach();
        if released > 0 {
            info!("Deck detached ({} subscriptions released)", released);
        }
        released
    }

    pub fn is_attached(&self) -> bool {
        self.subscriptions.is_listening()
    }

    /// Reconcile with the backend, then attach.
    ///
    /// Queries the process status, refreshes the catalog while keeping
    /// in-flight downloads, and subscribes to events.
    pub async fn hydrate(&self) -> Result<()> {
        let running = self.process.status().await?;
        let keep = self.downloads.in_flight().await;
        let count = self.catalog.refresh(self.facade.as_ref(), &keep).await?;
        self.attach().await?;
        info!("Deck hydrated (frpc running: {}, versions: {})", running, count);
        Ok(())
    }

    /// Receive every state update from now on
    pub fn watch(&self) -> broadcast::Receiver<DeckUpdate> {
        self.notifier.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn catalog(&self) -> &VersionCatalog {
        &self.catalog
    }

    pub fn downloads(&self) -> &DownloadCoordinator {
        &self.downloads
    }

    pub fn activation(&self) -> &ActivationMachine {
        &self.activation
    }

    pub fn process(&self) -> &ProcessSupervisor {
        &self.process
    }

    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn proxies(&self) -> &ProxyStore {
        &self.proxies
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frpdeck_core::testing::StubFacade;

    #[tokio::test]
    async fn test_attach_twice_subscribes_once() {
        let bus = EventBus::new();
        let deck = Deck::new(Arc::new(StubFacade::new()), bus.clone(), DeckConfig::default());

        assert!(deck.attach().await.unwrap());
        assert!(!deck.attach().await.unwrap());
        for topic in Topic::ALL {
            assert_eq!(bus.subscriber_count(topic), 1);
        }

        assert_eq!(deck.detach(), 5);
        assert_eq!(deck.detach(), 0);
        assert!(!deck.is_attached());
        for topic in Topic::ALL {
            assert_eq!(bus.subscriber_count(topic), 0);
        }
    }

    #[tokio::test]
    async fn test_hydrate_adopts_running_process() {
        let facade = Arc::new(StubFacade::new());
        facade.set_running(true);
        facade.set_versions(vec![frpdeck_core::domain::VersionRecord::new(
            "v1", "v1", "http://x",
        )]);
        let deck = Deck::new(facade, EventBus::new(), DeckConfig::default());

        deck.hydrate().await.unwrap();
        assert!(deck.process().is_running().await);
        assert!(deck.catalog().contains("v1").await);
        assert!(deck.is_attached());
    }
}

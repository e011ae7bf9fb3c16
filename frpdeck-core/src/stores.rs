//! Cached views over the backend's configuration, proxies and settings

use crate::domain::{ClientConfig, Proxy};
use crate::error::Result;
use crate::facade::CommandFacade;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Client configuration cache
#[derive(Clone)]
pub struct ConfigStore {
    facade: Arc<dyn CommandFacade>,
    config: Arc<RwLock<Option<ClientConfig>>>,
    loading: Arc<AtomicBool>,
}

impl ConfigStore {
    pub fn new(facade: Arc<dyn CommandFacade>) -> Self {
        Self {
            facade,
            config: Arc::new(RwLock::new(None)),
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load the configuration from the backend and cache it
    pub async fn fetch(&self) -> Result<ClientConfig> {
        self.loading.store(true, Ordering::Release);
        let result = self.facade.load_config().await;
        self.loading.store(false, Ordering::Release);

        let config = result?;
        *self.config.write().await = Some(config.clone());
        Ok(config)
    }

    /// Persist the server section and cache the new value
    pub async fn save(&self, config: ClientConfig) -> Result<()> {
        self.facade.save_server(config.clone()).await?;
        tracing::info!(server = %config.server_addr, port = config.server_port, "Server settings saved");
        *self.config.write().await = Some(config);
        Ok(())
    }

    /// Last fetched or saved configuration
    pub async fn config(&self) -> Option<ClientConfig> {
        self.config.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }
}

/// Proxy list cache; every mutation is followed by a refetch
#[derive(Clone)]
pub struct ProxyStore {
    facade: Arc<dyn CommandFacade>,
    proxies: Arc<RwLock<Vec<Proxy>>>,
}

impl ProxyStore {
    pub fn new(facade: Arc<dyn CommandFacade>) -> Self {
        Self {
            facade,
            proxies: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn fetch(&self) -> Result<Vec<Proxy>> {
        let proxies = self.facade.load_proxies().await?;
        *self.proxies.write().await = proxies.clone();
        Ok(proxies)
    }

    /// Insert or replace a proxy, then refresh the list
    pub async fn add_or_update(&self, proxy: Proxy) -> Result<Vec<Proxy>> {
        let name = proxy.name.clone();
        self.facade.save_proxy(proxy).await?;
        tracing::debug!(proxy = %name, "Proxy saved");
        self.fetch().await
    }

    /// Remove a proxy by name, then refresh the list.
    ///
    /// Returns whether the backend removed anything.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let removed = self.facade.remove_proxy(name).await?;
        if !removed {
            tracing::debug!(proxy = %name, "No proxy to remove");
        }
        self.fetch().await?;
        Ok(removed)
    }

    pub async fn proxies(&self) -> Vec<Proxy> {
        self.proxies.read().await.clone()
    }
}

/// Typed access to free-form backend settings
#[derive(Clone)]
pub struct SettingsStore {
    facade: Arc<dyn CommandFacade>,
}

impl SettingsStore {
    pub fn new(facade: Arc<dyn CommandFacade>) -> Self {
        Self { facade }
    }

    /// Read `key`, or `None` if it is unset
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.facade.get_setting(key).await? {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<bool> {
        let value = serde_json::to_value(value)?;
        Ok(self.facade.set_setting(key, value).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HttpsProxy, ProxyCommon};
    use crate::error::DeckError;
    use crate::testing::{FacadeCall, StubFacade};

    fn https(name: &str, port: u16) -> Proxy {
        Proxy::Https(HttpsProxy {
            common: ProxyCommon {
                id: format!("id-{name}"),
                name: name.to_string(),
                enable: true,
                local_ip: "127.0.0.1".to_string(),
                local_port: port,
            },
        })
    }

    #[tokio::test]
    async fn test_config_fetch_and_save() {
        let facade = Arc::new(StubFacade::new());
        let store = ConfigStore::new(facade.clone());
        assert!(store.config().await.is_none());

        let mut config = store.fetch().await.unwrap();
        assert!(!store.is_loading());
        config.server_addr = "frp.example.com".to_string();
        store.save(config).await.unwrap();

        assert_eq!(facade.config().server_addr, "frp.example.com");
        assert_eq!(store.config().await.unwrap().server_addr, "frp.example.com");
    }

    #[tokio::test]
    async fn test_config_fetch_failure_clears_loading() {
        let facade = Arc::new(StubFacade::new());
        facade.fail("load_config", "config unreadable");
        let store = ConfigStore::new(facade);

        let err = store.fetch().await.unwrap_err();
        assert!(matches!(err, DeckError::Backend(_)));
        assert!(!store.is_loading());
        assert!(store.config().await.is_none());
    }

    #[tokio::test]
    async fn test_proxy_mutations_refetch() {
        let facade = Arc::new(StubFacade::new());
        let store = ProxyStore::new(facade.clone());

        store.add_or_update(https("web", 8443)).await.unwrap();
        let list = store.add_or_update(https("web", 9443)).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].local_port, 9443);

        assert!(store.remove("web").await.unwrap());
        assert!(!store.remove("web").await.unwrap());
        assert!(store.proxies().await.is_empty());

        let loads = facade
            .calls()
            .into_iter()
            .filter(|c| *c == FacadeCall::LoadProxies)
            .count();
        assert_eq!(loads, 4);
    }

    #[tokio::test]
    async fn test_typed_settings() {
        let facade = Arc::new(StubFacade::new());
        let settings = SettingsStore::new(facade);

        assert_eq!(settings.get::<String>("theme").await.unwrap(), None);
        assert!(settings.set("theme", &"dark").await.unwrap());
        assert_eq!(
            settings.get::<String>("theme").await.unwrap().as_deref(),
            Some("dark")
        );

        settings.set("autostart", &true).await.unwrap();
        assert!(settings.get::<u32>("autostart").await.is_err());
    }
}

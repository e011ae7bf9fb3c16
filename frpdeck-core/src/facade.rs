//! Request/response boundary to the external backend
//!
//! The backend owns the filesystem, network and the real child process. The
//! core only ever talks to it through [`CommandFacade`]; every failure comes
//! back as a single human-readable [`BackendError`] message.

use crate::domain::{ActiveRecord, ClientConfig, Proxy, VersionRecord};
use crate::error::BackendError;
use async_trait::async_trait;
use serde_json::Value;

/// Result of a facade call
pub type FacadeResult<T> = std::result::Result<T, BackendError>;

/// Commands the core can issue to the backend
#[async_trait]
pub trait CommandFacade: Send + Sync {
    /// Load the stored client configuration
    async fn load_config(&self) -> FacadeResult<ClientConfig>;

    /// Persist the server section of the configuration
    async fn save_server(&self, partial: ClientConfig) -> FacadeResult<()>;

    /// Flush pending configuration to disk
    async fn save_now(&self) -> FacadeResult<()>;

    /// List configured proxies
    async fn load_proxies(&self) -> FacadeResult<Vec<Proxy>>;

    /// Insert or replace a proxy
    async fn save_proxy(&self, proxy: Proxy) -> FacadeResult<()>;

    /// Remove a proxy; returns whether one was removed
    async fn remove_proxy(&self, name: &str) -> FacadeResult<bool>;

    /// Read a free-form setting
    async fn get_setting(&self, key: &str) -> FacadeResult<Option<Value>>;

    /// Write a free-form setting
    async fn set_setting(&self, key: &str, value: Value) -> FacadeResult<bool>;

    /// Snapshot of every known version
    async fn get_versions(&self) -> FacadeResult<Vec<VersionRecord>>;

    /// Download a version; progress arrives on `download-progress`
    async fn download_version(&self, name: &str, url: &str) -> FacadeResult<()>;

    /// Delete a downloaded version
    async fn delete_version(&self, name: &str) -> FacadeResult<()>;

    /// Activate a version; completion arrives on `activation-status`
    async fn activate_version(&self, name: &str) -> FacadeResult<()>;

    /// Deactivate a version
    async fn deactivate_version(&self, name: &str) -> FacadeResult<()>;

    /// The backend's active version, if any
    async fn get_active_version(&self) -> FacadeResult<Option<ActiveRecord>>;

    /// Launch the agent; returns its process id
    async fn start_frpc(&self, exe_path: &str, cfg_path: &str) -> FacadeResult<u32>;

    /// Stop the agent; exit arrives on `process-exit`
    async fn stop_frpc(&self) -> FacadeResult<()>;

    /// Whether the backend currently holds a running agent
    async fn frpc_status(&self) -> FacadeResult<bool>;

    /// Render the agent configuration as TOML text
    async fn export_toml(&self) -> FacadeResult<String>;

    /// Write the agent configuration to a file; returns its path
    async fn export_toml_to_file(&self) -> FacadeResult<String>;
}

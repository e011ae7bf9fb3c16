//! In-memory collaborators for tests
//!
//! Enabled under `cfg(test)` and by the `test-support` feature so that
//! downstream crates can drive the core without a real backend.

use crate::clock::Clock;
use crate::domain::{ActiveRecord, ClientConfig, Proxy, VersionRecord};
use crate::error::BackendError;
use crate::facade::{CommandFacade, FacadeResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A recorded facade invocation
#[derive(Debug, Clone, PartialEq)]
pub enum FacadeCall {
    LoadConfig,
    SaveServer,
    SaveNow,
    LoadProxies,
    SaveProxy(String),
    RemoveProxy(String),
    GetSetting(String),
    SetSetting(String, Value),
    GetVersions,
    DownloadVersion { name: String, url: String },
    DeleteVersion(String),
    ActivateVersion(String),
    DeactivateVersion(String),
    GetActiveVersion,
    StartFrpc { exe_path: String, cfg_path: String },
    StopFrpc,
    FrpcStatus,
    ExportToml,
    ExportTomlToFile,
}

impl FacadeCall {
    /// Command name, as used by [`StubFacade::fail`]
    pub fn op(&self) -> &'static str {
        match self {
            FacadeCall::LoadConfig => "load_config",
            FacadeCall::SaveServer => "save_server",
            FacadeCall::SaveNow => "save_now",
            FacadeCall::LoadProxies => "load_proxies",
            FacadeCall::SaveProxy(_) => "save_proxy",
            FacadeCall::RemoveProxy(_) => "remove_proxy",
            FacadeCall::GetSetting(_) => "get_setting",
            FacadeCall::SetSetting(..) => "set_setting",
            FacadeCall::GetVersions => "get_versions",
            FacadeCall::DownloadVersion { .. } => "download_version",
            FacadeCall::DeleteVersion(_) => "delete_version",
            FacadeCall::ActivateVersion(_) => "activate_version",
            FacadeCall::DeactivateVersion(_) => "deactivate_version",
            FacadeCall::GetActiveVersion => "get_active_version",
            FacadeCall::StartFrpc { .. } => "start_frpc",
            FacadeCall::StopFrpc => "stop_frpc",
            FacadeCall::FrpcStatus => "frpc_status",
            FacadeCall::ExportToml => "export_toml",
            FacadeCall::ExportTomlToFile => "export_toml_to_file",
        }
    }
}

#[derive(Debug)]
struct StubState {
    calls: Vec<FacadeCall>,
    failures: HashMap<String, String>,
    config: ClientConfig,
    proxies: Vec<Proxy>,
    settings: HashMap<String, Value>,
    versions: Vec<VersionRecord>,
    active: Option<ActiveRecord>,
    running: bool,
    next_pid: u32,
}

/// Backend stand-in that records calls and answers from memory
#[derive(Debug)]
pub struct StubFacade {
    state: Mutex<StubState>,
}

impl Default for StubFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl StubFacade {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                calls: Vec::new(),
                failures: HashMap::new(),
                config: ClientConfig::default(),
                proxies: Vec::new(),
                settings: HashMap::new(),
                versions: Vec::new(),
                active: None,
                running: false,
                next_pid: 4242,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every later call to `op` fail with `message`
    pub fn fail(&self, op: &str, message: &str) {
        self.state()
            .failures
            .insert(op.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn set_versions(&self, versions: Vec<VersionRecord>) {
        self.state().versions = versions;
    }

    /// Set what `frpc_status` reports
    pub fn set_running(&self, running: bool) {
        self.state().running = running;
    }

    pub fn set_config(&self, config: ClientConfig) {
        self.state().config = config;
    }

    pub fn config(&self) -> ClientConfig {
        self.state().config.clone()
    }

    pub fn proxies(&self) -> Vec<Proxy> {
        self.state().proxies.clone()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<FacadeCall> {
        self.state().calls.clone()
    }

    /// Number of calls made to `op`
    pub fn count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    fn record(&self, call: FacadeCall) -> FacadeResult<MutexGuard<'_, StubState>> {
        let mut state = self.state();
        let op = call.op();
        state.calls.push(call);
        match state.failures.get(op) {
            Some(message) => Err(BackendError::new(message.clone())),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl CommandFacade for StubFacade {
    async fn load_config(&self) -> FacadeResult<ClientConfig> {
        let state = self.record(FacadeCall::LoadConfig)?;
        Ok(state.config.clone())
    }

    async fn save_server(&self, partial: ClientConfig) -> FacadeResult<()> {
        let mut state = self.record(FacadeCall::SaveServer)?;
        let proxies = std::mem::take(&mut state.config.proxies);
        state.config = ClientConfig { proxies, ..partial };
        Ok(())
    }

    async fn save_now(&self) -> FacadeResult<()> {
        self.record(FacadeCall::SaveNow)?;
        Ok(())
    }

    async fn load_proxies(&self) -> FacadeResult<Vec<Proxy>> {
        let state = self.record(FacadeCall::LoadProxies)?;
        Ok(state.proxies.clone())
    }

    async fn save_proxy(&self, proxy: Proxy) -> FacadeResult<()> {
        let mut state = self.record(FacadeCall::SaveProxy(proxy.name.clone()))?;
        match state.proxies.iter_mut().find(|p| p.name == proxy.name) {
            Some(existing) => *existing = proxy,
            None => state.proxies.push(proxy),
        }
        Ok(())
    }

    async fn remove_proxy(&self, name: &str) -> FacadeResult<bool> {
        let mut state = self.record(FacadeCall::RemoveProxy(name.to_string()))?;
        let before = state.proxies.len();
        state.proxies.retain(|p| p.name != name);
        Ok(state.proxies.len() != before)
    }

    async fn get_setting(&self, key: &str) -> FacadeResult<Option<Value>> {
        let state = self.record(FacadeCall::GetSetting(key.to_string()))?;
        Ok(state.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: Value) -> FacadeResult<bool> {
        let mut state = self.record(FacadeCall::SetSetting(key.to_string(), value.clone()))?;
        state.settings.insert(key.to_string(), value);
        Ok(true)
    }

    async fn get_versions(&self) -> FacadeResult<Vec<VersionRecord>> {
        let state = self.record(FacadeCall::GetVersions)?;
        Ok(state.versions.clone())
    }

    async fn download_version(&self, name: &str, url: &str) -> FacadeResult<()> {
        self.record(FacadeCall::DownloadVersion {
            name: name.to_string(),
            url: url.to_string(),
        })?;
        Ok(())
    }

    async fn delete_version(&self, name: &str) -> FacadeResult<()> {
        let mut state = self.record(FacadeCall::DeleteVersion(name.to_string()))?;
        if state.active.as_ref().is_some_and(|a| a.name == name) {
            state.active = None;
        }
        Ok(())
    }

    async fn activate_version(&self, name: &str) -> FacadeResult<()> {
        let mut state = self.record(FacadeCall::ActivateVersion(name.to_string()))?;
        state.active = Some(ActiveRecord {
            name: name.to_string(),
            archive_path: format!("/data/frpc/{name}"),
            unpack_dir: format!("/data/frpc/{name}.d"),
            exe_path: format!("/data/frpc/{name}.d/frpc"),
            activated_at: FixedClock::default().now(),
        });
        Ok(())
    }

    async fn deactivate_version(&self, name: &str) -> FacadeResult<()> {
        let mut state = self.record(FacadeCall::DeactivateVersion(name.to_string()))?;
        if state.active.as_ref().is_some_and(|a| a.name == name) {
            state.active = None;
        }
        Ok(())
    }

    async fn get_active_version(&self) -> FacadeResult<Option<ActiveRecord>> {
        let state = self.record(FacadeCall::GetActiveVersion)?;
        Ok(state.active.clone())
    }

    async fn start_frpc(&self, exe_path: &str, cfg_path: &str) -> FacadeResult<u32> {
        let mut state = self.record(FacadeCall::StartFrpc {
            exe_path: exe_path.to_string(),
            cfg_path: cfg_path.to_string(),
        })?;
        if state.running {
            return Err(BackendError::new("frpc already running"));
        }
        state.running = true;
        let pid = state.next_pid;
        state.next_pid += 1;
        Ok(pid)
    }

    async fn stop_frpc(&self) -> FacadeResult<()> {
        let mut state = self.record(FacadeCall::StopFrpc)?;
        state.running = false;
        Ok(())
    }

    async fn frpc_status(&self) -> FacadeResult<bool> {
        let state = self.record(FacadeCall::FrpcStatus)?;
        Ok(state.running)
    }

    async fn export_toml(&self) -> FacadeResult<String> {
        let state = self.record(FacadeCall::ExportToml)?;
        Ok(format!(
            "serverAddr = \"{}\"\nserverPort = {}\n",
            state.config.server_addr, state.config.server_port
        ))
    }

    async fn export_toml_to_file(&self) -> FacadeResult<String> {
        self.record(FacadeCall::ExportTomlToFile)?;
        Ok("/data/frpc/frpc.toml".to_string())
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Clock frozen at `h:m:s` on 2025-01-01 UTC
    pub fn at_hms(hour: u32, min: u32, sec: u32) -> Self {
        let at = Utc
            .with_ymd_and_hms(2025, 1, 1, hour, min, sec)
            .single()
            .unwrap_or_default();
        Self(at)
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::at_hms(12, 0, 0)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

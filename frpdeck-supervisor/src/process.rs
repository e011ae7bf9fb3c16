//! Supervisor for the single frpc process
//!
//! The real child lives behind the backend. This supervisor keeps a cached
//! view of it, reconciled through `frpc_status` and driven to `Stopped` by the
//! `process-exit` event.

use crate::Result;
use frpdeck_core::domain::ProcessState;
use frpdeck_core::error::DeckError;
use frpdeck_core::facade::CommandFacade;
use frpdeck_core::logs::{LogSink, LogStream};
use frpdeck_core::notify::{DeckUpdate, Notice, Notifier};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Point-in-time view of the supervised process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
}

/// Owns the cached state of the one frpc instance
#[derive(Clone)]
pub struct ProcessSupervisor {
    facade: Arc<dyn CommandFacade>,
    logs: LogSink,
    notifier: Notifier,
    snapshot: Arc<RwLock<ProcessSnapshot>>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor").finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(facade: Arc<dyn CommandFacade>, logs: LogSink, notifier: Notifier) -> Self {
        Self {
            facade,
            logs,
            notifier,
            snapshot: Arc::new(RwLock::new(ProcessSnapshot::default())),
        }
    }

    fn set_state(&self, snapshot: &mut ProcessSnapshot, state: ProcessState) {
        if snapshot.state != state {
            debug!("frpc state {} -> {}", snapshot.state, state);
            snapshot.state = state;
            self.notifier.send(DeckUpdate::ProcessStateChanged { state });
        }
    }

    /// Launch frpc through the backend and return its pid.
    ///
    /// Rejected with `AlreadyRunning` unless the process is `Stopped`.
    pub async fn start(&self, exe_path: &str, cfg_path: &str) -> Result<u32> {
        {
            let mut snapshot = self.snapshot.write().await;
            if snapshot.state != ProcessState::Stopped {
                warn!("Start rejected: frpc is {}", snapshot.state);
                return Err(DeckError::AlreadyRunning.into());
            }
            snapshot.pid = None;
            snapshot.exit_code = None;
            self.set_state(&mut snapshot, ProcessState::Starting);
        }

        info!("Starting frpc: {} -c {}", exe_path, cfg_path);
        match self.facade.start_frpc(exe_path, cfg_path).await {
            Ok(pid) => {
                let mut snapshot = self.snapshot.write().await;
                // An exit may already have been reported while starting.
                if snapshot.state == ProcessState::Starting {
                    snapshot.pid = Some(pid);
                    self.set_state(&mut snapshot, ProcessState::Running);
                }
                info!("frpc started (PID: {})", pid);
                Ok(pid)
            }
            Err(e) => {
                warn!("frpc failed to start: {}", e);
                {
                    let mut snapshot = self.snapshot.write().await;
                    if snapshot.state == ProcessState::Starting {
                        self.set_state(&mut snapshot, ProcessState::Stopped);
                    }
                }
                self.logs
                    .ingest(&format!("[frpc] start failed: {}", e), LogStream::System)
                    .await;
                self.notifier.notice(Notice::Failure(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Ask the backend to stop frpc.
    ///
    /// Only valid while `Running`. The state stays `Stopping` until the exit
    /// event arrives.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut snapshot = self.snapshot.write().await;
            if snapshot.state != ProcessState::Running {
                warn!("Stop rejected: frpc is {}", snapshot.state);
                return Err(DeckError::NotRunning.into());
            }
            self.set_state(&mut snapshot, ProcessState::Stopping);
        }

        info!("Stopping frpc");
        if let Err(e) = self.facade.stop_frpc().await {
            warn!("frpc failed to stop: {}", e);
            {
                let mut snapshot = self.snapshot.write().await;
                if snapshot.state == ProcessState::Stopping {
                    self.set_state(&mut snapshot, ProcessState::Running);
                }
            }
            self.notifier.notice(Notice::Failure(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Query the backend and reconcile the cached state with its answer
    pub async fn status(&self) -> Result<bool> {
        let running = self.facade.frpc_status().await?;
        let mut snapshot = self.snapshot.write().await;
        match (running, snapshot.state) {
            (true, ProcessState::Stopped) => {
                info!("Backend reports frpc running; adopting it");
                self.set_state(&mut snapshot, ProcessState::Running);
            }
            (false, ProcessState::Running | ProcessState::Stopping) => {
                info!("Backend reports frpc stopped");
                snapshot.pid = None;
                self.set_state(&mut snapshot, ProcessState::Stopped);
            }
            _ => {}
        }
        Ok(running)
    }

    /// Forward raw output to the log sink.
    ///
    /// Output is dropped while `Stopped`. Returns the sequence ids appended.
    pub async fn on_output(&self, stream: LogStream, text: &str) -> Vec<u64> {
        if self.snapshot.read().await.state == ProcessState::Stopped {
            debug!("Dropping {} output while stopped", stream);
            return Vec::new();
        }
        self.logs.ingest(text, stream).await
    }

    /// Record the process exit.
    ///
    /// Writes one `system` entry with the exit code, then moves to `Stopped`.
    /// Returns `false` if the process was already stopped.
    pub async fn on_exit(&self, code: Option<i32>) -> bool {
        let mut snapshot = self.snapshot.write().await;
        if snapshot.state == ProcessState::Stopped {
            debug!("Exit event while stopped ignored (code: {:?})", code);
            return false;
        }

        let code_text = code.map_or_else(|| "null".to_string(), |c| c.to_string());
        self.logs
            .ingest(&format!("[frpc] exited code={}", code_text), LogStream::System)
            .await;

        snapshot.exit_code = code;
        snapshot.pid = None;
        self.set_state(&mut snapshot, ProcessState::Stopped);
        info!("frpc exited (code: {})", code_text);
        true
    }

    pub async fn snapshot(&self) -> ProcessSnapshot {
        *self.snapshot.read().await
    }

    pub async fn state(&self) -> ProcessState {
        self.snapshot.read().await.state
    }

    /// Whether frpc is running according to the cached state
    pub async fn is_running(&self) -> bool {
        self.state().await == ProcessState::Running
    }

    pub async fn pid(&self) -> Option<u32> {
        self.snapshot.read().await.pid
    }

    pub async fn exit_code(&self) -> Option<i32> {
        self.snapshot.read().await.exit_code
    }
}

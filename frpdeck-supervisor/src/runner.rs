//! Local child-process runner
//!
//! Plays the backend's process role: spawns `<exe> -c <cfg>`, publishes every
//! output line on `process-stdout`/`process-stderr` and a final
//! `process-exit { code }` once the child is gone and its output drained.

use crate::{Result, SupervisorError};
use frpdeck_core::error::DeckError;
use frpdeck_core::events::{BackendEvent, EventBus};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct RunningChild {
    pid: u32,
    kill: Option<oneshot::Sender<()>>,
}

/// Spawns and kills the frpc child process
#[derive(Debug, Clone)]
pub struct LocalRunner {
    bus: EventBus,
    child: Arc<Mutex<Option<RunningChild>>>,
}

fn pump_lines<R, F>(reader: R, bus: EventBus, wrap: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(String) -> BackendEvent + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    bus.publish(wrap(line));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read frpc output: {}", e);
                    break;
                }
            }
        }
    })
}

impl LocalRunner {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            child: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn `<exe_path> -c <cfg_path>` and return its pid.
    ///
    /// Fails with `AlreadyRunning` while a previous child has not exited.
    pub async fn start(&self, exe_path: &str, cfg_path: &str) -> Result<u32> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Err(DeckError::AlreadyRunning.into());
        }

        let mut child = Command::new(exe_path)
            .arg("-c")
            .arg(cfg_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Spawn(format!("{}: {}", exe_path, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::Process("child exited before reporting a pid".into()))?;

        let stdout = child
            .stdout
            .take()
            .map(|out| pump_lines(out, self.bus.clone(), |text| BackendEvent::ProcessStdout { text }));
        let stderr = child
            .stderr
            .take()
            .map(|err| pump_lines(err, self.bus.clone(), |text| BackendEvent::ProcessStderr { text }));

        let (kill_tx, kill_rx) = oneshot::channel();
        *slot = Some(RunningChild {
            pid,
            kill: Some(kill_tx),
        });
        drop(slot);

        let bus = self.bus.clone();
        let slot = self.child.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    debug!("Killing frpc (PID: {})", pid);
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill frpc (PID: {}): {}", pid, e);
                    }
                    child.wait().await
                }
            };

            // Output must precede the exit event.
            for reader in [stdout, stderr].into_iter().flatten() {
                if let Err(e) = reader.await {
                    warn!("Output reader for PID {} failed: {}", pid, e);
                }
            }

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Failed to wait for frpc (PID: {}): {}", pid, e);
                    None
                }
            };

            {
                let mut slot = slot.lock().await;
                if slot.as_ref().is_some_and(|c| c.pid == pid) {
                    *slot = None;
                }
            }
            info!("frpc (PID: {}) exited with code {:?}", pid, code);
            bus.publish(BackendEvent::ProcessExit { code });
        });

        info!("Spawned frpc (PID: {})", pid);
        Ok(pid)
    }

    /// Kill the running child. The exit event follows asynchronously.
    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.child.lock().await;
        let Some(child) = slot.as_mut() else {
            return Err(DeckError::NotRunning.into());
        };
        match child.kill.take() {
            Some(kill) => {
                // The waiter may have just finished; then there is nothing to kill.
                let _ = kill.send(());
            }
            None => debug!("Stop already requested for PID {}", child.pid),
        }
        Ok(())
    }

    /// Whether a child exists
    pub async fn is_running(&self) -> bool {
        self.child.lock().await.is_some()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().map(|c| c.pid)
    }
}

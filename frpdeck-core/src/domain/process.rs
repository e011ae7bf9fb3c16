use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the single supervised agent process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// No process
    #[default]
    Stopped,
    /// Launch requested, waiting for the backend to confirm
    Starting,
    /// Backend confirmed the process is alive
    Running,
    /// Stop requested, waiting for the exit event
    Stopping,
}

impl ProcessState {
    /// Whether a process exists or is being launched
    pub fn is_live(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
        }
    }
}

//! Closed set of backend topics and their parsed payloads

use crate::error::{DeckError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Named channel the backend publishes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    DownloadProgress,
    ActivationStatus,
    ProcessStdout,
    ProcessStderr,
    ProcessExit,
}

impl Topic {
    /// Every topic the adapter understands
    pub const ALL: [Topic; 5] = [
        Topic::DownloadProgress,
        Topic::ActivationStatus,
        Topic::ProcessStdout,
        Topic::ProcessStderr,
        Topic::ProcessExit,
    ];

    /// Wire name of the topic
    pub fn name(self) -> &'static str {
        match self {
            Topic::DownloadProgress => "download-progress",
            Topic::ActivationStatus => "activation-status",
            Topic::ProcessStdout => "process-stdout",
            Topic::ProcessStderr => "process-stderr",
            Topic::ProcessExit => "process-exit",
        }
    }

    /// Look a topic up by wire name
    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backend event, validated once at the adapter boundary.
///
/// Downstream components only ever see this type, never raw JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendEvent {
    /// Download progress for a version, `0..=100`
    DownloadProgress { name: String, progress: u8 },
    /// An activation finished; `name` is set when the backend reports which version
    ActivationStatus {
        status: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Raw chunk written by the agent to stdout
    ProcessStdout { text: String },
    /// Raw chunk written by the agent to stderr
    ProcessStderr { text: String },
    /// The agent exited; `code` is absent when killed by a signal
    ProcessExit { code: Option<i32> },
}

#[derive(Deserialize)]
struct ProgressPayload {
    name: String,
    progress: i64,
}

#[derive(Deserialize)]
struct ActivationPayload {
    status: bool,
    #[serde(default)]
    name: Option<String>,
}

// The original backend emits bare strings for output lines.
#[derive(Deserialize)]
#[serde(untagged)]
enum TextPayload {
    Bare(String),
    Wrapped { text: String },
}

impl TextPayload {
    fn into_text(self) -> String {
        match self {
            TextPayload::Bare(text) | TextPayload::Wrapped { text } => text,
        }
    }
}

#[derive(Deserialize)]
struct ExitPayload {
    #[serde(default)]
    code: Option<i32>,
}

fn invalid(topic: Topic, reason: impl fmt::Display) -> DeckError {
    DeckError::InvalidPayload {
        topic: topic.name().to_string(),
        reason: reason.to_string(),
    }
}

impl BackendEvent {
    /// Topic this event belongs to
    pub fn topic(&self) -> Topic {
        match self {
            BackendEvent::DownloadProgress { .. } => Topic::DownloadProgress,
            BackendEvent::ActivationStatus { .. } => Topic::ActivationStatus,
            BackendEvent::ProcessStdout { .. } => Topic::ProcessStdout,
            BackendEvent::ProcessStderr { .. } => Topic::ProcessStderr,
            BackendEvent::ProcessExit { .. } => Topic::ProcessExit,
        }
    }

    /// Parse a raw payload received on `topic_name`
    pub fn parse(topic_name: &str, payload: Value) -> Result<Self> {
        let topic = Topic::from_name(topic_name)
            .ok_or_else(|| DeckError::UnknownTopic(topic_name.to_string()))?;

        match topic {
            Topic::DownloadProgress => {
                let p: ProgressPayload =
                    serde_json::from_value(payload).map_err(|e| invalid(topic, e))?;
                let progress = u8::try_from(p.progress)
                    .ok()
                    .filter(|v| *v <= 100)
                    .ok_or_else(|| invalid(topic, format!("progress {} out of range", p.progress)))?;
                Ok(BackendEvent::DownloadProgress {
                    name: p.name,
                    progress,
                })
            }
            Topic::ActivationStatus => {
                let p: ActivationPayload =
                    serde_json::from_value(payload).map_err(|e| invalid(topic, e))?;
                Ok(BackendEvent::ActivationStatus {
                    status: p.status,
                    name: p.name,
                })
            }
            Topic::ProcessStdout => {
                let p: TextPayload =
                    serde_json::from_value(payload).map_err(|e| invalid(topic, e))?;
                Ok(BackendEvent::ProcessStdout { text: p.into_text() })
            }
            Topic::ProcessStderr => {
                let p: TextPayload =
                    serde_json::from_value(payload).map_err(|e| invalid(topic, e))?;
                Ok(BackendEvent::ProcessStderr { text: p.into_text() })
            }
            Topic::ProcessExit => {
                let p: ExitPayload = if payload.is_null() {
                    ExitPayload { code: None }
                } else {
                    serde_json::from_value(payload).map_err(|e| invalid(topic, e))?
                };
                Ok(BackendEvent::ProcessExit { code: p.code })
            }
        }
    }

    /// Wire payload for this event, as the backend would publish it
    pub fn to_payload(&self) -> Value {
        match self {
            BackendEvent::DownloadProgress { name, progress } => {
                json!({ "name": name, "progress": progress })
            }
            BackendEvent::ActivationStatus { status, name } => match name {
                Some(name) => json!({ "status": status, "name": name }),
                None => json!({ "status": status }),
            },
            BackendEvent::ProcessStdout { text } | BackendEvent::ProcessStderr { text } => {
                json!({ "text": text })
            }
            BackendEvent::ProcessExit { code } => json!({ "code": code }),
        }
    }
}

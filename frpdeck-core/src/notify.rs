//! State updates fanned out to observers
//!
//! Every component reports observable changes through a shared [`Notifier`].
//! Observers call [`Notifier::subscribe`] and receive [`DeckUpdate`] values in
//! the order they were sent. Sending with nobody listening is not an error.

use crate::domain::ProcessState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A user-visible, point-in-time message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Notice {
    /// A version finished downloading and is now installed
    DownloadCompleted(String),
    /// A command failed at the backend
    Failure(String),
}

/// Observable state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeckUpdate {
    /// Install/active flags or the set of versions changed
    CatalogChanged,
    /// Download progress changed; `None` means the entry was removed
    ProgressChanged { name: String, percent: Option<u8> },
    /// A pending activation was resolved
    ActivationSettled { target: String, success: bool },
    /// Supervised process moved to a new state
    ProcessStateChanged { state: ProcessState },
    /// Log entries were appended
    LogAppended { first_seq: u64, last_seq: u64 },
    /// Log buffer was cleared
    LogCleared,
    /// User-visible notification
    Notice { notice: Notice },
}

/// Cloneable broadcast sender for [`DeckUpdate`]s
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<DeckUpdate>,
}

impl Notifier {
    /// Create a notifier whose observers may lag up to `buffer` updates
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    /// Register a new observer
    pub fn subscribe(&self) -> broadcast::Receiver<DeckUpdate> {
        self.sender.subscribe()
    }

    /// Send an update to every current observer
    pub fn send(&self, update: DeckUpdate) {
        // No receivers is fine; observers come and go.
        let _ = self.sender.send(update);
    }

    /// Send a user-visible notice
    pub fn notice(&self, notice: Notice) {
        self.send(DeckUpdate::Notice { notice });
    }

    /// Number of attached observers
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_updates_arrive_in_order() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.send(DeckUpdate::CatalogChanged);
        notifier.notice(Notice::DownloadCompleted("v1".into()));

        assert_eq!(rx.recv().await.unwrap(), DeckUpdate::CatalogChanged);
        assert_eq!(
            rx.recv().await.unwrap(),
            DeckUpdate::Notice {
                notice: Notice::DownloadCompleted("v1".into())
            }
        );
    }

    #[test]
    fn test_send_without_observers() {
        let notifier = Notifier::default();
        assert_eq!(notifier.observer_count(), 0);
        notifier.send(DeckUpdate::LogCleared);
    }

    #[test]
    fn test_update_serialization() {
        let json = serde_json::to_string(&DeckUpdate::ProgressChanged {
            name: "v1".into(),
            percent: Some(30),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"progress_changed\""));
        assert!(json.contains("\"percent\":30"));
    }
}

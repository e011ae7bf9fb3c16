//! Download coordinator
//!
//! Tracks per-version progress as a sparse map. A key is present while a
//! download is in flight or has just completed. Progress for a name without a
//! session opens one, so downloads started before this coordinator existed are
//! still tracked. Versions the catalog already lists as installed are the
//! exception: a late replay for them never reopens a finished download.

use crate::catalog::VersionCatalog;
use crate::error::{DeckError, Result};
use crate::facade::CommandFacade;
use crate::notify::{DeckUpdate, Notice, Notifier};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct Session {
    percent: u8,
    completing: bool,
}

/// Coordinates version downloads and their completion side effects
#[derive(Clone)]
pub struct DownloadCoordinator {
    facade: Arc<dyn CommandFacade>,
    catalog: VersionCatalog,
    notifier: Notifier,
    grace_delay: Duration,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("grace_delay", &self.grace_delay)
            .finish_non_exhaustive()
    }
}

impl DownloadCoordinator {
    pub fn new(
        facade: Arc<dyn CommandFacade>,
        catalog: VersionCatalog,
        notifier: Notifier,
        grace_delay: Duration,
    ) -> Self {
        Self {
            facade,
            catalog,
            notifier,
            grace_delay,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Begin downloading `name` from `url`.
    ///
    /// Fails with [`DeckError::AlreadyInFlight`] if a session exists. The
    /// session is opened at 0% before the backend is contacted; progress
    /// events then arrive on `download-progress`.
    pub async fn start_download(&self, name: &str, url: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(name) {
                tracing::warn!(version = %name, "Download already in flight");
                return Err(DeckError::AlreadyInFlight(name.to_string()));
            }
            sessions.insert(
                name.to_string(),
                Session {
                    percent: 0,
                    completing: false,
                },
            );
        }
        self.notifier.send(DeckUpdate::ProgressChanged {
            name: name.to_string(),
            percent: Some(0),
        });

        tracing::info!(version = %name, url = %url, "Starting download");
        if let Err(e) = self.facade.download_version(name, url).await {
            tracing::warn!(version = %name, error = %e, "Download failed");
            let removed = {
                let mut sessions = self.sessions.write().await;
                match sessions.get(name) {
                    Some(s) if !s.completing => sessions.remove(name).is_some(),
                    _ => false,
                }
            };
            if removed {
                self.notifier.send(DeckUpdate::ProgressChanged {
                    name: name.to_string(),
                    percent: None,
                });
            }
            self.notifier.notice(Notice::Failure(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply a progress event.
    ///
    /// Returns `true` if the event belongs to a tracked download. Unknown
    /// names open a session unless the catalog already has them installed.
    /// Repeated values are no-ops; other values overwrite the stored one. The
    /// first 100 schedules completion after the grace delay.
    pub async fn on_progress(&self, name: &str, percent: u8) -> bool {
        let percent = percent.min(100);
        let schedule = {
            let mut sessions = self.sessions.write().await;
            let session = match sessions.entry(name.to_string()) {
                Entry::Occupied(entry) => {
                    let session = entry.into_mut();
                    if session.percent == percent {
                        return true;
                    }
                    session
                }
                Entry::Vacant(entry) => {
                    if self.catalog.get(name).await.is_some_and(|r| r.installed) {
                        tracing::debug!(version = %name, percent, "Progress for installed version ignored");
                        return false;
                    }
                    tracing::info!(version = %name, percent, "Tracking download started elsewhere");
                    entry.insert(Session {
                        percent,
                        completing: false,
                    })
                }
            };
            session.percent = percent;
            let schedule = percent == 100 && !session.completing;
            if schedule {
                session.completing = true;
            }
            schedule
        };

        self.notifier.send(DeckUpdate::ProgressChanged {
            name: name.to_string(),
            percent: Some(percent),
        });

        if schedule {
            tracing::debug!(version = %name, delay = ?self.grace_delay, "Scheduling download completion");
            let this = self.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(this.grace_delay).await;
                this.complete(&name).await;
            });
        }
        true
    }

    async fn complete(&self, name: &str) {
        if !self.catalog.set_installed(name, true).await {
            tracing::warn!(version = %name, "Completed download is not in the catalog");
        }
        self.sessions.write().await.remove(name);
        self.notifier.send(DeckUpdate::ProgressChanged {
            name: name.to_string(),
            percent: None,
        });
        self.notifier
            .notice(Notice::DownloadCompleted(name.to_string()));
        tracing::info!(version = %name, "Download completed");
    }

    /// Delete a downloaded version.
    ///
    /// Rejected while a download session for `name` exists.
    pub async fn delete_version(&self, name: &str) -> Result<()> {
        if self.is_downloading(name).await {
            return Err(DeckError::AlreadyInFlight(name.to_string()));
        }
        if let Err(e) = self.facade.delete_version(name).await {
            tracing::warn!(version = %name, error = %e, "Delete failed");
            self.notifier.notice(Notice::Failure(e.to_string()));
            return Err(e.into());
        }
        self.catalog.mark_removed(name).await;
        tracing::info!(version = %name, "Version deleted");
        Ok(())
    }

    /// Current progress for `name`, if a session exists
    pub async fn progress(&self, name: &str) -> Option<u8> {
        self.sessions.read().await.get(name).map(|s| s.percent)
    }

    pub async fn is_downloading(&self, name: &str) -> bool {
        self.sessions.read().await.contains_key(name)
    }

    /// All sessions with their progress, sorted by name
    pub async fn snapshot(&self) -> BTreeMap<String, u8> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(name, s)| (name.clone(), s.percent))
            .collect()
    }

    /// Names with an open session
    pub async fn in_flight(&self) -> Vec<String> {
        self.snapshot().await.into_keys().collect()
    }
}

//! Activation state machine
//!
//! `Idle -> Pending(target) -> Idle`. One activation may be pending at a
//! time; a second request is rejected with [`DeckError::Busy`], never queued.
//! Confirmation arrives asynchronously on `activation-status` and is the only
//! path that sets a catalog record active.

use crate::catalog::VersionCatalog;
use crate::error::{DeckError, Result};
use crate::facade::CommandFacade;
use crate::notify::{DeckUpdate, Notice, Notifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Current activation intent
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ActivationIntent {
    #[default]
    Idle,
    Pending { target: String },
}

impl ActivationIntent {
    pub fn is_pending(&self) -> bool {
        matches!(self, ActivationIntent::Pending { .. })
    }

    /// Version the pending activation targets
    pub fn target(&self) -> Option<&str> {
        match self {
            ActivationIntent::Pending { target } => Some(target),
            ActivationIntent::Idle => None,
        }
    }
}

#[derive(Clone)]
pub struct ActivationMachine {
    facade: Arc<dyn CommandFacade>,
    catalog: VersionCatalog,
    notifier: Notifier,
    intent: Arc<RwLock<ActivationIntent>>,
}

impl std::fmt::Debug for ActivationMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationMachine").finish_non_exhaustive()
    }
}

impl ActivationMachine {
    pub fn new(facade: Arc<dyn CommandFacade>, catalog: VersionCatalog, notifier: Notifier) -> Self {
        Self {
            facade,
            catalog,
            notifier,
            intent: Arc::new(RwLock::new(ActivationIntent::Idle)),
        }
    }

    /// Request activation of `name`.
    ///
    /// Returns once the backend accepted the request; the outcome is applied
    /// when the `activation-status` event arrives.
    pub async fn activate(&self, name: &str) -> Result<()> {
        {
            let mut intent = self.intent.write().await;
            if let ActivationIntent::Pending { target } = &*intent {
                tracing::warn!(version = %name, pending = %target, "Activation busy");
                return Err(DeckError::Busy {
                    pending: target.clone(),
                });
            }
            if !self.catalog.contains(name).await {
                return Err(DeckError::UnknownVersion(name.to_string()));
            }
            *intent = ActivationIntent::Pending {
                target: name.to_string(),
            };
        }
        tracing::info!(version = %name, "Activation requested");

        if let Err(e) = self.facade.activate_version(name).await {
            tracing::warn!(version = %name, error = %e, "Activation request failed");
            let reset = {
                let mut intent = self.intent.write().await;
                let same = intent.target() == Some(name);
                if same {
                    *intent = ActivationIntent::Idle;
                }
                same
            };
            if reset {
                self.notifier.send(DeckUpdate::ActivationSettled {
                    target: name.to_string(),
                    success: false,
                });
            }
            self.notifier.notice(Notice::Failure(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply an `activation-status` event.
    ///
    /// Without a pending intent the event is ignored. If the event names a
    /// version other than the pending target it is ignored too, and the
    /// intent stays pending. Returns whether the intent was settled.
    pub async fn on_status(&self, status: bool, name: Option<&str>) -> bool {
        let mut intent = self.intent.write().await;
        let ActivationIntent::Pending { target } = &*intent else {
            tracing::debug!(status, "Activation status without pending intent ignored");
            return false;
        };
        if let Some(reported) = name
            && reported != target.as_str()
        {
            tracing::warn!(pending = %target, reported = %reported, "Activation status for another version ignored");
            return false;
        }

        let target = target.clone();
        if status && !self.catalog.set_active_exclusive(&target).await {
            tracing::warn!(version = %target, "Activated version is not in the catalog");
        }
        *intent = ActivationIntent::Idle;
        drop(intent);

        tracing::info!(version = %target, success = status, "Activation settled");
        self.notifier.send(DeckUpdate::ActivationSettled {
            target,
            success: status,
        });
        true
    }

    /// Deactivate `name`.
    ///
    /// The `active` flag is cleared before the backend answers. If the backend
    /// fails, the flag is restored unless another version became active.
    pub async fn deactivate(&self, name: &str) -> Result<()> {
        let was_active = self.catalog.clear_active(name).await;
        tracing::info!(version = %name, was_active, "Deactivation requested");

        if let Err(e) = self.facade.deactivate_version(name).await {
            tracing::warn!(version = %name, error = %e, "Deactivation failed");
            if was_active && !self.catalog.restore_active(name).await {
                tracing::debug!(version = %name, "Another version is active; not restoring");
            }
            self.notifier.notice(Notice::Failure(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn intent(&self) -> ActivationIntent {
        self.intent.read().await.clone()
    }

    pub async fn is_pending(&self) -> bool {
        self.intent.read().await.is_pending()
    }
}

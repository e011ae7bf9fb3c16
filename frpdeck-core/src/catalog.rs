//! Version catalog
//!
//! An indexed set of known agent versions. The catalog is the single owner of
//! the `installed` and `active` flags; at most one record is ever active.
//! Only the activation state machine may set a record active.

use crate::domain::VersionRecord;
use crate::error::Result;
use crate::facade::CommandFacade;
use crate::notify::{DeckUpdate, Notifier};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cloneable handle to the shared version index
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    index: Arc<RwLock<BTreeMap<String, VersionRecord>>>,
    notifier: Notifier,
}

impl VersionCatalog {
    /// Create an empty catalog
    pub fn new(notifier: Notifier) -> Self {
        Self {
            index: Arc::new(RwLock::new(BTreeMap::new())),
            notifier,
        }
    }

    /// Replace the whole index with a backend snapshot.
    ///
    /// Records named in `keep` survive even when the snapshot lacks them, so
    /// an in-flight download never loses its catalog entry. A snapshot with
    /// several active records keeps only the first by name.
    pub async fn replace_all(&self, snapshot: Vec<VersionRecord>, keep: &[String]) {
        let mut index = self.index.write().await;

        let mut next: BTreeMap<String, VersionRecord> = snapshot
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        for name in keep {
            if !next.contains_key(name)
                && let Some(record) = index.get(name)
            {
                next.insert(name.clone(), record.clone());
            }
        }

        let mut seen_active = false;
        for record in next.values_mut() {
            if record.active {
                if seen_active {
                    tracing::warn!(version = %record.name, "Snapshot had several active versions; clearing");
                    record.active = false;
                }
                seen_active = true;
            }
        }

        *index = next;
        tracing::debug!(count = index.len(), "Catalog replaced");
        drop(index);
        self.notifier.send(DeckUpdate::CatalogChanged);
    }

    /// Fetch the backend's version list and replace the index.
    ///
    /// On backend failure the index is left unchanged.
    pub async fn refresh(&self, facade: &dyn CommandFacade, keep: &[String]) -> Result<usize> {
        let snapshot = facade.get_versions().await?;
        let count = snapshot.len();
        self.replace_all(snapshot, keep).await;
        Ok(count)
    }

    /// Insert or update a record.
    ///
    /// The `active` flag is never taken from the incoming record; it keeps the
    /// value already held for that name (or `false` for a new name).
    pub async fn upsert(&self, mut record: VersionRecord) {
        let mut index = self.index.write().await;
        let current = index.get(&record.name).is_some_and(|r| r.active);
        if record.active != current {
            tracing::debug!(version = %record.name, "Ignoring active flag on upsert");
        }
        record.active = current;
        index.insert(record.name.clone(), record);
        drop(index);
        self.notifier.send(DeckUpdate::CatalogChanged);
    }

    pub async fn get(&self, name: &str) -> Option<VersionRecord> {
        self.index.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.index.read().await.contains_key(name)
    }

    /// All records, sorted by name
    pub async fn list(&self) -> Vec<VersionRecord> {
        self.index.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Set the `installed` flag. Returns `false` for unknown names.
    pub async fn set_installed(&self, name: &str, installed: bool) -> bool {
        self.update(name, |r| {
            let changed = r.installed != installed;
            r.installed = installed;
            changed
        })
        .await
    }

    /// Mark a record deleted: not installed and not active.
    ///
    /// The record stays in the index. Returns `false` for unknown names.
    pub async fn mark_removed(&self, name: &str) -> bool {
        self.update(name, |r| {
            let changed = r.installed || r.active;
            r.installed = false;
            r.active = false;
            changed
        })
        .await
    }

    /// Clear the `active` flag on `name`. Returns whether it was active.
    pub async fn clear_active(&self, name: &str) -> bool {
        let mut index = self.index.write().await;
        let was_active = match index.get_mut(name) {
            Some(record) if record.active => {
                record.active = false;
                true
            }
            _ => false,
        };
        drop(index);
        if was_active {
            self.notifier.send(DeckUpdate::CatalogChanged);
        }
        was_active
    }

    /// The active record, if any
    pub async fn active(&self) -> Option<VersionRecord> {
        self.index.read().await.values().find(|r| r.active).cloned()
    }

    /// Number of active records; always 0 or 1
    pub async fn active_count(&self) -> usize {
        self.index.read().await.values().filter(|r| r.active).count()
    }

    /// Make `name` the only active record, in one write.
    ///
    /// Returns `false` and changes nothing when `name` is unknown.
    pub(crate) async fn set_active_exclusive(&self, name: &str) -> bool {
        let mut index = self.index.write().await;
        if !index.contains_key(name) {
            return false;
        }
        for record in index.values_mut() {
            record.active = record.name == name;
        }
        drop(index);
        tracing::info!(version = %name, "Active version set");
        self.notifier.send(DeckUpdate::CatalogChanged);
        true
    }

    /// Set `name` active only if no record is active right now
    pub(crate) async fn restore_active(&self, name: &str) -> bool {
        let mut index = self.index.write().await;
        if index.values().any(|r| r.active) {
            return false;
        }
        let Some(record) = index.get_mut(name) else {
            return false;
        };
        record.active = true;
        drop(index);
        self.notifier.send(DeckUpdate::CatalogChanged);
        true
    }

    async fn update<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut VersionRecord) -> bool,
    {
        let mut index = self.index.write().await;
        let Some(record) = index.get_mut(name) else {
            tracing::debug!(version = %name, "Version not in catalog");
            return false;
        };
        let changed = f(record);
        drop(index);
        if changed {
            self.notifier.send(DeckUpdate::CatalogChanged);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubFacade;

    fn record(name: &str) -> VersionRecord {
        VersionRecord::new(name, name, format!("http://x/{name}"))
    }

    fn catalog() -> VersionCatalog {
        VersionCatalog::new(Notifier::default())
    }

    #[tokio::test]
    async fn test_replace_all_keeps_in_flight() {
        let catalog = catalog();
        catalog.upsert(record("v1")).await;
        catalog.upsert(record("v2")).await;

        catalog
            .replace_all(vec![record("v3")], &["v2".to_string()])
            .await;

        let names: Vec<_> = catalog.list().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["v2", "v3"]);
    }

    #[tokio::test]
    async fn test_snapshot_with_two_actives_is_normalised() {
        let catalog = catalog();
        catalog
            .replace_all(vec![record("b").active(), record("a").active()], &[])
            .await;

        assert_eq!(catalog.active_count().await, 1);
        assert_eq!(catalog.active().await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_upsert_never_sets_active() {
        let catalog = catalog();
        catalog.upsert(record("v1").active()).await;
        assert_eq!(catalog.active_count().await, 0);

        assert!(catalog.set_active_exclusive("v1").await);
        catalog.upsert(record("v1").installed()).await;
        let v1 = catalog.get("v1").await.unwrap();
        assert!(v1.active);
        assert!(v1.installed);
    }

    #[tokio::test]
    async fn test_set_active_exclusive_switches() {
        let catalog = catalog();
        catalog.upsert(record("v1")).await;
        catalog.upsert(record("v2")).await;

        assert!(catalog.set_active_exclusive("v1").await);
        assert!(catalog.set_active_exclusive("v2").await);
        assert!(!catalog.set_active_exclusive("missing").await);

        assert_eq!(catalog.active_count().await, 1);
        assert_eq!(catalog.active().await.unwrap().name, "v2");
    }

    #[tokio::test]
    async fn test_mark_removed_keeps_record() {
        let catalog = catalog();
        catalog.upsert(record("v1").installed()).await;
        catalog.set_active_exclusive("v1").await;

        assert!(catalog.mark_removed("v1").await);
        let v1 = catalog.get("v1").await.unwrap();
        assert!(!v1.installed);
        assert!(!v1.active);
        assert!(!catalog.mark_removed("nope").await);
    }

    #[tokio::test]
    async fn test_restore_active_only_when_none_active() {
        let catalog = catalog();
        catalog.upsert(record("v1")).await;
        catalog.upsert(record("v2")).await;
        catalog.set_active_exclusive("v2").await;

        assert!(!catalog.restore_active("v1").await);
        assert!(catalog.clear_active("v2").await);
        assert!(catalog.restore_active("v1").await);
        assert_eq!(catalog.active().await.unwrap().name, "v1");
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_index() {
        let facade = StubFacade::new();
        let catalog = catalog();
        catalog.upsert(record("v1")).await;

        facade.fail("get_versions", "offline");
        assert!(catalog.refresh(&facade, &[]).await.is_err());
        assert!(catalog.contains("v1").await);

        facade.clear_failures();
        facade.set_versions(vec![record("v9")]);
        assert_eq!(catalog.refresh(&facade, &[]).await.unwrap(), 1);
        assert!(!catalog.contains("v1").await);
        assert!(catalog.contains("v9").await);
    }

    #[tokio::test]
    async fn test_changes_are_notified() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();
        let catalog = VersionCatalog::new(notifier);

        catalog.upsert(record("v1")).await;
        assert_eq!(rx.recv().await.unwrap(), DeckUpdate::CatalogChanged);

        // Unchanged flag: no update
        catalog.set_installed("v1", false).await;
        assert!(rx.try_recv().is_err());
    }
}

//! In-process adapters used when no `DATABASE_URL` is configured, and by
//! the orchestrator and API test suites.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use feedrun_core::plugin::Plugin;
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::DbId;
use tokio::sync::RwLock;

use super::{PluginCatalog, PluginInstanceStore};
use crate::error::DbError;
use crate::models::plugin::NewPlugin;
use crate::models::plugin_instance::{NewPluginInstance, PluginInstance, PluginInstanceFilter};

#[derive(Default)]
struct InstanceTable {
    next_id: DbId,
    rows: BTreeMap<DbId, PluginInstance>,
}

impl InstanceTable {
    /// Breadth-first walk of the subtree below `id`.
    fn descendant_ids(&self, id: DbId) -> Vec<DbId> {
        let mut found = Vec::new();
        let mut frontier = VecDeque::from([id]);
        while let Some(parent) = frontier.pop_front() {
            for child in self
                .rows
                .values()
                .filter(|row| row.previous_id == Some(parent))
            {
                found.push(child.id);
                frontier.push_back(child.id);
            }
        }
        found
    }
}

/// [`PluginInstanceStore`] held in a `BTreeMap` behind a `tokio` lock.
#[derive(Default)]
pub struct MemoryPluginInstanceStore {
    table: RwLock<InstanceTable>,
}

impl MemoryPluginInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginInstanceStore for MemoryPluginInstanceStore {
    async fn insert(&self, new: NewPluginInstance) -> Result<PluginInstance, DbError> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let id = table.next_id;
        let instance = PluginInstance {
            id,
            title: new.title,
            plugin_id: new.plugin_id,
            plugin_name: new.plugin_name,
            plugin_version: new.plugin_version,
            plugin_type: new.plugin_type,
            previous_id: new.previous_id,
            compute_resource: new.compute_resource,
            parameters: new.parameters,
            status: new.status,
            job_handle: None,
            owner: new.owner,
            limits: new.limits,
            summary: new.summary,
            dispatch_claimed_at: None,
            version: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: new.ended_at,
        };
        table.rows.insert(id, instance.clone());
        Ok(instance)
    }

    async fn get(&self, id: DbId) -> Result<Option<PluginInstance>, DbError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn list(&self, filter: &PluginInstanceFilter) -> Result<Vec<PluginInstance>, DbError> {
        let table = self.table.read().await;
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter
            .limit
            .map_or(usize::MAX, |limit| limit.max(0) as usize);
        Ok(table
            .rows
            .values()
            .rev()
            .filter(|row| filter.matches(row))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn descendants(&self, id: DbId) -> Result<Vec<PluginInstance>, DbError> {
        let table = self.table.read().await;
        Ok(table
            .descendant_ids(id)
            .into_iter()
            .filter_map(|child| table.rows.get(&child).cloned())
            .collect())
    }

    async fn save(
        &self,
        instance: &PluginInstance,
        expected: PluginInstanceStatus,
    ) -> Result<Option<PluginInstance>, DbError> {
        let mut table = self.table.write().await;
        let Some(stored) = table.rows.get_mut(&instance.id) else {
            return Ok(None);
        };
        if stored.version != instance.version || stored.status != expected {
            return Ok(None);
        }

        stored.status = instance.status;
        if stored.job_handle.is_none() {
            stored.job_handle = instance.job_handle.clone();
        }
        stored.summary = instance.summary.clone();
        stored.dispatch_claimed_at = instance.dispatch_claimed_at;
        stored.started_at = instance.started_at;
        stored.ended_at = instance.ended_at;
        stored.version += 1;
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: DbId) -> Result<bool, DbError> {
        let mut table = self.table.write().await;
        if !table.rows.contains_key(&id) {
            return Ok(false);
        }
        for child in table.descendant_ids(id) {
            table.rows.remove(&child);
        }
        table.rows.remove(&id);
        Ok(true)
    }
}

/// [`PluginCatalog`] held in memory.
#[derive(Default)]
pub struct MemoryPluginCatalog {
    plugins: RwLock<BTreeMap<DbId, Plugin>>,
}

impl MemoryPluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginCatalog for MemoryPluginCatalog {
    async fn get(&self, id: DbId) -> Result<Option<Plugin>, DbError> {
        Ok(self.plugins.read().await.get(&id).cloned())
    }

    async fn register(&self, plugin: NewPlugin) -> Result<Plugin, DbError> {
        let mut plugins = self.plugins.write().await;
        let existing = plugins
            .values()
            .find(|p| p.name == plugin.name && p.version == plugin.version)
            .map(|p| p.id);
        let id = existing.unwrap_or_else(|| plugins.keys().next_back().map_or(1, |last| last + 1));
        let registered = plugin.into_plugin(id);
        plugins.insert(id, registered.clone());
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use feedrun_core::plugin::{PluginKind, ResourceBounds, ResourceLimits};
    use feedrun_core::types::JobHandle;

    use super::*;

    fn new_instance(previous_id: Option<DbId>, status: PluginInstanceStatus) -> NewPluginInstance {
        NewPluginInstance {
            title: String::new(),
            plugin_id: 1,
            plugin_name: "pl-test".to_string(),
            plugin_version: "1.0.0".to_string(),
            plugin_type: if previous_id.is_some() {
                PluginKind::Ds
            } else {
                PluginKind::Fs
            },
            previous_id,
            compute_resource: "host".to_string(),
            parameters: Default::default(),
            status,
            owner: "chris".to_string(),
            limits: ResourceLimits::default(),
            summary: None,
            ended_at: None,
        }
    }

    // -----------------------------------------------------------------------
    // insert / get / list
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = MemoryPluginInstanceStore::new();
        let a = store
            .insert(new_instance(None, PluginInstanceStatus::Scheduled))
            .await
            .unwrap();
        let b = store
            .insert(new_instance(Some(a.id), PluginInstanceStatus::WaitingForPrevious))
            .await
            .unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.version, 0);
        assert_eq!(store.get(2).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let store = MemoryPluginInstanceStore::new();
        let root = store
            .insert(new_instance(None, PluginInstanceStatus::Scheduled))
            .await
            .unwrap();
        store
            .insert(new_instance(Some(root.id), PluginInstanceStatus::WaitingForPrevious))
            .await
            .unwrap();
        store
            .insert(new_instance(Some(root.id), PluginInstanceStatus::WaitingForPrevious))
            .await
            .unwrap();

        let waiting = store
            .list(&PluginInstanceFilter::with_status(
                PluginInstanceStatus::WaitingForPrevious,
            ))
            .await
            .unwrap();
        let ids: Vec<DbId> = waiting.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let paged = store
            .list(&PluginInstanceFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, 2);
    }

    // -----------------------------------------------------------------------
    // save
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn save_bumps_version_and_rejects_stale_copies() {
        let store = MemoryPluginInstanceStore::new();
        let original = store
            .insert(new_instance(None, PluginInstanceStatus::Scheduled))
            .await
            .unwrap();

        let mut started = original.clone();
        started.status = PluginInstanceStatus::Started;
        started.job_handle = Some(JobHandle::new("jid-1"));
        let saved = store
            .save(&started, PluginInstanceStatus::Scheduled)
            .await
            .unwrap()
            .expect("first save wins");
        assert_eq!(saved.version, 1);

        let mut stale = original;
        stale.status = PluginInstanceStatus::Cancelled;
        assert_matches!(
            store.save(&stale, PluginInstanceStatus::Scheduled).await,
            Ok(None)
        );
    }

    #[tokio::test]
    async fn save_requires_expected_status() {
        let store = MemoryPluginInstanceStore::new();
        let mut instance = store
            .insert(new_instance(None, PluginInstanceStatus::Scheduled))
            .await
            .unwrap();
        instance.status = PluginInstanceStatus::Cancelled;
        assert_matches!(
            store.save(&instance, PluginInstanceStatus::Started).await,
            Ok(None)
        );
    }

    #[tokio::test]
    async fn save_never_replaces_a_stored_handle() {
        let store = MemoryPluginInstanceStore::new();
        let mut instance = store
            .insert(new_instance(None, PluginInstanceStatus::Scheduled))
            .await
            .unwrap();
        instance.status = PluginInstanceStatus::Started;
        instance.job_handle = Some(JobHandle::new("jid-1"));
        let mut instance = store
            .save(&instance, PluginInstanceStatus::Scheduled)
            .await
            .unwrap()
            .unwrap();

        instance.status = PluginInstanceStatus::FinishedSuccessfully;
        instance.job_handle = Some(JobHandle::new("other"));
        let saved = store
            .save(&instance, PluginInstanceStatus::Started)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.job_handle, Some(JobHandle::new("jid-1")));
    }

    // -----------------------------------------------------------------------
    // descendants / delete
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn descendants_are_breadth_first_and_delete_cascades() {
        let store = MemoryPluginInstanceStore::new();
        let waiting = PluginInstanceStatus::WaitingForPrevious;
        let a = store
            .insert(new_instance(None, PluginInstanceStatus::Scheduled))
            .await
            .unwrap();
        let b = store.insert(new_instance(Some(a.id), waiting)).await.unwrap();
        let c = store.insert(new_instance(Some(b.id), waiting)).await.unwrap();
        let d = store.insert(new_instance(Some(a.id), waiting)).await.unwrap();
        let other = store
            .insert(new_instance(None, PluginInstanceStatus::Scheduled))
            .await
            .unwrap();

        let ids: Vec<DbId> = store
            .descendants(a.id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![b.id, d.id, c.id]);

        assert!(store.delete(a.id).await.unwrap());
        assert!(store.get(c.id).await.unwrap().is_none());
        assert!(store.get(other.id).await.unwrap().is_some());
        assert!(!store.delete(a.id).await.unwrap());
    }

    // -----------------------------------------------------------------------
    // catalog
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn catalog_reregistration_keeps_id() {
        let catalog = MemoryPluginCatalog::new();
        let plugin = NewPlugin {
            name: "pl-dircopy".to_string(),
            version: "2.1.1".to_string(),
            kind: PluginKind::Fs,
            dock_image: "fnndsc/pl-dircopy".to_string(),
            execshell: "python3".to_string(),
            selfpath: "/usr/local/bin".to_string(),
            selfexec: "dircopy".to_string(),
            parameters: vec![],
            compute_resources: vec!["host".to_string()],
            resource_bounds: ResourceBounds::default(),
        };
        let first = catalog.register(plugin.clone()).await.unwrap();
        let again = catalog.register(plugin).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(again.id, 1);
        assert_eq!(catalog.get(1).await.unwrap(), Some(again));
    }
}

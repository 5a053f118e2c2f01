//! Repository traits and their adapters.

use async_trait::async_trait;
use feedrun_core::plugin::Plugin;
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::DbId;

use crate::error::DbError;
use crate::models::plugin::NewPlugin;
use crate::models::plugin_instance::{NewPluginInstance, PluginInstance, PluginInstanceFilter};

pub mod memory;
pub mod plugin_instance_repo;
pub mod plugin_repo;

pub use memory::{MemoryPluginCatalog, MemoryPluginInstanceStore};
pub use plugin_instance_repo::PluginInstanceRepo;
pub use plugin_repo::PluginRepo;

/// Storage for plugin instance records.
///
/// `save` is the only mutation of an existing record and is optimistic: it
/// succeeds only when the stored row still has the caller's `version` and
/// is still in `expected` status. A lost race returns `Ok(None)` so the
/// caller can re-read and re-check its precondition.
#[async_trait]
pub trait PluginInstanceStore: Send + Sync {
    /// Insert a new instance and return the stored record.
    async fn insert(&self, new: NewPluginInstance) -> Result<PluginInstance, DbError>;

    /// Find an instance by its ID.
    async fn get(&self, id: DbId) -> Result<Option<PluginInstance>, DbError>;

    /// List instances matching `filter`, newest first.
    async fn list(&self, filter: &PluginInstanceFilter) -> Result<Vec<PluginInstance>, DbError>;

    /// Every instance downstream of `id`, breadth-first, excluding `id`.
    async fn descendants(&self, id: DbId) -> Result<Vec<PluginInstance>, DbError>;

    /// Persist the mutable fields of `instance` if it is unchanged since it
    /// was read and still in `expected` status.
    ///
    /// A stored `job_handle` is never overwritten.
    async fn save(
        &self,
        instance: &PluginInstance,
        expected: PluginInstanceStatus,
    ) -> Result<Option<PluginInstance>, DbError>;

    /// Delete an instance together with its whole subtree.
    ///
    /// Returns `false` if the instance did not exist.
    async fn delete(&self, id: DbId) -> Result<bool, DbError>;
}

/// Read access to registered plugins.
#[async_trait]
pub trait PluginCatalog: Send + Sync {
    /// Find a plugin by its ID.
    async fn get(&self, id: DbId) -> Result<Option<Plugin>, DbError>;

    /// Register a plugin and return it with its assigned ID.
    async fn register(&self, plugin: NewPlugin) -> Result<Plugin, DbError>;
}

//! Create, read, cancel and delete operations on plugin instances.

use chrono::Utc;
use feedrun_core::error::CoreError;
use feedrun_core::parameters::validate_parameters;
use feedrun_core::resolver::{cascade_reason, resolve};
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::DbId;
use feedrun_db::models::plugin_instance::{
    CreatePluginInstance, NewPluginInstance, PluginInstance, PluginInstanceFilter,
    UpdatePluginInstance,
};
use validator::Validate;

use crate::context::Orchestrator;
use crate::scheduler::WorkItem;
use crate::transition::Transition;

/// Page size when a list request names none.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a list request may ask for.
pub const MAX_PAGE_SIZE: i64 = 100;

impl Orchestrator {
    /// Create a plugin instance owned by `owner`.
    ///
    /// The instance is stored in the status its previous instance calls
    /// for, and a dispatch is enqueued when it is ready to run.
    pub async fn create(
        &self,
        plugin_id: DbId,
        owner: &str,
        input: CreatePluginInstance,
    ) -> Result<PluginInstance, CoreError> {
        input
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let plugin = self
            .catalog
            .get(plugin_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Plugin",
                id: plugin_id,
            })?;

        let previous = match (plugin.kind.requires_previous(), input.previous_id) {
            (true, None) => {
                return Err(CoreError::Validation(format!(
                    "A previous plugin instance is required for '{}' plugins.",
                    plugin.kind
                )));
            }
            (false, Some(_)) => {
                return Err(CoreError::Validation(format!(
                    "Plugins of type '{}' can not have a previous plugin instance.",
                    plugin.kind
                )));
            }
            (true, Some(previous_id)) => Some(self.store.get(previous_id).await?.ok_or_else(
                || {
                    CoreError::Validation(format!(
                        "Couldn't find any 'previous' plugin instance with id {previous_id}"
                    ))
                },
            )?),
            (false, None) => None,
        };

        let compute_resource =
            plugin.select_compute_resource(input.compute_resource_name.as_deref())?;
        if !self.compute.contains(&compute_resource) {
            return Err(CoreError::Validation(format!(
                "Compute resource '{compute_resource}' is not configured."
            )));
        }
        let limits = plugin.resource_bounds.resolve(&input.limits)?;
        let parameters = validate_parameters(&plugin.parameters, &input.parameters)?;

        let decision = resolve(previous.as_ref().map(|p| p.status));
        let (summary, ended_at) = match (&previous, decision.status) {
            (Some(p), PluginInstanceStatus::Cancelled) => {
                (Some(cascade_reason(p.id, p.status)), Some(Utc::now()))
            }
            _ => (None, None),
        };

        let instance = self
            .store
            .insert(NewPluginInstance {
                title: input.title.unwrap_or_default(),
                plugin_id: plugin.id,
                plugin_name: plugin.name.clone(),
                plugin_version: plugin.version.clone(),
                plugin_type: plugin.kind,
                previous_id: previous.as_ref().map(|p| p.id),
                compute_resource,
                parameters,
                status: decision.status,
                owner: owner.to_string(),
                limits,
                summary,
                ended_at,
            })
            .await?;

        tracing::info!(
            instance_id = instance.id,
            plugin = %plugin.name,
            previous_id = ?instance.previous_id,
            status = %instance.status,
            owner,
            "Plugin instance created",
        );
        if decision.dispatch {
            self.queue.enqueue(WorkItem::Dispatch(instance.id));
        }
        Ok(instance)
    }

    pub async fn get(&self, id: DbId) -> Result<PluginInstance, CoreError> {
        self.store.get(id).await?.ok_or(CoreError::NotFound {
            entity: "PluginInstance",
            id,
        })
    }

    /// List instances, newest first, in pages of at most [`MAX_PAGE_SIZE`].
    pub async fn list(
        &self,
        filter: &PluginInstanceFilter,
    ) -> Result<Vec<PluginInstance>, CoreError> {
        let filter = PluginInstanceFilter {
            limit: Some(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)),
            offset: Some(filter.offset.unwrap_or(0).max(0)),
            ..filter.clone()
        };
        Ok(self.store.list(&filter).await?)
    }

    /// Every instance downstream of `id`, breadth-first.
    pub async fn descendants(&self, id: DbId) -> Result<Vec<PluginInstance>, CoreError> {
        self.get(id).await?;
        Ok(self.store.descendants(id).await?)
    }

    /// Cancel a non-terminal instance and everything below it.
    ///
    /// Fails with [`CoreError::Conflict`] if the instance already reached a
    /// terminal status.
    pub async fn request_cancel(&self, id: DbId) -> Result<PluginInstance, CoreError> {
        let cancelled = match self.cancel_instance(id, None).await? {
            Transition::Applied(instance) => instance,
            Transition::Skipped(current) => {
                return Err(CoreError::Conflict(format!(
                    "Plugin instance {id} is already '{}'.",
                    current.status
                )));
            }
            Transition::Missing => {
                return Err(CoreError::NotFound {
                    entity: "PluginInstance",
                    id,
                });
            }
        };
        self.cascade_cancel(id).await?;
        Ok(cancelled)
    }

    /// Apply a client status update. Only `cancelled` is accepted.
    pub async fn update_status(
        &self,
        id: DbId,
        update: &UpdatePluginInstance,
    ) -> Result<PluginInstance, CoreError> {
        let requested: PluginInstanceStatus = update.status.parse()?;
        if requested != PluginInstanceStatus::Cancelled {
            return Err(CoreError::Validation(format!(
                "Can not change status to '{requested}'. Only '{}' is allowed.",
                PluginInstanceStatus::Cancelled
            )));
        }
        let current = self.get(id).await?;
        if current.status.is_terminal() {
            current.status.validate_transition(requested)?;
        }
        self.request_cancel(id).await
    }

    /// Delete an instance and its whole subtree.
    ///
    /// Non-terminal instances are cancelled first so their remote jobs get
    /// stopped; the queued remote cancels do not need the deleted records.
    pub async fn delete(&self, id: DbId) -> Result<(), CoreError> {
        let instance = self.get(id).await?;
        if !instance.status.is_terminal() {
            self.cancel_instance(id, None).await?;
        }
        self.cascade_cancel(id).await?;

        if !self.store.delete(id).await? {
            return Err(CoreError::NotFound {
                entity: "PluginInstance",
                id,
            });
        }
        tracing::info!(instance_id = id, "Plugin instance deleted with descendants");
        Ok(())
    }
}

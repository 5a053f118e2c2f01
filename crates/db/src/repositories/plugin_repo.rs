//! PostgreSQL adapter for the `plugins` table.

use async_trait::async_trait;
use feedrun_core::plugin::Plugin;
use feedrun_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use super::PluginCatalog;
use crate::error::DbError;
use crate::models::plugin::{NewPlugin, PluginRow};

/// Column list for `plugins` queries.
const COLUMNS: &str = "\
    id, name, version, plugin_type, dock_image, execshell, selfpath, selfexec, \
    parameters, compute_resources, resource_bounds";

/// PostgreSQL-backed [`PluginCatalog`].
#[derive(Clone)]
pub struct PluginRepo {
    pool: PgPool,
}

impl PluginRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PluginCatalog for PluginRepo {
    async fn get(&self, id: DbId) -> Result<Option<Plugin>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM plugins WHERE id = $1");
        sqlx::query_as::<_, PluginRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Plugin::try_from)
            .transpose()
    }

    async fn register(&self, plugin: NewPlugin) -> Result<Plugin, DbError> {
        // Re-registering the same name/version refreshes the descriptor.
        let query = format!(
            "INSERT INTO plugins \
                 (name, version, plugin_type, dock_image, execshell, selfpath, selfexec, \
                  parameters, compute_resources, resource_bounds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT ON CONSTRAINT uq_plugins_name_version DO UPDATE SET \
                 plugin_type = EXCLUDED.plugin_type, \
                 dock_image = EXCLUDED.dock_image, \
                 execshell = EXCLUDED.execshell, \
                 selfpath = EXCLUDED.selfpath, \
                 selfexec = EXCLUDED.selfexec, \
                 parameters = EXCLUDED.parameters, \
                 compute_resources = EXCLUDED.compute_resources, \
                 resource_bounds = EXCLUDED.resource_bounds \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, PluginRow>(&query)
            .bind(&plugin.name)
            .bind(&plugin.version)
            .bind(plugin.kind.as_str())
            .bind(&plugin.dock_image)
            .bind(&plugin.execshell)
            .bind(&plugin.selfpath)
            .bind(&plugin.selfexec)
            .bind(Json(&plugin.parameters))
            .bind(&plugin.compute_resources)
            .bind(Json(&plugin.resource_bounds))
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }
}

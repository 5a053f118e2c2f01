//! Plugin catalog rows.

use feedrun_core::parameters::PluginParameter;
use feedrun_core::plugin::{Plugin, PluginKind, ResourceBounds};
use feedrun_core::types::DbId;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::error::DbError;

/// A row from the `plugins` table.
#[derive(Debug, Clone, FromRow)]
pub struct PluginRow {
    pub id: DbId,
    pub name: String,
    pub version: String,
    pub plugin_type: String,
    pub dock_image: String,
    pub execshell: String,
    pub selfpath: String,
    pub selfexec: String,
    pub parameters: Json<Vec<PluginParameter>>,
    pub compute_resources: Vec<String>,
    pub resource_bounds: Json<ResourceBounds>,
}

impl TryFrom<PluginRow> for Plugin {
    type Error = DbError;

    fn try_from(row: PluginRow) -> Result<Self, Self::Error> {
        let kind = row
            .plugin_type
            .parse::<PluginKind>()
            .map_err(|e| DbError::Corrupt {
                entity: "Plugin",
                id: row.id,
                reason: e.to_string(),
            })?;
        Ok(Plugin {
            id: row.id,
            name: row.name,
            version: row.version,
            kind,
            dock_image: row.dock_image,
            execshell: row.execshell,
            selfpath: row.selfpath,
            selfexec: row.selfexec,
            parameters: row.parameters.0,
            compute_resources: row.compute_resources,
            resource_bounds: row.resource_bounds.0,
        })
    }
}

/// A plugin to register in the catalog (the id is assigned on insert).
#[derive(Debug, Clone, Deserialize)]
pub struct NewPlugin {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    pub dock_image: String,
    pub execshell: String,
    pub selfpath: String,
    pub selfexec: String,
    #[serde(default)]
    pub parameters: Vec<PluginParameter>,
    pub compute_resources: Vec<String>,
    #[serde(default)]
    pub resource_bounds: ResourceBounds,
}

impl NewPlugin {
    pub fn into_plugin(self, id: DbId) -> Plugin {
        Plugin {
            id,
            name: self.name,
            version: self.version,
            kind: self.kind,
            dock_image: self.dock_image,
            execshell: self.execshell,
            selfpath: self.selfpath,
            selfexec: self.selfexec,
            parameters: self.parameters,
            compute_resources: self.compute_resources,
            resource_bounds: self.resource_bounds,
        }
    }
}

//! Catalog seeding from a JSON plugin registry file.
//!
//! The file holds an array of plugin descriptors. Registration is keyed by
//! `(name, version)`, so re-seeding the same file is harmless.

use std::path::Path;

use feedrun_core::error::CoreError;
use feedrun_db::models::plugin::NewPlugin;
use feedrun_db::repositories::PluginCatalog;
use feedrun_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read plugin registry {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid plugin registry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid plugin {name}: {source}")]
    Invalid { name: String, source: CoreError },

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Parse a plugin registry document, rejecting plugins whose resource
/// bounds no instance could satisfy.
pub fn parse_registry(raw: &str) -> Result<Vec<NewPlugin>, SeedError> {
    let plugins: Vec<NewPlugin> = serde_json::from_str(raw)?;
    for plugin in &plugins {
        plugin
            .resource_bounds
            .validate()
            .map_err(|source| SeedError::Invalid {
                name: format!("{} {}", plugin.name, plugin.version),
                source,
            })?;
    }
    Ok(plugins)
}

/// Register every plugin in the file at `path`; returns how many were registered.
pub async fn seed_catalog(catalog: &dyn PluginCatalog, path: &Path) -> Result<usize, SeedError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let plugins = parse_registry(&raw)?;
    let count = plugins.len();
    for new in plugins {
        let plugin = catalog.register(new).await?;
        tracing::debug!(plugin_id = plugin.id, name = %plugin.name, version = %plugin.version, "Plugin registered");
    }
    Ok(count)
}

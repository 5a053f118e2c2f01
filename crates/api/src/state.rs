use std::sync::Arc;

use feedrun_orchestrator::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the orchestrator holds its stores behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle operations on plugin instances.
    pub orchestrator: Orchestrator,
    /// Connection pool when running against PostgreSQL; `None` in memory mode.
    pub pool: Option<feedrun_db::DbPool>,
    pub config: Arc<ServerConfig>,
}

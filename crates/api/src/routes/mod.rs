pub mod health;
pub mod plugin_instances;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /plugins/{plugin_id}/instances        create
///
/// /plugin-instances                     list
/// /plugin-instances/{id}                get, update (cancel), delete
/// /plugin-instances/{id}/descendants    descendant list
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/plugins", plugin_instances::plugin_router())
        .nest("/plugin-instances", plugin_instances::router())
}

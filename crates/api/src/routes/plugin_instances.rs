//! Route definitions for plugin instances.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::plugin_instances;
use crate::state::AppState;

/// Routes mounted at `/plugins`.
///
/// ```text
/// POST   /{plugin_id}/instances   -> create_instance
/// ```
pub fn plugin_router() -> Router<AppState> {
    Router::new().route(
        "/{plugin_id}/instances",
        post(plugin_instances::create_instance),
    )
}

/// Routes mounted at `/plugin-instances`.
///
/// ```text
/// GET    /                  -> list_instances
/// GET    /{id}              -> get_instance
/// PUT    /{id}              -> update_instance
/// DELETE /{id}              -> delete_instance
/// GET    /{id}/descendants  -> list_descendants
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(plugin_instances::list_instances))
        .route(
            "/{id}",
            get(plugin_instances::get_instance)
                .put(plugin_instances::update_instance)
                .delete(plugin_instances::delete_instance),
        )
        .route("/{id}/descendants", get(plugin_instances::list_descendants))
}

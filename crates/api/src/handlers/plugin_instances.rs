//! Handlers for plugin instances.
//!
//! Every endpoint requires a [`RemoteUser`]. New instances are owned by the
//! caller.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use feedrun_core::types::DbId;
use feedrun_db::models::plugin_instance::{
    CreatePluginInstance, PluginInstanceFilter, UpdatePluginInstance,
};

use crate::error::AppResult;
use crate::middleware::remote_user::RemoteUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/plugins/{plugin_id}/instances
///
/// Create an instance of a plugin. Returns 201 with the stored record, in
/// whatever status its previous instance called for.
pub async fn create_instance(
    user: RemoteUser,
    State(state): State<AppState>,
    Path(plugin_id): Path<DbId>,
    Json(input): Json<CreatePluginInstance>,
) -> AppResult<impl IntoResponse> {
    let instance = state
        .orchestrator
        .create(plugin_id, &user.username, input)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: instance })))
}

/// GET /api/v1/plugin-instances
pub async fn list_instances(
    _user: RemoteUser,
    State(state): State<AppState>,
    Query(filter): Query<PluginInstanceFilter>,
) -> AppResult<impl IntoResponse> {
    let instances = state.orchestrator.list(&filter).await?;
    Ok(Json(DataResponse { data: instances }))
}

/// GET /api/v1/plugin-instances/{id}
pub async fn get_instance(
    _user: RemoteUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let instance = state.orchestrator.get(id).await?;
    Ok(Json(DataResponse { data: instance }))
}

/// PUT /api/v1/plugin-instances/{id}
///
/// Only `{"status": "cancelled"}` is accepted. Cancelling an instance that
/// already finished returns 409.
pub async fn update_instance(
    user: RemoteUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdatePluginInstance>,
) -> AppResult<impl IntoResponse> {
    let instance = state.orchestrator.update_status(id, &input).await?;

    tracing::info!(
        instance_id = id,
        status = %instance.status,
        user = %user.username,
        "Plugin instance updated",
    );

    Ok(Json(DataResponse { data: instance }))
}

/// DELETE /api/v1/plugin-instances/{id}
///
/// Cancels the instance if it is still running and deletes it together with
/// every descendant. Returns 204.
pub async fn delete_instance(
    user: RemoteUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    state.orchestrator.delete(id).await?;
    tracing::info!(instance_id = id, user = %user.username, "Plugin instance delete requested");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/plugin-instances/{id}/descendants
pub async fn list_descendants(
    _user: RemoteUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let instances = state.orchestrator.descendants(id).await?;
    Ok(Json(DataResponse { data: instances }))
}

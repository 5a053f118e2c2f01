//! Plugin instance record, its database row, and request DTOs.

use feedrun_core::parameters::Parameters;
use feedrun_core::plugin::{PluginKind, RequestedLimits, ResourceLimits};
use feedrun_core::status::{PluginInstanceStatus, StatusId};
use feedrun_core::types::{DbId, JobHandle, Timestamp};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

use crate::error::DbError;

/// One plugin instance: a job in a feed.
///
/// `status`, `job_handle`, `summary`, `dispatch_claimed_at`, `started_at`
/// and `ended_at` are the only fields a save may change; everything else is
/// fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInstance {
    pub id: DbId,
    pub title: String,
    pub plugin_id: DbId,
    pub plugin_name: String,
    pub plugin_version: String,
    pub plugin_type: PluginKind,
    pub previous_id: Option<DbId>,
    pub compute_resource: String,
    pub parameters: Parameters,
    pub status: PluginInstanceStatus,
    pub job_handle: Option<JobHandle>,
    pub owner: String,
    #[serde(flatten)]
    pub limits: ResourceLimits,
    pub summary: Option<String>,
    #[serde(skip)]
    pub dispatch_claimed_at: Option<Timestamp>,
    #[serde(skip)]
    pub version: i64,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
}

impl PluginInstance {
    /// An instance with a handle has been accepted by its compute backend.
    pub fn is_dispatched(&self) -> bool {
        self.job_handle.is_some()
    }

    /// Whether another dispatcher holds an unexpired claim on this instance.
    pub fn has_live_claim(&self, now: Timestamp, lease: chrono::Duration) -> bool {
        self.dispatch_claimed_at
            .is_some_and(|claimed| now - claimed < lease)
    }
}

/// A row from the `plugin_instances` table.
#[derive(Debug, Clone, FromRow)]
pub struct PluginInstanceRow {
    pub id: DbId,
    pub title: String,
    pub plugin_id: DbId,
    pub plugin_name: String,
    pub plugin_version: String,
    pub plugin_type: String,
    pub previous_id: Option<DbId>,
    pub compute_resource: String,
    pub parameters: Json<Parameters>,
    pub status_id: StatusId,
    pub job_handle: Option<String>,
    pub owner: String,
    pub number_of_workers: i32,
    pub cpu_limit: i32,
    pub memory_limit: i32,
    pub gpu_limit: i32,
    pub summary: Option<String>,
    pub dispatch_claimed_at: Option<Timestamp>,
    pub version: i64,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
}

impl TryFrom<PluginInstanceRow> for PluginInstance {
    type Error = DbError;

    fn try_from(row: PluginInstanceRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| DbError::Corrupt {
            entity: "PluginInstance",
            id: row.id,
            reason,
        };
        let status = PluginInstanceStatus::from_id(row.status_id)
            .ok_or_else(|| corrupt(format!("unknown status id {}", row.status_id)))?;
        let plugin_type = row
            .plugin_type
            .parse::<PluginKind>()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(Self {
            id: row.id,
            title: row.title,
            plugin_id: row.plugin_id,
            plugin_name: row.plugin_name,
            plugin_version: row.plugin_version,
            plugin_type,
            previous_id: row.previous_id,
            compute_resource: row.compute_resource,
            parameters: row.parameters.0,
            status,
            job_handle: row.job_handle.map(JobHandle::from),
            owner: row.owner,
            limits: ResourceLimits {
                number_of_workers: row.number_of_workers,
                cpu_limit: row.cpu_limit,
                memory_limit: row.memory_limit,
                gpu_limit: row.gpu_limit,
            },
            summary: row.summary,
            dispatch_claimed_at: row.dispatch_claimed_at,
            version: row.version,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

/// Fully-resolved values for inserting a new instance.
///
/// Built by the orchestrator after validation and dependency resolution,
/// so the record is born in its initial status.
#[derive(Debug, Clone)]
pub struct NewPluginInstance {
    pub title: String,
    pub plugin_id: DbId,
    pub plugin_name: String,
    pub plugin_version: String,
    pub plugin_type: PluginKind,
    pub previous_id: Option<DbId>,
    pub compute_resource: String,
    pub parameters: Parameters,
    pub status: PluginInstanceStatus,
    pub owner: String,
    pub limits: ResourceLimits,
    pub summary: Option<String>,
    pub ended_at: Option<Timestamp>,
}

/// DTO for creating an instance via `POST /api/v1/plugins/{id}/instances`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreatePluginInstance {
    #[validate(length(max = 100))]
    pub title: Option<String>,
    pub previous_id: Option<DbId>,
    #[validate(length(min = 1, max = 100))]
    pub compute_resource_name: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub limits: RequestedLimits,
}

/// DTO for `PUT /api/v1/plugin-instances/{id}`. Only `cancelled` is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePluginInstance {
    pub status: String,
}

/// Filter for listing instances.
///
/// Also used as the query string of `GET /api/v1/plugin-instances`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginInstanceFilter {
    pub status: Option<PluginInstanceStatus>,
    pub previous_id: Option<DbId>,
    pub owner: Option<String>,
    pub plugin_id: Option<DbId>,
    /// Maximum number of results; `None` returns every match.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl PluginInstanceFilter {
    /// Every instance currently in `status`.
    pub fn with_status(status: PluginInstanceStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Whether `instance` satisfies the non-paging criteria.
    pub fn matches(&self, instance: &PluginInstance) -> bool {
        self.status.is_none_or(|s| instance.status == s)
            && self
                .previous_id
                .is_none_or(|p| instance.previous_id == Some(p))
            && self.owner.as_ref().is_none_or(|o| &instance.owner == o)
            && self.plugin_id.is_none_or(|p| instance.plugin_id == p)
    }
}

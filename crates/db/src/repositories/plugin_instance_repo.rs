//! PostgreSQL adapter for the `plugin_instances` table.
//!
//! Every status literal goes through `PluginInstanceStatus::id()`.

use async_trait::async_trait;
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use super::PluginInstanceStore;
use crate::error::DbError;
use crate::models::plugin_instance::{
    NewPluginInstance, PluginInstance, PluginInstanceFilter, PluginInstanceRow,
};

/// Column list for `plugin_instances` queries.
const COLUMNS: &str = "\
    id, title, plugin_id, plugin_name, plugin_version, plugin_type, \
    previous_id, compute_resource, parameters, status_id, job_handle, owner, \
    number_of_workers, cpu_limit, memory_limit, gpu_limit, \
    summary, dispatch_claimed_at, version, \
    created_at, started_at, ended_at";

/// PostgreSQL-backed [`PluginInstanceStore`].
#[derive(Clone)]
pub struct PluginInstanceRepo {
    pool: PgPool,
}

impl PluginInstanceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_instances(rows: Vec<PluginInstanceRow>) -> Result<Vec<PluginInstance>, DbError> {
    rows.into_iter().map(PluginInstance::try_from).collect()
}

#[async_trait]
impl PluginInstanceStore for PluginInstanceRepo {
    async fn insert(&self, new: NewPluginInstance) -> Result<PluginInstance, DbError> {
        let query = format!(
            "INSERT INTO plugin_instances \
                 (title, plugin_id, plugin_name, plugin_version, plugin_type, previous_id, \
                  compute_resource, parameters, status_id, owner, \
                  number_of_workers, cpu_limit, memory_limit, gpu_limit, summary, ended_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, PluginInstanceRow>(&query)
            .bind(&new.title)
            .bind(new.plugin_id)
            .bind(&new.plugin_name)
            .bind(&new.plugin_version)
            .bind(new.plugin_type.as_str())
            .bind(new.previous_id)
            .bind(&new.compute_resource)
            .bind(Json(&new.parameters))
            .bind(new.status.id())
            .bind(&new.owner)
            .bind(new.limits.number_of_workers)
            .bind(new.limits.cpu_limit)
            .bind(new.limits.memory_limit)
            .bind(new.limits.gpu_limit)
            .bind(&new.summary)
            .bind(new.ended_at)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get(&self, id: DbId) -> Result<Option<PluginInstance>, DbError> {
        let query = format!("SELECT {COLUMNS} FROM plugin_instances WHERE id = $1");
        sqlx::query_as::<_, PluginInstanceRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(PluginInstance::try_from)
            .transpose()
    }

    async fn list(&self, filter: &PluginInstanceFilter) -> Result<Vec<PluginInstance>, DbError> {
        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if filter.status.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.previous_id.is_some() {
            conditions.push(format!("previous_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.owner.is_some() {
            conditions.push(format!("owner = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.plugin_id.is_some() {
            conditions.push(format!("plugin_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // LIMIT NULL means no limit in PostgreSQL.
        let query = format!(
            "SELECT {COLUMNS} FROM plugin_instances \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, PluginInstanceRow>(&query);
        if let Some(status) = filter.status {
            q = q.bind(status.id());
        }
        if let Some(previous_id) = filter.previous_id {
            q = q.bind(previous_id);
        }
        if let Some(owner) = &filter.owner {
            q = q.bind(owner);
        }
        if let Some(plugin_id) = filter.plugin_id {
            q = q.bind(plugin_id);
        }
        q = q.bind(filter.limit).bind(filter.offset.unwrap_or(0));

        into_instances(q.fetch_all(&self.pool).await?)
    }

    async fn descendants(&self, id: DbId) -> Result<Vec<PluginInstance>, DbError> {
        let query = format!(
            "WITH RECURSIVE tree (node_id, depth) AS ( \
                 SELECT id, 1 FROM plugin_instances WHERE previous_id = $1 \
                 UNION ALL \
                 SELECT p.id, t.depth + 1 FROM plugin_instances p \
                 JOIN tree t ON p.previous_id = t.node_id \
             ) \
             SELECT {COLUMNS} FROM plugin_instances \
             JOIN tree ON id = node_id \
             ORDER BY depth, id"
        );
        let rows = sqlx::query_as::<_, PluginInstanceRow>(&query)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        into_instances(rows)
    }

    async fn save(
        &self,
        instance: &PluginInstance,
        expected: PluginInstanceStatus,
    ) -> Result<Option<PluginInstance>, DbError> {
        let query = format!(
            "UPDATE plugin_instances \
             SET status_id = $4, \
                 job_handle = COALESCE(job_handle, $5), \
                 summary = $6, \
                 dispatch_claimed_at = $7, \
                 started_at = $8, \
                 ended_at = $9, \
                 version = version + 1 \
             WHERE id = $1 AND version = $2 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, PluginInstanceRow>(&query)
            .bind(instance.id)
            .bind(instance.version)
            .bind(expected.id())
            .bind(instance.status.id())
            .bind(instance.job_handle.as_ref().map(|h| h.as_str()))
            .bind(&instance.summary)
            .bind(instance.dispatch_claimed_at)
            .bind(instance.started_at)
            .bind(instance.ended_at)
            .fetch_optional(&self.pool)
            .await?;

        if row.is_none() {
            tracing::debug!(
                instance_id = instance.id,
                expected = %expected,
                version = instance.version,
                "Optimistic save lost the race",
            );
        }
        row.map(PluginInstance::try_from).transpose()
    }

    async fn delete(&self, id: DbId) -> Result<bool, DbError> {
        // Descendants go with it via ON DELETE CASCADE on previous_id.
        let result = sqlx::query("DELETE FROM plugin_instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

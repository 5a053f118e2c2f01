//! Cancellation: local cascade down the feed tree and remote stop requests.

use chrono::Utc;
use feedrun_compute::ComputeError;
use feedrun_core::error::CoreError;
use feedrun_core::resolver::cascade_reason;
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::{DbId, JobHandle};

use crate::context::Orchestrator;
use crate::reaper::Reevaluate;
use crate::scheduler::WorkItem;
use crate::transition::{compare_and_set, Transition};

impl Orchestrator {
    /// One propagator tick: cancel waiting instances whose previous
    /// instance was cancelled or failed.
    pub async fn propagate_cancellations(&self) -> Result<usize, CoreError> {
        self.sweep_waiting(Reevaluate::CancelOnly).await
    }

    /// Cancel one non-terminal instance.
    ///
    /// A dispatched instance also gets a remote cancel enqueued. Returns
    /// `Skipped` with the current record if it is already terminal.
    pub async fn cancel_instance(
        &self,
        id: DbId,
        summary: Option<String>,
    ) -> Result<Transition, CoreError> {
        let transition = compare_and_set(self.store.as_ref(), id, |instance| {
            if instance.status.is_terminal() {
                return false;
            }
            instance.status = PluginInstanceStatus::Cancelled;
            instance.ended_at = Some(Utc::now());
            if summary.is_some() {
                instance.summary = summary.clone();
            }
            true
        })
        .await?;

        if let Transition::Applied(cancelled) = &transition {
            tracing::info!(instance_id = id, "Plugin instance cancelled");
            if let Some(handle) = &cancelled.job_handle {
                self.queue.enqueue(WorkItem::Cancel {
                    instance_id: id,
                    compute_resource: cancelled.compute_resource.clone(),
                    handle: handle.clone(),
                });
            }
        }
        Ok(transition)
    }

    /// Cancel every non-terminal instance below `root`, parents first.
    ///
    /// Returns the number of instances cancelled.
    pub async fn cascade_cancel(&self, root: DbId) -> Result<usize, CoreError> {
        let mut cancelled = 0;
        for descendant in self.store.descendants(root).await? {
            if descendant.status.is_terminal() {
                continue;
            }
            let previous_id = descendant.previous_id.unwrap_or(root);
            let reason = cascade_reason(previous_id, PluginInstanceStatus::Cancelled);
            if let Transition::Applied(_) = self.cancel_instance(descendant.id, Some(reason)).await? {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(root_id = root, cancelled, "Cancellation cascaded to descendants");
        }
        Ok(cancelled)
    }

    /// Ask the backend to stop a remote job.
    ///
    /// Failures are reported as [`CoreError::BackendCancel`]; the local
    /// record stays `cancelled` either way.
    pub async fn cancel_remote(
        &self,
        instance_id: DbId,
        compute_resource: &str,
        handle: &JobHandle,
    ) -> Result<(), CoreError> {
        let timeout = self.config.compute_timeout;
        let result = match self.compute.get(compute_resource) {
            Ok(backend) => match tokio::time::timeout(timeout, backend.cancel(handle)).await {
                Ok(result) => result,
                Err(_) => Err(ComputeError::Timeout(timeout.as_secs())),
            },
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            CoreError::BackendCancel(format!(
                "Cancelling plugin instance {instance_id} ({handle}) on '{compute_resource}': {e}"
            ))
        })?;

        tracing::info!(instance_id, handle = %handle, "Remote job cancelled");
        Ok(())
    }
}

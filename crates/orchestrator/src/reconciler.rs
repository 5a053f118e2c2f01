//! Mirrors remote job state into started instances.

use chrono::Utc;
use feedrun_compute::{ComputeError, RemoteStatus};
use feedrun_core::error::CoreError;
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::DbId;
use feedrun_db::models::plugin_instance::PluginInstanceFilter;

use crate::context::Orchestrator;
use crate::scheduler::WorkItem;
use crate::transition::{compare_and_set, Transition};

impl Orchestrator {
    /// One reconciler tick.
    ///
    /// Enqueues a poll for every `started` instance, and a dispatch for
    /// every `scheduled` instance nobody is dispatching (e.g. one whose
    /// queued dispatch was lost in a restart).
    pub async fn reconcile_sweep(&self) -> Result<(), CoreError> {
        let started = self
            .store
            .list(&PluginInstanceFilter::with_status(PluginInstanceStatus::Started))
            .await?;
        for instance in &started {
            self.queue.enqueue(WorkItem::PollStatus(instance.id));
        }

        let lease = chrono::Duration::from_std(self.config.dispatch_claim_lease)
            .unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let orphaned: Vec<DbId> = self
            .store
            .list(&PluginInstanceFilter::with_status(PluginInstanceStatus::Scheduled))
            .await?
            .into_iter()
            .filter(|i| !i.is_dispatched() && !i.has_live_claim(now, lease))
            .map(|i| i.id)
            .collect();
        for id in &orphaned {
            self.queue.enqueue(WorkItem::Dispatch(*id));
        }

        if !started.is_empty() || !orphaned.is_empty() {
            tracing::debug!(
                polls = started.len(),
                redispatches = orphaned.len(),
                "Status reconciler sweep",
            );
        }
        Ok(())
    }

    /// Poll the backend for one started instance and record a finished
    /// outcome.
    ///
    /// Backend errors leave the instance untouched and are returned as
    /// [`CoreError::Reconciliation`]; the next tick polls again.
    pub async fn poll_status(&self, id: DbId) -> Result<Transition, CoreError> {
        let Some(instance) = self.store.get(id).await? else {
            return Ok(Transition::Missing);
        };
        let Some(handle) = instance
            .job_handle
            .clone()
            .filter(|_| instance.status == PluginInstanceStatus::Started)
        else {
            return Ok(Transition::Skipped(instance));
        };

        let timeout = self.config.compute_timeout;
        let polled = match self.compute.get(&instance.compute_resource) {
            Ok(backend) => match tokio::time::timeout(timeout, backend.poll(&handle)).await {
                Ok(result) => result,
                Err(_) => Err(ComputeError::Timeout(timeout.as_secs())),
            },
            Err(e) => Err(e),
        };
        let remote = polled.map_err(|e| {
            CoreError::Reconciliation(format!("Polling plugin instance {id} ({handle}): {e}"))
        })?;

        let (status, summary) = match remote {
            RemoteStatus::Running => return Ok(Transition::Skipped(instance)),
            RemoteStatus::Succeeded => (PluginInstanceStatus::FinishedSuccessfully, None),
            RemoteStatus::Failed { reason } => (PluginInstanceStatus::FinishedWithError, reason),
        };

        // A racing manual cancel moved the instance out of `started` and wins.
        let transition = compare_and_set(self.store.as_ref(), id, |current| {
            if current.status != PluginInstanceStatus::Started {
                return false;
            }
            current.status = status;
            current.ended_at = Some(Utc::now());
            if summary.is_some() {
                current.summary = summary.clone();
            }
            true
        })
        .await?;

        if let Transition::Applied(finished) = &transition {
            tracing::info!(
                instance_id = id,
                status = %finished.status,
                "Plugin instance finished",
            );
        }
        Ok(transition)
    }
}

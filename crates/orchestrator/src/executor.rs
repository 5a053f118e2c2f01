//! Routes scheduler work to the orchestrator and logs the outcome.

use async_trait::async_trait;
use feedrun_core::error::CoreError;

use crate::context::Orchestrator;
use crate::scheduler::{PeriodicTask, TaskHandler, WorkItem};

#[async_trait]
impl TaskHandler for Orchestrator {
    async fn execute(&self, item: WorkItem) {
        let instance_id = item.instance_id();
        let kind = item.kind();
        let result = match item {
            WorkItem::Dispatch(id) => self.dispatch(id).await.map(drop),
            WorkItem::PollStatus(id) => self.poll_status(id).await.map(drop),
            WorkItem::Cancel {
                instance_id,
                compute_resource,
                handle,
            } => self.cancel_remote(instance_id, &compute_resource, &handle).await,
        };

        match result {
            Ok(()) => {}
            // Retried on the next reconciler tick.
            Err(e @ CoreError::Reconciliation(_)) => {
                tracing::warn!(instance_id, kind, error = %e, "Status poll failed");
            }
            Err(e @ CoreError::BackendCancel(_)) => {
                tracing::warn!(instance_id, kind, error = %e, "Remote cancel failed");
            }
            Err(e) => {
                tracing::error!(instance_id, kind, error = %e, "Work item failed");
            }
        }
    }

    async fn run_periodic(&self, task: PeriodicTask) {
        let result = match task {
            PeriodicTask::WaitingReaper => self.reap_waiting().await.map(drop),
            PeriodicTask::StatusReconciler => self.reconcile_sweep().await,
            PeriodicTask::CancellationPropagator => self.propagate_cancellations().await.map(drop),
        };
        if let Err(e) = result {
            tracing::error!(task = %task, error = %e, "Periodic task failed");
        }
    }
}

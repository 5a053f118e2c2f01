//! Advances instances waiting on their previous instance.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use feedrun_core::error::CoreError;
use feedrun_core::resolver::{cascade_reason, resolve, Decision};
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::DbId;
use feedrun_db::models::plugin_instance::PluginInstanceFilter;

use crate::context::Orchestrator;
use crate::scheduler::WorkItem;
use crate::transition::{compare_and_set, Transition};

/// Which outcomes a re-evaluation may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reevaluate {
    /// Schedule or cancel, whichever the upstream status calls for.
    Any,
    /// Only cancel; leave instances whose upstream succeeded alone.
    CancelOnly,
}

impl Orchestrator {
    /// One waiting-reaper tick: re-resolve every `waitingForPrevious`
    /// instance against its previous instance's committed status.
    ///
    /// Returns the number of instances that left `waitingForPrevious`.
    pub async fn reap_waiting(&self) -> Result<usize, CoreError> {
        self.sweep_waiting(Reevaluate::Any).await
    }

    /// Re-resolve one waiting instance. Scheduling it enqueues a dispatch.
    pub async fn reevaluate_waiting(&self, id: DbId) -> Result<Transition, CoreError> {
        self.resolve_waiting(id, Reevaluate::Any).await
    }

    pub(crate) async fn sweep_waiting(&self, mode: Reevaluate) -> Result<usize, CoreError> {
        let waiting = self
            .store
            .list(&PluginInstanceFilter::with_status(
                PluginInstanceStatus::WaitingForPrevious,
            ))
            .await?;
        if waiting.is_empty() {
            return Ok(0);
        }

        let concurrency = self.config.worker_concurrency;
        let advanced = stream::iter(waiting)
            .map(|instance| async move {
                match self.resolve_waiting(instance.id, mode).await {
                    Ok(Transition::Applied(_)) => 1,
                    Ok(_) => 0,
                    Err(e) => {
                        tracing::warn!(
                            instance_id = instance.id,
                            error = %e,
                            "Failed to re-evaluate waiting instance",
                        );
                        0
                    }
                }
            })
            .buffer_unordered(concurrency)
            .fold(0usize, |total, n| async move { total + n })
            .await;

        if advanced > 0 {
            tracing::info!(advanced, ?mode, "Waiting instances advanced");
        }
        Ok(advanced)
    }

    pub(crate) async fn resolve_waiting(
        &self,
        id: DbId,
        mode: Reevaluate,
    ) -> Result<Transition, CoreError> {
        let Some(instance) = self.store.get(id).await? else {
            return Ok(Transition::Missing);
        };
        if instance.status != PluginInstanceStatus::WaitingForPrevious {
            return Ok(Transition::Skipped(instance));
        }

        let (decision, reason) = match instance.previous_id {
            None => (resolve(None), None),
            Some(previous_id) => match self.store.get(previous_id).await? {
                Some(previous) => (
                    resolve(Some(previous.status)),
                    Some(cascade_reason(previous_id, previous.status)),
                ),
                None => (
                    Decision {
                        status: PluginInstanceStatus::Cancelled,
                        dispatch: false,
                    },
                    Some(format!(
                        "Cancelled because previous plugin instance {previous_id} no longer exists"
                    )),
                ),
            },
        };

        let wanted = match (decision.status, mode) {
            (PluginInstanceStatus::WaitingForPrevious, _) => false,
            (PluginInstanceStatus::Cancelled, _) => true,
            (_, Reevaluate::Any) => true,
            (_, Reevaluate::CancelOnly) => false,
        };
        if !wanted {
            return Ok(Transition::Skipped(instance));
        }

        // Upstream status only moves forward into terminal states, so the
        // decision stays valid across CAS retries.
        let transition = compare_and_set(self.store.as_ref(), id, |current| {
            if current.status != PluginInstanceStatus::WaitingForPrevious {
                return false;
            }
            current.status = decision.status;
            if decision.status == PluginInstanceStatus::Cancelled {
                current.ended_at = Some(Utc::now());
                current.summary = reason.clone();
            }
            true
        })
        .await?;

        if let Transition::Applied(updated) = &transition {
            tracing::info!(
                instance_id = id,
                previous_id = ?updated.previous_id,
                status = %updated.status,
                "Waiting instance resolved",
            );
            if decision.dispatch {
                self.queue.enqueue(WorkItem::Dispatch(id));
            }
        }
        Ok(transition)
    }
}

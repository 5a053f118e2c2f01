//! Submits scheduled instances to their compute backend, at most once each.
//!
//! A dispatch runs in three steps:
//! 1. Claim the instance by saving `dispatch_claimed_at`. Only the claim
//!    winner goes on, so concurrent dispatches of one instance submit once.
//! 2. Submit, retrying transient backend failures with exponential backoff.
//! 3. Record `started` with the returned handle. If the instance was
//!    cancelled meanwhile, the orphaned remote job is cancelled instead.
//!
//! A transient failure does not prove the backend dropped the job: a timed
//! out submit may still have started `jid-{id}`. If such an attempt is
//! followed by a permanent rejection or an abandoned dispatch, that job id
//! is cancelled on the backend as well.

use std::sync::Arc;

use chrono::Utc;
use feedrun_compute::command::build_app_args;
use feedrun_compute::{ComputeBackend, ComputeError, SubmitRequest};
use feedrun_core::error::CoreError;
use feedrun_core::paths::{fs_input_path, output_path, LineageStep};
use feedrun_core::plugin::PluginKind;
use feedrun_core::scheduling::remote_job_id;
use feedrun_core::status::PluginInstanceStatus;
use feedrun_core::types::{DbId, JobHandle};
use feedrun_db::models::plugin_instance::PluginInstance;

use crate::backoff::next_delay;
use crate::context::Orchestrator;
use crate::transition::{compare_and_set, Transition};

enum Submission {
    Accepted(JobHandle),
    Rejected {
        error: ComputeError,
        maybe_accepted: bool,
    },
    /// The instance stopped being `scheduled` between attempts.
    Abandoned { maybe_accepted: bool },
}

/// What happened to one dispatch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The backend accepted the job and the instance is `started`.
    Started(JobHandle),
    /// The instance was not dispatchable or another dispatcher holds it.
    Skipped,
    /// Submission failed for good and the instance is `finishedWithError`.
    Failed,
    /// The backend accepted the job but the instance left `scheduled`
    /// first; the remote job was cancelled.
    Orphaned(JobHandle),
}

impl Orchestrator {
    /// Dispatch a scheduled instance. Safe to call any number of times.
    pub async fn dispatch(&self, id: DbId) -> Result<DispatchOutcome, CoreError> {
        let lease = chrono::Duration::from_std(self.config.dispatch_claim_lease)
            .unwrap_or(chrono::Duration::MAX);

        let claim = compare_and_set(self.store.as_ref(), id, |instance| {
            let now = Utc::now();
            if instance.status != PluginInstanceStatus::Scheduled
                || instance.is_dispatched()
                || instance.has_live_claim(now, lease)
            {
                return false;
            }
            instance.dispatch_claimed_at = Some(now);
            true
        })
        .await?;

        let instance = match claim {
            Transition::Applied(instance) => instance,
            Transition::Skipped(current) => {
                tracing::debug!(
                    instance_id = id,
                    status = %current.status,
                    "Dispatch skipped, instance not claimable",
                );
                return Ok(DispatchOutcome::Skipped);
            }
            Transition::Missing => {
                tracing::debug!(instance_id = id, "Dispatch skipped, instance deleted");
                return Ok(DispatchOutcome::Skipped);
            }
        };

        let (backend, request) = match self.prepare_submission(&instance).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.fail_dispatch(id, &e.to_string()).await?;
                return Ok(DispatchOutcome::Failed);
            }
        };

        let handle = match self.submit_with_retry(id, backend.as_ref(), &request).await? {
            Submission::Accepted(handle) => handle,
            Submission::Abandoned { maybe_accepted } => {
                if maybe_accepted {
                    self.cancel_orphan(id, &instance.compute_resource, &JobHandle::new(request.jid))
                        .await;
                }
                return Ok(DispatchOutcome::Skipped);
            }
            Submission::Rejected {
                error,
                maybe_accepted,
            } => {
                if maybe_accepted {
                    self.cancel_orphan(id, &instance.compute_resource, &JobHandle::new(request.jid))
                        .await;
                }
                self.fail_dispatch(id, &format!("Submission failed: {error}")).await?;
                return Ok(DispatchOutcome::Failed);
            }
        };

        self.record_started(id, &instance.compute_resource, handle).await
    }

    /// Build the submission for a claimed instance.
    async fn prepare_submission(
        &self,
        instance: &PluginInstance,
    ) -> Result<(Arc<dyn ComputeBackend>, SubmitRequest), CoreError> {
        let plugin = self
            .catalog
            .get(instance.plugin_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Plugin",
                id: instance.plugin_id,
            })?;
        let backend = self.compute.get(&instance.compute_resource)?;

        let lineage = self.lineage(instance).await?;
        let output_dir = output_path(&instance.owner, &lineage).ok_or_else(|| {
            CoreError::Internal(format!("Plugin instance {} has no lineage", instance.id))
        })?;
        let input_dir = match plugin.kind {
            PluginKind::Ds => output_path(&instance.owner, &lineage[..lineage.len() - 1]),
            PluginKind::Fs => fs_input_path(&instance.parameters),
        };

        let request = SubmitRequest {
            jid: remote_job_id(instance.id),
            image: plugin.dock_image.clone(),
            entrypoint: plugin.entrypoint(),
            args: build_app_args(&plugin, &instance.parameters),
            kind: plugin.kind,
            input_dir,
            output_dir,
            limits: instance.limits,
            auid: instance.owner.clone(),
        };
        Ok((backend, request))
    }

    /// The chain of instances from the feed root down to `instance`.
    async fn lineage(&self, instance: &PluginInstance) -> Result<Vec<LineageStep>, CoreError> {
        let mut steps = vec![LineageStep {
            plugin_name: instance.plugin_name.clone(),
            instance_id: instance.id,
        }];
        let mut previous_id = instance.previous_id;
        while let Some(id) = previous_id {
            let previous = self.store.get(id).await?.ok_or(CoreError::NotFound {
                entity: "PluginInstance",
                id,
            })?;
            steps.push(LineageStep {
                plugin_name: previous.plugin_name.clone(),
                instance_id: previous.id,
            });
            previous_id = previous.previous_id;
        }
        steps.reverse();
        Ok(steps)
    }

    /// Submit, retrying transient failures while the instance is still
    /// `scheduled`.
    async fn submit_with_retry(
        &self,
        id: DbId,
        backend: &dyn ComputeBackend,
        request: &SubmitRequest,
    ) -> Result<Submission, CoreError> {
        let max_attempts = self.config.dispatch_max_attempts;
        let mut delay = self.config.dispatch_backoff.initial_delay;
        let mut attempt = 0u32;
        let mut maybe_accepted = false;

        loop {
            attempt += 1;
            let timeout = self.config.compute_timeout;
            let result = match tokio::time::timeout(timeout, backend.submit(request)).await {
                Ok(result) => result,
                Err(_) => Err(ComputeError::Timeout(timeout.as_secs())),
            };

            match result {
                Ok(handle) => {
                    tracing::info!(
                        instance_id = id,
                        attempt,
                        handle = %handle,
                        "Plugin instance submitted",
                    );
                    return Ok(Submission::Accepted(handle));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    maybe_accepted = true;
                    tracing::warn!(
                        instance_id = id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Submission failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &self.config.dispatch_backoff);

                    let still_scheduled = self
                        .store
                        .get(id)
                        .await?
                        .is_some_and(|i| i.status == PluginInstanceStatus::Scheduled);
                    if !still_scheduled {
                        tracing::info!(
                            instance_id = id,
                            "Instance left scheduled, abandoning dispatch",
                        );
                        return Ok(Submission::Abandoned { maybe_accepted });
                    }
                }
                Err(e) => {
                    tracing::error!(
                        instance_id = id,
                        attempt,
                        error = %e,
                        "Submission failed permanently",
                    );
                    return Ok(Submission::Rejected {
                        maybe_accepted: maybe_accepted || e.is_transient(),
                        error: e,
                    });
                }
            }
        }
    }

    async fn record_started(
        &self,
        id: DbId,
        compute_resource: &str,
        handle: JobHandle,
    ) -> Result<DispatchOutcome, CoreError> {
        let started = compare_and_set(self.store.as_ref(), id, |instance| {
            if instance.status != PluginInstanceStatus::Scheduled || instance.is_dispatched() {
                return false;
            }
            instance.status = PluginInstanceStatus::Started;
            instance.job_handle = Some(handle.clone());
            instance.started_at = Some(Utc::now());
            true
        })
        .await?;

        if started.applied().is_some() {
            return Ok(DispatchOutcome::Started(handle));
        }

        tracing::warn!(
            instance_id = id,
            compute_resource,
            handle = %handle,
            "Instance left scheduled during submission, cancelling remote job",
        );
        self.cancel_orphan(id, compute_resource, &handle).await;
        Ok(DispatchOutcome::Orphaned(handle))
    }

    /// Best-effort stop of a remote job no instance record tracks.
    async fn cancel_orphan(&self, id: DbId, compute_resource: &str, handle: &JobHandle) {
        if let Err(e) = self.cancel_remote(id, compute_resource, handle).await {
            tracing::warn!(
                instance_id = id,
                handle = %handle,
                error = %e,
                "Failed to cancel orphaned remote job",
            );
        }
    }

    async fn fail_dispatch(&self, id: DbId, cause: &str) -> Result<(), CoreError> {
        let failed = compare_and_set(self.store.as_ref(), id, |instance| {
            if instance.status != PluginInstanceStatus::Scheduled || instance.is_dispatched() {
                return false;
            }
            instance.status = PluginInstanceStatus::FinishedWithError;
            instance.ended_at = Some(Utc::now());
            instance.summary = Some(cause.to_string());
            true
        })
        .await?;

        if failed.applied().is_some() {
            tracing::error!(instance_id = id, cause, "Plugin instance dispatch failed");
        }
        Ok(())
    }
}

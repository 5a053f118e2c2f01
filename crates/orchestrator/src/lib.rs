//! Plugin instance lifecycle orchestration.
//!
//! [`Orchestrator`] owns the lifecycle rules: creation with dependency
//! resolution, at-most-once dispatch, status reconciliation, the waiting
//! reaper and cancellation propagation. [`scheduler::TaskScheduler`] drives
//! it from a work queue and three periodic sweeps.

pub mod backoff;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod executor;
pub mod manager;
pub mod propagator;
pub mod reaper;
pub mod reconciler;
pub mod scheduler;
pub mod transition;

pub use config::OrchestratorConfig;
pub use context::Orchestrator;
pub use dispatcher::DispatchOutcome;
pub use scheduler::{PeriodicTask, TaskHandler, TaskQueue, TaskReceiver, TaskScheduler, WorkItem};
pub use transition::Transition;

/// Register the three lifecycle sweeps on `scheduler` at the configured
/// intervals.
pub fn schedule_lifecycle_tasks(scheduler: &mut TaskScheduler, config: &OrchestratorConfig) {
    scheduler.schedule_periodic(PeriodicTask::WaitingReaper, config.waiting_reaper_interval);
    scheduler.schedule_periodic(
        PeriodicTask::StatusReconciler,
        config.status_reconciler_interval,
    );
    scheduler.schedule_periodic(
        PeriodicTask::CancellationPropagator,
        config.cancellation_propagator_interval,
    );
}

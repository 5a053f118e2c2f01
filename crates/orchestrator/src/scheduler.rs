//! Work queue, executor pool and periodic triggers.
//!
//! Producers push [`WorkItem`]s through a cloneable [`TaskQueue`]. The
//! [`TaskScheduler`] drains the queue into a bounded pool of tasks and runs
//! the periodic sweeps on their own intervals until shut down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feedrun_core::types::{DbId, JobHandle};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One unit of per-job work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Submit a scheduled instance to its compute backend.
    Dispatch(DbId),
    /// Poll the backend for a started instance.
    PollStatus(DbId),
    /// Stop a remote job. Carries everything needed so it still works
    /// after the instance record is deleted.
    Cancel {
        instance_id: DbId,
        compute_resource: String,
        handle: JobHandle,
    },
}

impl WorkItem {
    pub fn instance_id(&self) -> DbId {
        match self {
            Self::Dispatch(id) | Self::PollStatus(id) => *id,
            Self::Cancel { instance_id, .. } => *instance_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dispatch(_) => "dispatch",
            Self::PollStatus(_) => "pollStatus",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Fan-out sweeps run on a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodicTask {
    WaitingReaper,
    StatusReconciler,
    CancellationPropagator,
}

impl fmt::Display for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WaitingReaper => "waitingReaper",
            Self::StatusReconciler => "statusReconciler",
            Self::CancellationPropagator => "cancellationPropagator",
        })
    }
}

/// Executes work items and periodic sweeps.
///
/// Implementations log their own failures; the scheduler only drives them.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn execute(&self, item: WorkItem);

    async fn run_periodic(&self, task: PeriodicTask);
}

/// Sending half of the work queue.
#[derive(Clone)]
pub struct TaskQueue {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<WorkItem>,
}

/// Receiving half of the work queue.
pub struct TaskReceiver {
    rx: mpsc::UnboundedReceiver<WorkItem>,
}

impl TaskQueue {
    /// Create a named queue.
    pub fn channel(name: impl Into<String>) -> (TaskQueue, TaskReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let name: String = name.into();
        (
            TaskQueue {
                name: name.into(),
                tx,
            },
            TaskReceiver { rx },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push a work item. Never blocks.
    ///
    /// Items enqueued after the scheduler stopped are dropped; the periodic
    /// sweeps re-derive them on the next start.
    pub fn enqueue(&self, item: WorkItem) {
        tracing::debug!(
            queue = %self.name,
            kind = item.kind(),
            instance_id = item.instance_id(),
            "Enqueued work item",
        );
        if let Err(e) = self.tx.send(item) {
            tracing::warn!(
                queue = %self.name,
                instance_id = e.0.instance_id(),
                "Work queue closed, item dropped",
            );
        }
    }
}

impl TaskReceiver {
    /// Wait for the next item. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<WorkItem> {
        self.rx.recv().await
    }

    /// Take every item that is currently queued.
    pub fn drain(&mut self) -> Vec<WorkItem> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}

/// Runs queued work on a bounded pool and fires periodic sweeps.
pub struct TaskScheduler {
    receiver: TaskReceiver,
    queue_name: String,
    concurrency: usize,
    periodic: Vec<(PeriodicTask, Duration)>,
}

impl TaskScheduler {
    pub fn new(receiver: TaskReceiver, queue_name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            receiver,
            queue_name: queue_name.into(),
            concurrency: concurrency.max(1),
            periodic: Vec::new(),
        }
    }

    /// Register a sweep to run every `interval` once [`run`](Self::run) starts.
    pub fn schedule_periodic(&mut self, task: PeriodicTask, interval: Duration) {
        self.periodic.push((task, interval));
    }

    /// Run until `cancel` fires, then wait for in-flight work to finish.
    pub async fn run(mut self, handler: Arc<dyn TaskHandler>, cancel: CancellationToken) {
        tracing::info!(
            queue = %self.queue_name,
            concurrency = self.concurrency,
            periodic = self.periodic.len(),
            "Task scheduler started",
        );

        let mut loops = JoinSet::new();
        for (task, interval) in self.periodic.drain(..) {
            loops.spawn(run_periodic_loop(
                task,
                interval,
                Arc::clone(&handler),
                cancel.clone(),
            ));
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();

        loop {
            // Reap finished items so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = self.receiver.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let handler = Arc::clone(&handler);
            in_flight.spawn(async move {
                handler.execute(item).await;
                drop(permit);
            });
        }

        tracing::info!(
            queue = %self.queue_name,
            in_flight = in_flight.len(),
            "Task scheduler draining",
        );
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Work item task panicked");
            }
        }
        while loops.join_next().await.is_some() {}
        tracing::info!(queue = %self.queue_name, "Task scheduler stopped");
    }
}

async fn run_periodic_loop(
    task: PeriodicTask,
    interval: Duration,
    handler: Arc<dyn TaskHandler>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(
        task = %task,
        interval_secs = interval.as_secs(),
        "Periodic task started",
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(task = %task, "Periodic task stopping");
                break;
            }
            _ = ticker.tick() => {
                handler.run_periodic(task).await;
            }
        }
    }
}

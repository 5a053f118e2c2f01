//! Scheduling constants shared by the orchestrator and its configuration.

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Periodic sweep intervals
// ---------------------------------------------------------------------------

/// How often blocked instances are re-evaluated against their previous one.
pub const WAITING_REAPER_INTERVAL_SECS: u64 = 10;

/// How often started instances are polled on their compute backend.
pub const STATUS_RECONCILER_INTERVAL_SECS: u64 = 10;

/// How often the cancellation cascade sweep runs.
pub const CANCELLATION_PROPAGATOR_INTERVAL_SECS: u64 = 20;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Submission attempts before an instance is marked `finishedWithError`.
pub const DISPATCH_MAX_ATTEMPTS: u32 = 5;

/// Delay before the first submission retry.
pub const DISPATCH_INITIAL_BACKOFF_MS: u64 = 500;

/// Upper bound on the delay between submission retries.
pub const DISPATCH_MAX_BACKOFF_MS: u64 = 8_000;

/// A dispatch claim older than this is considered abandoned and may be
/// taken over.
pub const DISPATCH_CLAIM_LEASE_SECS: u64 = 600;

/// Timeout applied to every submit/poll/cancel call.
pub const COMPUTE_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

/// Default name of the work queue, used in logs.
pub const DEFAULT_QUEUE_NAME: &str = "main";

/// Default number of work items executed concurrently.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 8;

/// Some schedulers require a minimum job id length, so remote job ids are
/// prefixed rather than being the bare instance id.
pub const REMOTE_JOB_ID_PREFIX: &str = "jid-";

/// Remote job id submitted for an instance.
pub fn remote_job_id(instance_id: DbId) -> String {
    format!("{REMOTE_JOB_ID_PREFIX}{instance_id}")
}

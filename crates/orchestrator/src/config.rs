use std::time::Duration;

use feedrun_core::scheduling::{
    CANCELLATION_PROPAGATOR_INTERVAL_SECS, COMPUTE_TIMEOUT_SECS, DEFAULT_QUEUE_NAME,
    DEFAULT_WORKER_CONCURRENCY, DISPATCH_CLAIM_LEASE_SECS, DISPATCH_INITIAL_BACKOFF_MS,
    DISPATCH_MAX_ATTEMPTS, DISPATCH_MAX_BACKOFF_MS, STATUS_RECONCILER_INTERVAL_SECS,
    WAITING_REAPER_INTERVAL_SECS,
};

use crate::backoff::BackoffConfig;

/// Orchestrator configuration, built once at startup and handed to every
/// component that needs it.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Name of the work queue, used in logs.
    pub queue_name: String,
    /// Maximum number of work items executed at once.
    pub worker_concurrency: usize,
    pub waiting_reaper_interval: Duration,
    pub status_reconciler_interval: Duration,
    pub cancellation_propagator_interval: Duration,
    /// Submission attempts before a job is failed.
    pub dispatch_max_attempts: u32,
    /// Delay schedule between submission attempts.
    pub dispatch_backoff: BackoffConfig,
    /// Upper bound on a single compute backend call.
    pub compute_timeout: Duration,
    /// How long a dispatch claim blocks other dispatchers.
    pub dispatch_claim_lease: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            waiting_reaper_interval: Duration::from_secs(WAITING_REAPER_INTERVAL_SECS),
            status_reconciler_interval: Duration::from_secs(STATUS_RECONCILER_INTERVAL_SECS),
            cancellation_propagator_interval: Duration::from_secs(
                CANCELLATION_PROPAGATOR_INTERVAL_SECS,
            ),
            dispatch_max_attempts: DISPATCH_MAX_ATTEMPTS,
            dispatch_backoff: BackoffConfig {
                initial_delay: Duration::from_millis(DISPATCH_INITIAL_BACKOFF_MS),
                max_delay: Duration::from_millis(DISPATCH_MAX_BACKOFF_MS),
                multiplier: 2.0,
            },
            compute_timeout: Duration::from_secs(COMPUTE_TIMEOUT_SECS),
            dispatch_claim_lease: Duration::from_secs(DISPATCH_CLAIM_LEASE_SECS),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                                 | Default |
    /// |-----------------------------------------|---------|
    /// | `TASK_QUEUE_NAME`                       | `main`  |
    /// | `TASK_WORKER_CONCURRENCY`               | `8`     |
    /// | `WAITING_REAPER_INTERVAL_SECS`          | `10`    |
    /// | `STATUS_RECONCILER_INTERVAL_SECS`       | `10`    |
    /// | `CANCELLATION_PROPAGATOR_INTERVAL_SECS` | `20`    |
    /// | `DISPATCH_MAX_ATTEMPTS`                 | `5`     |
    /// | `DISPATCH_INITIAL_BACKOFF_MS`           | `500`   |
    /// | `DISPATCH_MAX_BACKOFF_MS`               | `8000`  |
    /// | `COMPUTE_TIMEOUT_SECS`                  | `30`    |
    /// | `DISPATCH_CLAIM_LEASE_SECS`             | `600`   |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let queue_name =
            std::env::var("TASK_QUEUE_NAME").unwrap_or_else(|_| DEFAULT_QUEUE_NAME.into());

        let worker_concurrency: usize = env_or("TASK_WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY);
        assert!(worker_concurrency > 0, "TASK_WORKER_CONCURRENCY must be at least 1");

        let dispatch_max_attempts: u32 = env_or("DISPATCH_MAX_ATTEMPTS", DISPATCH_MAX_ATTEMPTS);
        assert!(dispatch_max_attempts > 0, "DISPATCH_MAX_ATTEMPTS must be at least 1");

        Self {
            queue_name,
            worker_concurrency,
            waiting_reaper_interval: env_secs(
                "WAITING_REAPER_INTERVAL_SECS",
                WAITING_REAPER_INTERVAL_SECS,
            ),
            status_reconciler_interval: env_secs(
                "STATUS_RECONCILER_INTERVAL_SECS",
                STATUS_RECONCILER_INTERVAL_SECS,
            ),
            cancellation_propagator_interval: env_secs(
                "CANCELLATION_PROPAGATOR_INTERVAL_SECS",
                CANCELLATION_PROPAGATOR_INTERVAL_SECS,
            ),
            dispatch_max_attempts,
            dispatch_backoff: BackoffConfig {
                initial_delay: Duration::from_millis(env_or(
                    "DISPATCH_INITIAL_BACKOFF_MS",
                    DISPATCH_INITIAL_BACKOFF_MS,
                )),
                max_delay: Duration::from_millis(env_or(
                    "DISPATCH_MAX_BACKOFF_MS",
                    DISPATCH_MAX_BACKOFF_MS,
                )),
                ..defaults.dispatch_backoff
            },
            compute_timeout: env_secs("COMPUTE_TIMEOUT_SECS", COMPUTE_TIMEOUT_SECS),
            dispatch_claim_lease: Duration::from_secs(env_or(
                "DISPATCH_CLAIM_LEASE_SECS",
                DISPATCH_CLAIM_LEASE_SECS,
            )),
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset.
///
/// # Panics
///
/// Panics if the variable is set but does not parse.
pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

/// A whole number of seconds that must be at least 1.
///
/// # Panics
///
/// Panics if the variable is malformed or zero.
fn env_secs(key: &str, default: u64) -> Duration {
    positive_secs(key, env_or(key, default))
}

fn positive_secs(key: &str, secs: u64) -> Duration {
    assert!(secs > 0, "{key} must be at least 1");
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_secs_accepts_whole_seconds() {
        assert_eq!(positive_secs("X", 10), Duration::from_secs(10));
    }

    #[test]
    #[should_panic(expected = "WAITING_REAPER_INTERVAL_SECS must be at least 1")]
    fn zero_interval_is_rejected() {
        positive_secs("WAITING_REAPER_INTERVAL_SECS", 0);
    }

    #[test]
    fn default_intervals_are_positive() {
        let config = OrchestratorConfig::default();
        assert!(!config.waiting_reaper_interval.is_zero());
        assert!(!config.status_reconciler_interval.is_zero());
        assert!(!config.cancellation_propagator_interval.is_zero());
    }
}

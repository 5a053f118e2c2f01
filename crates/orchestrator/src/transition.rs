//! Compare-and-set on a single plugin instance record.

use feedrun_core::error::CoreError;
use feedrun_core::types::DbId;
use feedrun_db::models::plugin_instance::PluginInstance;
use feedrun_db::repositories::PluginInstanceStore;

/// Times a save is retried when only the record version moved.
pub const MAX_CAS_ATTEMPTS: u32 = 5;

/// Result of [`compare_and_set`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The change was saved; carries the stored record.
    Applied(PluginInstance),
    /// The precondition did not hold; carries the current record.
    Skipped(PluginInstance),
    /// The record no longer exists.
    Missing,
}

impl Transition {
    pub fn applied(&self) -> Option<&PluginInstance> {
        match self {
            Self::Applied(instance) => Some(instance),
            _ => None,
        }
    }
}

/// Read `id`, let `apply` edit a copy, and save it conditionally on the
/// status and version that were read.
///
/// `apply` returns `false` when its precondition does not hold on the
/// current record. It is re-run against a fresh read each time a concurrent
/// writer wins, so it must decide only from the record it is given. A
/// status change must follow the lifecycle graph.
pub async fn compare_and_set<F>(
    store: &dyn PluginInstanceStore,
    id: DbId,
    mut apply: F,
) -> Result<Transition, CoreError>
where
    F: FnMut(&mut PluginInstance) -> bool + Send,
{
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let Some(current) = store.get(id).await? else {
            return Ok(Transition::Missing);
        };

        let expected = current.status;
        let mut next = current.clone();
        if !apply(&mut next) {
            return Ok(Transition::Skipped(current));
        }
        if next.status != expected {
            expected.validate_transition(next.status)?;
        }

        if let Some(saved) = store.save(&next, expected).await? {
            return Ok(Transition::Applied(saved));
        }
        tracing::debug!(instance_id = id, attempt, "Concurrent update, re-reading");
    }

    Err(CoreError::Conflict(format!(
        "Plugin instance {id} changed concurrently {MAX_CAS_ATTEMPTS} times"
    )))
}

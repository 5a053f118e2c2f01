use std::sync::Arc;

use feedrun_compute::ComputeRegistry;
use feedrun_db::repositories::{PluginCatalog, PluginInstanceStore};

use crate::config::OrchestratorConfig;
use crate::scheduler::TaskQueue;

/// Everything the lifecycle components share.
///
/// Cheaply cloneable; the manager, dispatcher, reconciler, reaper and
/// propagator are all methods on this type.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) store: Arc<dyn PluginInstanceStore>,
    pub(crate) catalog: Arc<dyn PluginCatalog>,
    pub(crate) compute: Arc<ComputeRegistry>,
    pub(crate) queue: TaskQueue,
    pub(crate) config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn PluginInstanceStore>,
        catalog: Arc<dyn PluginCatalog>,
        compute: Arc<ComputeRegistry>,
        queue: TaskQueue,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            compute,
            queue,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }
}

//! Shared helpers for orchestrator integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedrun_compute::{ComputeBackend, ComputeError, ComputeRegistry, RemoteStatus, SubmitRequest};
use feedrun_core::parameters::{ParameterAction, ParameterType, PluginParameter};
use feedrun_core::plugin::{Plugin, PluginKind, ResourceBounds};
use feedrun_core::types::{DbId, JobHandle};
use feedrun_db::models::plugin::NewPlugin;
use feedrun_db::models::plugin_instance::{CreatePluginInstance, PluginInstance};
use feedrun_db::repositories::{MemoryPluginCatalog, MemoryPluginInstanceStore, PluginCatalog};
use feedrun_orchestrator::backoff::BackoffConfig;
use feedrun_orchestrator::{
    Orchestrator, OrchestratorConfig, TaskHandler, TaskQueue, TaskReceiver, WorkItem,
};

pub const OWNER: &str = "foo";

// ---------------------------------------------------------------------------
// Mock compute backend
// ---------------------------------------------------------------------------

/// In-process backend that records calls and answers polls from a table.
#[derive(Default)]
pub struct MockBackend {
    submits: Mutex<Vec<SubmitRequest>>,
    cancels: Mutex<Vec<JobHandle>>,
    statuses: Mutex<HashMap<String, RemoteStatus>>,
    submit_failures: Mutex<VecDeque<ComputeError>>,
    submit_delay: Mutex<Option<Duration>>,
    poll_failures: Mutex<VecDeque<ComputeError>>,
    poll_delay: Mutex<Option<Duration>>,
    cancel_failures: Mutex<VecDeque<ComputeError>>,
    cancel_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn submits(&self) -> Vec<SubmitRequest> {
        self.submits.lock().unwrap().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    pub fn cancels(&self) -> Vec<JobHandle> {
        self.cancels.lock().unwrap().clone()
    }

    /// Make the next submissions fail with these errors, in order.
    pub fn fail_next_submits(&self, errors: impl IntoIterator<Item = ComputeError>) {
        self.submit_failures.lock().unwrap().extend(errors);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    /// Make the next polls fail with these errors, in order.
    pub fn fail_next_polls(&self, errors: impl IntoIterator<Item = ComputeError>) {
        self.poll_failures.lock().unwrap().extend(errors);
    }

    pub fn set_poll_delay(&self, delay: Duration) {
        *self.poll_delay.lock().unwrap() = Some(delay);
    }

    /// Make the next cancels fail with these errors, in order.
    pub fn fail_next_cancels(&self, errors: impl IntoIterator<Item = ComputeError>) {
        self.cancel_failures.lock().unwrap().extend(errors);
    }

    pub fn set_cancel_delay(&self, delay: Duration) {
        *self.cancel_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_status(&self, handle: &JobHandle, status: RemoteStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(handle.as_str().to_string(), status);
    }
}

#[async_trait]
impl ComputeBackend for MockBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle, ComputeError> {
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.submits.lock().unwrap().push(request.clone());
        if let Some(err) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(JobHandle::new(request.jid.clone()))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<RemoteStatus, ComputeError> {
        let delay = *self.poll_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.poll_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(handle.as_str())
            .cloned()
            .unwrap_or(RemoteStatus::Running))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), ComputeError> {
        self.cancels.lock().unwrap().push(handle.clone());
        let delay = *self.cancel_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.cancel_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(())
    }
}

pub fn transient_error() -> ComputeError {
    ComputeError::Api {
        status: 503,
        body: "unavailable".into(),
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub receiver: TaskReceiver,
    pub backend: Arc<MockBackend>,
    pub catalog: Arc<MemoryPluginCatalog>,
    pub pacspull: Plugin,
    pub mri_convert: Plugin,
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        worker_concurrency: 1,
        dispatch_max_attempts: 3,
        dispatch_backoff: BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        },
        compute_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    }
}

pub async fn harness() -> Harness {
    harness_with_config(test_config()).await
}

pub async fn harness_with_config(config: OrchestratorConfig) -> Harness {
    let backend = Arc::new(MockBackend::default());
    let mut compute = ComputeRegistry::new();
    compute.register("host", Arc::clone(&backend) as Arc<dyn ComputeBackend>);

    let catalog = Arc::new(MemoryPluginCatalog::new());
    let pacspull = catalog
        .register(plugin("pacspull", PluginKind::Fs, pacspull_parameters()))
        .await
        .unwrap();
    let mri_convert = catalog
        .register(plugin("mri_convert", PluginKind::Ds, mri_convert_parameters()))
        .await
        .unwrap();

    let (queue, receiver) = TaskQueue::channel(config.queue_name.clone());
    let orchestrator = Orchestrator::new(
        Arc::new(MemoryPluginInstanceStore::new()),
        Arc::clone(&catalog) as Arc<dyn PluginCatalog>,
        Arc::new(compute),
        queue,
        config,
    );

    Harness {
        orchestrator,
        receiver,
        backend,
        catalog,
        pacspull,
        mri_convert,
    }
}

pub fn plugin(name: &str, kind: PluginKind, parameters: Vec<PluginParameter>) -> NewPlugin {
    NewPlugin {
        name: name.to_string(),
        version: "0.1".to_string(),
        kind,
        dock_image: format!("fnndsc/pl-{name}"),
        execshell: "python3".to_string(),
        selfpath: "/usr/local/bin".to_string(),
        selfexec: name.to_string(),
        parameters,
        compute_resources: vec!["host".to_string()],
        resource_bounds: ResourceBounds::default(),
    }
}

fn pacspull_parameters() -> Vec<PluginParameter> {
    vec![PluginParameter {
        name: "dir".to_string(),
        flag: "--dir".to_string(),
        param_type: ParameterType::Path,
        action: ParameterAction::Store,
        optional: true,
        default: None,
    }]
}

fn mri_convert_parameters() -> Vec<PluginParameter> {
    vec![
        PluginParameter {
            name: "input_file".to_string(),
            flag: "--inputFile".to_string(),
            param_type: ParameterType::String,
            action: ParameterAction::Store,
            optional: true,
            default: None,
        },
        PluginParameter {
            name: "verbose".to_string(),
            flag: "--verbose".to_string(),
            param_type: ParameterType::Boolean,
            action: ParameterAction::StoreTrue,
            optional: true,
            default: None,
        },
    ]
}

impl Harness {
    pub async fn create_root(&self) -> PluginInstance {
        self.orchestrator
            .create(self.pacspull.id, OWNER, CreatePluginInstance::default())
            .await
            .unwrap()
    }

    pub async fn create_child(&self, previous_id: DbId) -> PluginInstance {
        self.orchestrator
            .create(
                self.mri_convert.id,
                OWNER,
                CreatePluginInstance {
                    previous_id: Some(previous_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    /// Execute queued work until the queue is empty; returns what ran.
    pub async fn run_queue(&mut self) -> Vec<WorkItem> {
        let mut ran = Vec::new();
        loop {
            let items = self.receiver.drain();
            if items.is_empty() {
                return ran;
            }
            for item in items {
                self.orchestrator.execute(item.clone()).await;
                ran.push(item);
            }
        }
    }

    /// Dispatch queued work and return the instance as stored.
    pub async fn start(&mut self, id: DbId) -> PluginInstance {
        self.run_queue().await;
        self.instance(id).await
    }

    /// Drive a started instance to a finished status via the reconciler.
    pub async fn finish(&mut self, id: DbId, remote: RemoteStatus) -> PluginInstance {
        let instance = self.instance(id).await;
        let handle = instance.job_handle.expect("instance was dispatched");
        self.backend.set_status(&handle, remote);
        self.orchestrator.poll_status(id).await.unwrap();
        self.instance(id).await
    }

    pub async fn instance(&self, id: DbId) -> PluginInstance {
        self.orchestrator.get(id).await.unwrap()
    }
}

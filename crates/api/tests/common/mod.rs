//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use feedrun_api::config::ServerConfig;
use feedrun_api::routes;
use feedrun_api::state::AppState;
use feedrun_compute::{ComputeBackend, ComputeError, ComputeRegistry, RemoteStatus, SubmitRequest};
use feedrun_core::parameters::{ParameterAction, ParameterType, PluginParameter};
use feedrun_core::plugin::{Plugin, PluginKind, ResourceBounds};
use feedrun_core::types::JobHandle;
use feedrun_db::models::plugin::NewPlugin;
use feedrun_db::repositories::{MemoryPluginCatalog, MemoryPluginInstanceStore, PluginCatalog};
use feedrun_orchestrator::{Orchestrator, OrchestratorConfig, TaskHandler, TaskQueue, TaskReceiver};

pub const OWNER: &str = "foo";

/// Backend that accepts every job and reports it as running until told otherwise.
#[derive(Default)]
pub struct StubBackend {
    submitted: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl StubBackend {
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeBackend for StubBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle, ComputeError> {
        self.submitted.lock().unwrap().push(request.jid.clone());
        Ok(JobHandle::new(request.jid.clone()))
    }

    async fn poll(&self, _handle: &JobHandle) -> Result<RemoteStatus, ComputeError> {
        Ok(RemoteStatus::Running)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), ComputeError> {
        self.cancelled
            .lock()
            .unwrap()
            .push(handle.as_str().to_string());
        Ok(())
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// An in-memory application plus handles for driving its work queue.
pub struct TestApp {
    pub router: Router,
    pub orchestrator: Orchestrator,
    pub receiver: TaskReceiver,
    pub backend: Arc<StubBackend>,
    pub pacspull: Plugin,
    pub mri_convert: Plugin,
}

impl TestApp {
    /// Execute queued work until the queue is empty.
    pub async fn run_queue(&mut self) {
        loop {
            let items = self.receiver.drain();
            if items.is_empty() {
                return;
            }
            for item in items {
                self.orchestrator.execute(item).await;
            }
        }
    }

    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the application router over in-memory stores and a stub backend.
///
/// Mirrors the middleware stack in `main.rs`, minus CORS.
pub async fn build_test_app() -> TestApp {
    let backend = Arc::new(StubBackend::default());
    let mut compute = ComputeRegistry::new();
    compute.register("host", Arc::clone(&backend) as Arc<dyn ComputeBackend>);

    let catalog = Arc::new(MemoryPluginCatalog::new());
    let pacspull = catalog
        .register(plugin("pacspull", PluginKind::Fs, Vec::new()))
        .await
        .unwrap();
    let mri_convert = catalog
        .register(plugin(
            "mri_convert",
            PluginKind::Ds,
            vec![PluginParameter {
                name: "input_file".to_string(),
                flag: "--inputFile".to_string(),
                param_type: ParameterType::String,
                action: ParameterAction::Store,
                optional: true,
                default: None,
            }],
        ))
        .await
        .unwrap();

    let config = OrchestratorConfig::default();
    let (queue, receiver) = TaskQueue::channel(config.queue_name.clone());
    let orchestrator = Orchestrator::new(
        Arc::new(MemoryPluginInstanceStore::new()),
        catalog,
        Arc::new(compute),
        queue,
        config,
    );

    let state = AppState {
        orchestrator: orchestrator.clone(),
        pool: None,
        config: Arc::new(test_config()),
    };

    let request_id_header = HeaderName::from_static("x-request-id");
    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state);

    TestApp {
        router,
        orchestrator,
        receiver,
        backend,
        pacspull,
        mri_convert,
    }
}

fn plugin(name: &str, kind: PluginKind, parameters: Vec<PluginParameter>) -> NewPlugin {
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

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a request as `user` (or anonymously) with an optional JSON body.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-remote-user", user);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(OWNER), None).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(OWNER), Some(body)).await
}

pub async fn put_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(OWNER), Some(body)).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(OWNER), None).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

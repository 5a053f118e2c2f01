use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedrun_api::config::ServerConfig;
use feedrun_api::middleware::remote_user::REMOTE_USER_HEADER;
use feedrun_api::state::AppState;
use feedrun_api::{routes, seed};
use feedrun_compute::{ComputeRegistry, ComputeResourceConfig};
use feedrun_db::repositories::{
    MemoryPluginCatalog, MemoryPluginInstanceStore, PluginCatalog, PluginInstanceRepo,
    PluginInstanceStore, PluginRepo,
};
use feedrun_orchestrator::{
    schedule_lifecycle_tasks, Orchestrator, OrchestratorConfig, TaskHandler, TaskQueue,
    TaskScheduler,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "feedrun_api=debug,feedrun_orchestrator=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let orchestrator_config = OrchestratorConfig::from_env();
    tracing::info!(
        queue = %orchestrator_config.queue_name,
        concurrency = orchestrator_config.worker_concurrency,
        "Loaded orchestrator configuration",
    );

    // --- Storage ---
    let (pool, store, catalog) = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = feedrun_db::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            feedrun_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            feedrun_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            let store: Arc<dyn PluginInstanceStore> =
                Arc::new(PluginInstanceRepo::new(pool.clone()));
            let catalog: Arc<dyn PluginCatalog> = Arc::new(PluginRepo::new(pool.clone()));
            (Some(pool), store, catalog)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            let store: Arc<dyn PluginInstanceStore> = Arc::new(MemoryPluginInstanceStore::new());
            let catalog: Arc<dyn PluginCatalog> = Arc::new(MemoryPluginCatalog::new());
            (None, store, catalog)
        }
    };

    if let Ok(path) = std::env::var("PLUGIN_REGISTRY_PATH") {
        let path = PathBuf::from(path);
        let count = seed::seed_catalog(catalog.as_ref(), &path)
            .await
            .expect("Failed to seed plugin catalog");
        tracing::info!(count, path = %path.display(), "Plugin catalog seeded");
    }

    // --- Compute resources ---
    let compute_configs = ComputeResourceConfig::from_env();
    let compute = ComputeRegistry::from_configs(&compute_configs, orchestrator_config.compute_timeout)
        .expect("Failed to build compute backend clients");
    tracing::info!(
        resources = ?compute.names().collect::<Vec<_>>(),
        "Compute resources configured",
    );

    // --- Orchestrator and task scheduler ---
    let (queue, receiver) = TaskQueue::channel(orchestrator_config.queue_name.clone());
    let mut scheduler = TaskScheduler::new(
        receiver,
        orchestrator_config.queue_name.clone(),
        orchestrator_config.worker_concurrency,
    );
    schedule_lifecycle_tasks(&mut scheduler, &orchestrator_config);

    let orchestrator = Orchestrator::new(
        store,
        catalog,
        Arc::new(compute),
        queue,
        orchestrator_config,
    );

    let scheduler_cancel = CancellationToken::new();
    let handler: Arc<dyn TaskHandler> = Arc::new(orchestrator.clone());
    let scheduler_handle = tokio::spawn(scheduler.run(handler, scheduler_cancel.clone()));
    tracing::info!("Task scheduler started");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let state = AppState {
        orchestrator,
        pool,
        config: Arc::new(config.clone()),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining task scheduler");

    scheduler_cancel.cancel();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, scheduler_handle).await.is_err() {
        tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Task scheduler did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(REMOTE_USER_HEADER)])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use nihemart_gateway::api::{self, AppState};
use nihemart_gateway::backend::{BackendClient, RetryPolicy};
use nihemart_gateway::config::{AppConfig, CacheConfig};
use nihemart_gateway::health::{HealthChecker, HealthState, HealthStatus};
use nihemart_gateway::logging::init_tracing;
use nihemart_gateway::middleware::logging::{request_logging_middleware, UuidRequestId};
use nihemart_gateway::services::idempotency::{MemoryOrderLedger, OrderLedger};
use nihemart_gateway::workers::OrderScheduleWorker;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

/// Redis-backed ledger when the cache is enabled and reachable, memory otherwise.
#[cfg(feature = "cache")]
async fn build_ledger(
    config: &CacheConfig,
) -> (Arc<dyn OrderLedger>, Option<nihemart_gateway::cache::RedisPool>) {
    use nihemart_gateway::services::idempotency::RedisOrderLedger;

    if !config.enabled {
        info!("Cache disabled, using in-memory payment ledger");
        return (Arc::new(MemoryOrderLedger::new()), None);
    }

    match nihemart_gateway::cache::init_cache_pool(config).await {
        Ok(pool) => {
            let ttl = std::time::Duration::from_secs(config.ledger_ttl);
            info!(ttl_secs = config.ledger_ttl, "Redis payment ledger ready");
            (Arc::new(RedisOrderLedger::new(pool.clone(), ttl)), Some(pool))
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, falling back to in-memory payment ledger");
            (Arc::new(MemoryOrderLedger::new()), None)
        }
    }
}

#[cfg(not(feature = "cache"))]
async fn build_ledger(_config: &CacheConfig) -> (Arc<dyn OrderLedger>, Option<()>) {
    info!("Built without cache support, using in-memory payment ledger");
    (Arc::new(MemoryOrderLedger::new()), None)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.backend.base_url,
        "Starting Nihemart payment gateway"
    );

    let backend = BackendClient::new(&config.backend)?;
    let (ledger, cache_pool) = build_ledger(&config.cache).await;

    #[cfg(feature = "cache")]
    let health_checker = HealthChecker::new(backend.clone()).with_cache(cache_pool);
    #[cfg(not(feature = "cache"))]
    let health_checker = {
        let _ = cache_pool;
        HealthChecker::new(backend.clone())
    };

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let scheduler_handle = if config.scheduler.enabled {
        let worker = OrderScheduleWorker::new(backend.clone(), &config.scheduler);
        Some(tokio::spawn(worker.run(worker_shutdown_rx)))
    } else {
        info!("Order schedule worker disabled (ORDER_SCHEDULER_ENABLED=false)");
        None
    };

    let state = AppState::new(backend, ledger)
        .with_status_policy(RetryPolicy::gateway_status(config.backend.status_max_retries))
        .with_public_base_url(config.server.public_base_url.clone());

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(health_checker);

    let app = Router::new()
        .route("/", get(root))
        .merge(health_routes)
        .merge(api::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for order schedule worker shutdown");
        }
    }

    info!("Server shutdown complete");

    Ok(())
}

async fn root() -> &'static str {
    "Nihemart payment gateway"
}

async fn health(
    State(checker): State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    let health_status = checker.check_health().await;

    if health_status.status == HealthState::Unhealthy {
        error!("Health check failed - service unhealthy");
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness check: the backend must be reachable
async fn readiness(
    state: State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, String)> {
    health(state).await
}

/// Liveness check
async fn liveness() -> &'static str {
    "OK"
}

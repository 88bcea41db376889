use anyhow::Result;
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use prometheus::TextEncoder;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rolegate::{
    config::{load_config_from_file, LimiterConfig},
    limiter::RateLimiter,
    metrics::Metrics,
    redis::{RedisConfig, RedisCounterStore},
    service::AdmissionService,
    store::{CounterStore, MemoryCounterStore},
    Decision, RateLimitError,
};

#[derive(Clone)]
struct AppState {
    service: Arc<AdmissionService>,
    metrics: Arc<Metrics>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rolegate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rolegate admission service");

    let config = load_config()?;
    info!(
        "Window: {}s, failure mode: {:?}",
        config.window_secs, config.failure_mode
    );

    let metrics = Arc::new(Metrics::new()?);
    let store = create_store().await?;
    let limiter = RateLimiter::new(config, store);
    let service = Arc::new(AdmissionService::new(limiter, metrics.clone()));
    let state = AppState { service, metrics };

    let http_addr = std::env::var("HTTP_PORT")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()?;

    let app: Router = Router::new()
        .route("/admit", get(admit))
        .route("/healthcheck", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    info!("HTTP server listening on {}", http_addr);

    let listener = TcpListener::bind(http_addr).await?;
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                warn!("HTTP server error: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    info!("Service stopped");
    Ok(())
}

fn load_config() -> Result<LimiterConfig> {
    match std::env::var("CONFIG_PATH") {
        Ok(path) => {
            info!("Loading configuration from: {}", path);
            Ok(load_config_from_file(&path)?)
        }
        Err(_) => Ok(LimiterConfig::default()),
    }
}

async fn create_store() -> Result<Box<dyn CounterStore>> {
    let backend = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string());

    match backend.as_str() {
        "memory" => {
            info!("Using in-process counter store");
            Ok(Box::new(MemoryCounterStore::default()))
        }
        "redis" => {
            let url = std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string());
            let redis_config = RedisConfig {
                url,
                ..Default::default()
            };
            info!("Using Redis counter store at {}", redis_config.url);
            Ok(Box::new(RedisCounterStore::connect(redis_config).await?))
        }
        other => Err(anyhow::anyhow!("unknown STORE_BACKEND: {}", other)),
    }
}

/// Admission endpoint. The client identity comes from the `x-client-id`
/// header when the upstream has already resolved it, otherwise from the
/// peer address; the authenticated role label comes from `x-role`.
async fn admit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    let client_id = headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string());
    let role = headers.get("x-role").and_then(|v| v.to_str().ok());

    match state.service.check(&client_id, role).await {
        Ok(Decision::Allow { remaining }) => (
            StatusCode::OK,
            Json(json!({ "status": "allowed", "remaining": remaining })),
        ),
        Ok(Decision::Deny { reason }) => {
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": reason })))
        }
        Err(e @ (RateLimitError::StoreUnavailable(_) | RateLimitError::Redis(_))) => {
            warn!("admission check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "counter store unavailable" })),
            )
        }
        Err(RateLimitError::Service(msg)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
        }
        Err(e) => {
            warn!("admission check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.service.health_check().await {
        Ok(()) => Ok(Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics) => Ok(metrics),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

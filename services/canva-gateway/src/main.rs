//! Canva Autofill Gateway
//!
//! Single-binary Rust service that:
//! 1. Runs the Canva OAuth authorization-code flow with PKCE
//! 2. Keeps one access token fresh, refreshing it lazily before expiry
//! 3. Fills brand templates through the autofill API and waits for the design
//! 4. Hands finished thumbnails to Cloudinary when configured

mod config;
mod error;
mod generate;
mod metrics;
mod oauth;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use canva_auth::{
    AuthorizationSessions, ClientConfig, MemoryCredentialStore, MemorySessionStore, TokenClient,
    TokenManager,
};
use canva_autofill::{AutofillClient, Generator, Poller};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uploader::{CloudinaryUploader, Uploader};

use crate::config::Config;

/// How long in-flight requests may take to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) sessions: Arc<AuthorizationSessions>,
    pub(crate) tokens: Arc<TokenManager>,
    pub(crate) generator: Arc<Generator>,
    pub(crate) client: Arc<ClientConfig>,
    pub(crate) prometheus: PrometheusHandle,
    pub(crate) started_at: Instant,
}

/// JSON body with an explicit status, the shape every handler returns.
pub(crate) fn json_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(oauth::AUTH_START_PATH, get(oauth::start))
        .route("/api/auth/canva", get(oauth::start))
        .route("/callback", get(oauth::callback))
        .route("/api/generate", post(generate::generate))
        .route("/api/generate-design", post(generate::generate))
        .route("/api/test", post(test_handler))
        .route_layer(middleware::from_fn(track_requests))
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Tag each request with an id, log it, and record route metrics.
async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = request.method().clone();
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("request", request_id = %request_id, %method, route = %route);

    let started = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed = started.elapsed();

    let status = response.status().as_u16();
    metrics::record_request(&route, status, elapsed.as_secs_f64());
    span.in_scope(|| {
        info!(status, duration_ms = elapsed.as_millis() as u64, "request completed");
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting canva-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        redirect_uri = %config.canva.redirect_uri,
        api_base = %config.autofill.api_base,
        poll_interval_ms = config.autofill.poll_interval_ms,
        max_attempts = config.autofill.max_attempts,
        cloudinary = config.cloudinary_config().is_some(),
        "configuration loaded"
    );

    // Cancelled on shutdown so in-flight polls stop waiting
    let shutdown = CancellationToken::new();
    let app_state = build_state(&config, reqwest::Client::new(), prometheus_handle, shutdown.clone());
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // Graceful shutdown: the drain timer starts at signal receipt, not at startup.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    shutdown.cancel();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wire stores, upstream clients and the generator from validated config.
fn build_state(
    config: &Config,
    http: reqwest::Client,
    prometheus: PrometheusHandle,
    shutdown: CancellationToken,
) -> AppState {
    let client = Arc::new(config.client_config());

    let sessions = AuthorizationSessions::new(Arc::new(MemorySessionStore::new()))
        .with_ttl(config.session_ttl());
    let exchange = Arc::new(TokenClient::new(http.clone(), client.clone()));
    let tokens = TokenManager::new(Arc::new(MemoryCredentialStore::new()), exchange)
        .with_refresh_margin(config.refresh_margin());

    let api = AutofillClient::new(http.clone(), config.timeout())
        .with_base_url(config.autofill.api_base.clone());
    let poller = Poller::new(Arc::new(api), config.poll_config()).with_cancellation(shutdown);
    let uploader = config.cloudinary_config().map(|c| {
        Arc::new(CloudinaryUploader::new(http.clone(), c)) as Arc<dyn Uploader>
    });

    AppState {
        sessions: Arc::new(sessions),
        tokens: Arc::new(tokens),
        generator: Arc::new(Generator::new(poller, uploader)),
        client,
        prometheus,
        started_at: Instant::now(),
    }
}

/// Health endpoint: liveness plus credential state. Never exposes tokens.
async fn health_handler(State(state): State<AppState>) -> Response {
    let status = state.tokens.status().await.ok();
    let authenticated = status.as_ref().is_some_and(|s| s.authenticated);
    let expires_at = status.as_ref().and_then(|s| s.expires_at);
    let token_usable = status.as_ref().is_some_and(|s| s.usable);

    json_response(
        StatusCode::OK,
        json!({
            "status": "OK",
            "message": "Canva autofill gateway is running",
            "authenticated": authenticated,
            "token_expires_at": expires_at,
            "token_usable": token_usable,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Echo endpoint for integration checks.
async fn test_handler(body: Result<axum::Json<Value>, axum::extract::rejection::JsonRejection>) -> Response {
    let received = body.map(|axum::Json(v)| v).unwrap_or_else(|_| json!({}));
    json_response(
        StatusCode::OK,
        json!({
            "success": true,
            "message": "API is working correctly",
            "receivedData": received,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

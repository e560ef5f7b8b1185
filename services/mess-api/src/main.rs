//! Mess API
//!
//! HTTP service for meal subscriptions and coupon redemption.
//!
//! ## REST Endpoints
//!
//! - `GET /api/v1/plans` - List plans
//! - `GET /api/v1/plans/:id` - Get plan
//! - `POST /api/v1/plans` - Create plan (admin)
//! - `PUT /api/v1/plans/:id` - Update plan (admin)
//! - `PATCH /api/v1/plans/:id/status` - Activate or deactivate plan (admin)
//! - `DELETE /api/v1/plans/:id` - Delete a plan with no subscriptions (admin)
//! - `POST /api/v1/subscriptions` - Buy a plan
//! - `GET /api/v1/subscriptions/mine` - Caller's subscriptions
//! - `GET /api/v1/subscriptions` - All subscriptions (admin)
//! - `GET /api/v1/subscriptions/stats` - Count and revenue per status (admin)
//! - `GET /api/v1/subscriptions/:id` - Get subscription
//! - `PATCH /api/v1/subscriptions/:id/cancel` - Cancel subscription
//! - `PATCH /api/v1/subscriptions/:id/status` - Override status (admin)
//! - `POST /api/v1/subscriptions/:id/payment` - Record payment outcome (admin)
//! - `POST /api/v1/subscriptions/:id/extend` - Extend end date (admin)
//! - `GET /api/v1/coupons/mine` - Caller's coupons
//! - `GET /api/v1/coupons/:id` - Get coupon with QR payload
//! - `POST /api/v1/coupons/validate` - Redeem by code (staff)
//! - `POST /api/v1/coupons/scan-qr` - Redeem from QR scan (staff)
//! - `GET /api/v1/coupons/stats/usage` - Usage statistics (admin)
//! - `GET /api/v1/attendance/mine` - Caller's meal history
//!
//! Caller identity arrives in gateway headers, see [`extractors`].
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

mod config;
mod error;
mod extractors;
mod handlers;
mod state;

use std::net::SocketAddr;

use axum::routing::{get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use mess_core::MessEngine;
use mess_db::Repositories;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::handlers::{health, ready};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("mess_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mess API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        default_location = %config.ledger.default_location,
        code_attempts = config.ledger.code_attempts,
        "Configuration loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    // Create database pool and bring the schema up to date
    let pool = mess_db::create_pool_with_options(&config.database_url, config.pool.clone()).await?;
    mess_db::run_migrations(&pool).await?;
    tracing::info!("Database pool created");

    // Wire the engine
    let repos = Repositories::new(pool.clone());
    let engine = MessEngine::from_repositories(repos, config.ledger.clone());

    let state = AppState::new(engine, pool, config.clone());
    let app = build_router(state, metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    let api_v1 = Router::new()
        // Plan catalog
        .route(
            "/plans",
            get(handlers::list_plans).post(handlers::create_plan),
        )
        .route(
            "/plans/{id}",
            get(handlers::get_plan)
                .put(handlers::update_plan)
                .delete(handlers::delete_plan),
        )
        .route("/plans/{id}/status", patch(handlers::set_plan_status))
        // Subscriptions
        .route(
            "/subscriptions",
            get(handlers::list_subscriptions).post(handlers::create_subscription),
        )
        .route("/subscriptions/mine", get(handlers::my_subscriptions))
        .route("/subscriptions/stats", get(handlers::subscription_stats))
        .route("/subscriptions/{id}", get(handlers::get_subscription))
        .route(
            "/subscriptions/{id}/cancel",
            patch(handlers::cancel_subscription),
        )
        .route(
            "/subscriptions/{id}/status",
            patch(handlers::update_subscription_status),
        )
        .route("/subscriptions/{id}/payment", post(handlers::record_payment))
        .route(
            "/subscriptions/{id}/extend",
            post(handlers::extend_subscription),
        )
        // Coupons
        .route("/coupons/mine", get(handlers::my_coupons))
        .route("/coupons/validate", post(handlers::validate_coupon))
        .route("/coupons/scan-qr", post(handlers::scan_qr))
        .route("/coupons/stats/usage", get(handlers::usage_stats))
        .route("/coupons/{id}", get(handlers::get_coupon))
        // Attendance
        .route("/attendance/mine", get(handlers::my_attendance));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics route (no timeout)
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(middleware)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    // Redemption happens at a queue; p99 target is well under 200ms
    let latency_buckets = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.5, 1.0, 2.5];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(mess_core::metrics::OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    mess_core::metrics::describe_metrics();
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds by operation"
    );

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

mod error;
mod logs;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hedgedesk_core::domain::request::AnalysisRequestBody;
use hedgedesk_core::domain::response::AnalysisResponse;
use hedgedesk_core::engine::AnalysisEngine;
use hedgedesk_core::progress::LogLevel;

use crate::error::ApiError;
use crate::logs::LogHub;

const DEFAULT_PORT: u16 = 6000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = hedgedesk_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let logs = LogHub::default();
    let engine = AnalysisEngine::from_settings(&settings)?.with_progress(Arc::new(logs.clone()));
    tracing::info!(
        analysts = engine.registry().len(),
        scaling = %settings.quantity_scaling,
        "analysis engine ready"
    );

    let app = router(AppState { engine, logs });

    let port: u16 = ["PORT", "FLASK_RUN_PORT"]
        .iter()
        .find_map(|key| std::env::var(key).ok().and_then(|v| v.parse().ok()))
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) struct AppState {
    engine: AnalysisEngine,
    logs: LogHub,
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/analysis", post(run_analysis))
        .route("/ws/logs", get(logs::ws_logs))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn run_analysis(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequestBody>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let result = match body {
        Ok(Json(body)) => state.engine.analyze(body).await.map_err(ApiError::from),
        Err(rejection) => Err(ApiError::from(rejection)),
    };

    result.map(Json).inspect_err(|err| {
        state
            .engine
            .log(LogLevel::Error, &format!("API Error: {err}"));
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &hedgedesk_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

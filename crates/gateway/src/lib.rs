pub mod config;
pub mod error;
pub mod key_directory;
pub mod proxy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::GatewayMetrics;
use rate_limiter::CounterStore;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use error::ApiError;
use proxy::ProxyHandler;

pub struct AppState<C: CounterStore> {
    pub proxy: Arc<ProxyHandler<C>>,
    pub metrics: Arc<GatewayMetrics>,
    /// Set at startup if the counter store's initial reachability probe
    /// failed and `bypass_on_failure` is configured; `/health` surfaces it
    /// so an operator can tell degraded-but-bypassing apart from healthy.
    pub rate_limiting_disabled: Arc<AtomicBool>,
}

impl<C: CounterStore> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            metrics: self.metrics.clone(),
            rate_limiting_disabled: self.rate_limiting_disabled.clone(),
        }
    }
}

pub fn build_router<C: CounterStore>(state: AppState<C>) -> Router {
    Router::new()
        .route("/v1/embed", post(embed::<C>))
        .route("/v1/usage", get(usage::<C>))
        .route("/health", get(health::<C>))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_endpoint::<C>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Deserialize)]
struct EmbedRequest {
    input_text: String,
}

async fn embed<C: CounterStore>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Json(req): Json<EmbedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = state.proxy.authenticate(bearer_token(&headers)).await?;
    state.proxy.check_rate_limit(&principal, now_ms()).await?;

    let body = state
        .proxy
        .forward(serde_json::json!({ "input_text": req.input_text }))
        .await;

    let status_label = if body.is_ok() { "success" } else { "error" };
    state.metrics.requests_total.with_label_values(&[status_label]).inc();

    Ok(Json(body?))
}

#[derive(Serialize)]
struct UsageWindow {
    requests_last_minute: u32,
    requests_last_hour: u32,
    timestamp: i64,
}

#[derive(Serialize)]
struct UsageLimits {
    per_minute: u32,
    per_hour: u32,
}

#[derive(Serialize)]
struct UsageResponse {
    user_id: String,
    usage: UsageWindow,
    limits: UsageLimits,
}

async fn usage<C: CounterStore>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let principal = state.proxy.authenticate(bearer_token(&headers)).await?;
    let now = now_ms();
    let (minute, hour) = state.proxy.usage(&principal, now).await;

    Ok(Json(UsageResponse {
        user_id: principal.id,
        usage: UsageWindow {
            requests_last_minute: minute,
            requests_last_hour: hour,
            timestamp: now / 1000,
        },
        limits: UsageLimits {
            per_minute: principal.requests_per_minute,
            per_hour: principal.requests_per_hour,
        },
    }))
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limiting: Option<&'static str>,
}

async fn health<C: CounterStore>(State(state): State<AppState<C>>) -> Json<HealthBody> {
    let rate_limiting = state
        .rate_limiting_disabled
        .load(Ordering::Relaxed)
        .then_some("disabled");
    Json(HealthBody { status: "ready", rate_limiting })
}

async fn ready() -> impl IntoResponse {
    Json(HealthBody { status: "ready", rate_limiting: None })
}

async fn metrics_endpoint<C: CounterStore>(State(state): State<AppState<C>>) -> Result<impl IntoResponse, ApiError> {
    let body = metrics::encode(&state.metrics.registry).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

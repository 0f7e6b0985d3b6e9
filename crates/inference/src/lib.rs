pub mod config;
pub mod error;
pub mod ingress;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use batch_engine::{BatchExecutor, BatchingEngine, MockExecutor};
use metrics::InferenceMetrics;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use config::InferenceConfig;
use error::ApiError;
use ingress::SharedEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: SharedEngine,
    pub metrics: Arc<InferenceMetrics>,
    pub request_deadline: Duration,
    pub model_name: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/embed", post(embed))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wires a fresh `BatchingEngine` backed by a `MockExecutor` — the
/// inference binary's default, real-model-free configuration.
pub fn build_state(config: &InferenceConfig, metrics: Arc<InferenceMetrics>) -> anyhow::Result<AppState> {
    let executor: Arc<dyn BatchExecutor<String, Vec<f32>>> = Arc::new(MockExecutor::new(config.embedding_dims));
    let engine = BatchingEngine::new(config.batcher_config(), executor, metrics.clone())
        .map_err(|err| anyhow::anyhow!("invalid batcher configuration: {err}"))?;

    Ok(AppState {
        engine: Arc::new(engine),
        metrics,
        request_deadline: config.request_deadline,
        model_name: "mock-embedder-v1",
    })
}

#[derive(Deserialize)]
struct EmbedRequest {
    input_text: String,
}

#[derive(Serialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
    model: &'static str,
}

async fn embed(State(state): State<AppState>, Json(req): Json<EmbedRequest>) -> Result<impl IntoResponse, ApiError> {
    let correlation_id = uuid::Uuid::new_v4();
    let start = std::time::Instant::now();

    let result = ingress::handle_embed(&state.engine, &req.input_text, state.request_deadline, correlation_id).await;

    let status_label = match &result {
        Ok(_) => "success",
        Err(ApiError::Overloaded) => "overloaded",
        Err(ApiError::DeadlineExceeded) => "timeout",
        Err(_) => "error",
    };
    state
        .metrics
        .requests_total
        .with_label_values(&[status_label])
        .inc();
    state
        .metrics
        .end_to_end_latency
        .with_label_values(&[status_label])
        .observe(start.elapsed().as_secs_f64());

    result.map(|embedding| {
        Json(EmbedResponse {
            embedding,
            model: state.model_name,
        })
    })
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    model: &'static str,
    device: &'static str,
    queue_size: i64,
    inflight_batches: i64,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ready",
        model: state.model_name,
        device: "cpu",
        queue_size: state.metrics.queue_size.get(),
        inflight_batches: state.metrics.inflight_batches.get(),
    })
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
}

async fn ready() -> impl IntoResponse {
    Json(ReadyBody { status: "ready" })
}

async fn metrics_endpoint(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = metrics::encode(&state.metrics.registry).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use prometheus::Registry;
    use tower::ServiceExt;

    fn test_config() -> InferenceConfig {
        InferenceConfig {
            bind_addr: "0.0.0.0".parse().unwrap(),
            port: 0,
            max_batch_size: 4,
            batch_timeout: Duration::from_millis(10),
            num_collectors: 1,
            num_workers: 1,
            queue_capacity: 16,
            request_deadline: Duration::from_millis(500),
            embedding_dims: 8,
            log_level: "info".to_owned(),
            log_json: false,
            log_dir: None,
        }
    }

    #[tokio::test]
    async fn embed_endpoint_returns_embedding() {
        let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
        let state = build_state(&test_config(), metrics).unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/embed")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"input_text":"hello world"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn embed_endpoint_rejects_empty_input() {
        let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
        let state = build_state(&test_config(), metrics).unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/embed")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"input_text":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn health_reports_ready() {
        let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
        let state = build_state(&test_config(), metrics).unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}

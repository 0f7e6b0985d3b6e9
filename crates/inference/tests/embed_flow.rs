//! End-to-end flows through the real Axum router, as opposed to the
//! colocated unit tests which exercise individual handlers in isolation.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use inference::config::InferenceConfig;
use inference::{build_router, build_state};
use metrics::InferenceMetrics;
use prometheus::Registry;
use tower::ServiceExt;

fn config(max_batch_size: usize, batch_timeout_ms: u64) -> InferenceConfig {
    InferenceConfig {
        bind_addr: "0.0.0.0".parse().unwrap(),
        port: 0,
        max_batch_size,
        batch_timeout: Duration::from_millis(batch_timeout_ms),
        num_collectors: 2,
        num_workers: 2,
        queue_capacity: 64,
        request_deadline: Duration::from_millis(500),
        embedding_dims: 8,
        log_level: "info".to_owned(),
        log_json: false,
        log_dir: None,
    }
}

async fn post_embed(app: &axum::Router, input_text: &str) -> StatusCode {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/embed")
                .header("content-type", "application/json")
                .body(Body::from(format!(r#"{{"input_text":"{input_text}"}}"#)))
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn concurrent_requests_share_a_batch_and_all_succeed() {
    let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
    let state = build_state(&config(8, 20), metrics).unwrap();
    let app = build_router(state);

    let mut handles = Vec::new();
    for n in 0..6 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            post_embed(&app, &format!("item-{n}")).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
}

#[tokio::test]
async fn metrics_endpoint_reports_prometheus_text_format() {
    let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
    let state = build_state(&config(4, 10), metrics).unwrap();
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(axum::http::header::CONTENT_TYPE).unwrap(),
        "text/plain; version=0.0.4"
    );
}

#[tokio::test]
async fn ready_endpoint_reports_ready_before_any_traffic() {
    let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
    let state = build_state(&config(4, 10), metrics).unwrap();
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

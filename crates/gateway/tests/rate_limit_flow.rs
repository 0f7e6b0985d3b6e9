//! End-to-end flows through the real Axum router, covering the
//! authenticate -> rate-limit -> forward pipeline the colocated unit tests
//! don't exercise as a whole (repeated requests tripping a limit, the
//! resulting headers).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use auth::{Authenticator, Principal, StaticKeyDirectory};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use gateway::proxy::ProxyHandler;
use gateway::{build_router, AppState};
use metrics::GatewayMetrics;
use prometheus::Registry;
use rate_limiter::{InMemoryCounterStore, RateLimiter};
use tower::ServiceExt;

fn state_with_limits(requests_per_minute: u32) -> AppState<InMemoryCounterStore> {
    let metrics = Arc::new(GatewayMetrics::new(Registry::new()));
    let directory = StaticKeyDirectory::from_raw_keys(vec![(
        "secret-key".to_owned(),
        Principal {
            id: "alice".to_owned(),
            display_name: "Alice".to_owned(),
            requests_per_minute,
            requests_per_hour: 1000,
        },
    )]);
    let authenticator = Authenticator::new(Arc::new(directory), metrics.clone());
    let rate_limiter = RateLimiter::new(InMemoryCounterStore::new(), metrics.clone(), false);
    let proxy = ProxyHandler::new(
        authenticator,
        rate_limiter,
        reqwest::Client::new(),
        "http://127.0.0.1:1".to_owned(),
        Duration::from_millis(50),
        metrics.clone(),
    );
    AppState {
        proxy: Arc::new(proxy),
        metrics,
        rate_limiting_disabled: Arc::new(AtomicBool::new(false)),
    }
}

async fn embed(app: &axum::Router) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/embed")
                .header("content-type", "application/json")
                .header("authorization", "Bearer secret-key")
                .body(Body::from(r#"{"input_text":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn third_request_within_a_minute_budget_of_two_is_rate_limited() {
    let app = build_router(state_with_limits(2));

    assert_eq!(embed(&app).await.status(), StatusCode::BAD_GATEWAY); // admitted, upstream unreachable
    assert_eq!(embed(&app).await.status(), StatusCode::BAD_GATEWAY); // admitted, upstream unreachable

    let third = embed(&app).await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = third
        .headers()
        .get(axum::http::header::RETRY_AFTER)
        .expect("retry-after header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    // The two admitted requests happened moments ago, not 60s ago, so the
    // precise retry-after (time until the oldest of them ages out) must be
    // well under the full window -- a regression to "always the full
    // window" would report 60 here.
    assert!(retry_after < 60, "expected a precise retry-after, got {retry_after}");
    assert!(third.headers().contains_key("x-ratelimit-limit"));
    assert!(third.headers().contains_key("x-ratelimit-reset"));
}

#[tokio::test]
async fn health_and_ready_require_no_credentials() {
    let app = build_router(state_with_limits(60));

    for path in ["/health", "/ready"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

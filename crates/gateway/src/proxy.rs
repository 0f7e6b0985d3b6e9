use std::sync::Arc;
use std::time::Duration;

use auth::{Authenticator, Principal};
use metrics::GatewayMetrics;
use rate_limiter::{CounterStore, Decision, RateLimiter, RateLimits};
use reqwest::Client;
use tracing::{error, warn};

use crate::error::ApiError;

/// Orchestrates a single `/v1/embed` request: authenticate, rate-limit,
/// forward to Inference, translate the upstream response. Holds the pooled
/// `reqwest::Client` (one per process, keep-alive) and every other
/// per-request collaborator; stateless beyond those shared handles.
pub struct ProxyHandler<C: CounterStore> {
    authenticator: Authenticator,
    rate_limiter: RateLimiter<C>,
    http_client: Client,
    inference_url: String,
    upstream_timeout: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl<C: CounterStore> ProxyHandler<C> {
    pub fn new(
        authenticator: Authenticator,
        rate_limiter: RateLimiter<C>,
        http_client: Client,
        inference_url: String,
        upstream_timeout: Duration,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            authenticator,
            rate_limiter,
            http_client,
            inference_url,
            upstream_timeout,
            metrics,
        }
    }

    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Principal, ApiError> {
        self.authenticator
            .authenticate(bearer)
            .await
            .map_err(|_| ApiError::Unauthorized)
    }

    pub async fn check_rate_limit(&self, principal: &Principal, now_ms: i64) -> Result<(), ApiError> {
        let limits = RateLimits {
            requests_per_minute: principal.requests_per_minute,
            requests_per_hour: principal.requests_per_hour,
        };
        match self.rate_limiter.check(&principal.id, limits, now_ms).await {
            Decision::Allow => Ok(()),
            Decision::Deny { limit, retry_after } => Err(ApiError::RateLimited {
                retry_after,
                limit: if limit == "minute" {
                    principal.requests_per_minute
                } else {
                    principal.requests_per_hour
                },
                limit_type: limit,
            }),
        }
    }

    pub async fn usage(&self, principal: &Principal, now_ms: i64) -> (u32, u32) {
        let limits = RateLimits {
            requests_per_minute: principal.requests_per_minute,
            requests_per_hour: principal.requests_per_hour,
        };
        self.rate_limiter.usage(&principal.id, limits, now_ms).await
    }

    /// Forward the already-validated request body upstream. No retries:
    /// the request has already been counted against the caller's limit, so
    /// retrying here would amplify load during an incident rather than
    /// absorb it.
    pub async fn forward(&self, body: serde_json::Value) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}/embed", self.inference_url.trim_end_matches('/'));
        let start = std::time::Instant::now();

        let result = self
            .http_client
            .post(&url)
            .timeout(self.upstream_timeout)
            .json(&body)
            .send()
            .await;

        let outcome = match &result {
            Ok(resp) if resp.status().is_success() => "success",
            Ok(_) => "upstream_error",
            Err(_) => "unreachable",
        };
        self.metrics
            .upstream_latency
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        let response = result.map_err(|err| {
            warn!(error = %err, "inference upstream unreachable");
            ApiError::UpstreamUnavailable
        })?;

        if !response.status().is_success() {
            error!(status = %response.status(), "inference upstream returned an error status");
            return Err(ApiError::UpstreamUnavailable);
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| ApiError::Internal(format!("malformed upstream response: {err}")))
    }
}

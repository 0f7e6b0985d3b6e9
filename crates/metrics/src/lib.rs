//! Shared Prometheus registry and RAII gauge helpers used by both the
//! gateway and inference binaries.

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

/// Latency-shaped histogram buckets, 1ms to ~5s, log-spaced.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Batch-size buckets; the useful range is small and linear, not log-spaced.
pub const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0];

/// Metrics shared by the inference binary: batching, queueing, executor health.
pub struct InferenceMetrics {
    pub registry: Registry,
    pub requests_total: IntCounterVec,
    pub end_to_end_latency: HistogramVec,
    pub batch_size: prometheus::Histogram,
    pub batch_wait_time: prometheus::Histogram,
    pub inference_time: prometheus::Histogram,
    pub batches_processed_total: IntCounterVec,
    pub queue_size: IntGauge,
    pub inflight_batches: IntGauge,
}

impl InferenceMetrics {
    pub fn new(registry: Registry) -> Self {
        let requests_total = register_int_counter_vec_with_registry!(
            "requests_total",
            "Number of /embed requests by terminal status",
            &["status"],
            registry,
        )
        .unwrap();

        let end_to_end_latency = register_histogram_vec_with_registry!(
            "request_latency_seconds",
            "End-to-end request latency from ingress to response",
            &["status"],
            LATENCY_BUCKETS.to_vec(),
            registry,
        )
        .unwrap();

        let batch_size = prometheus::Histogram::with_opts(
            prometheus::HistogramOpts::new("batch_size", "Number of items in a dispatched batch")
                .buckets(BATCH_SIZE_BUCKETS.to_vec()),
        )
        .unwrap();
        registry.register(Box::new(batch_size.clone())).unwrap();

        let batch_wait_time = prometheus::Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "batch_wait_time_seconds",
                "Time from first item's arrival to batch closure",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )
        .unwrap();
        registry
            .register(Box::new(batch_wait_time.clone()))
            .unwrap();

        let inference_time = prometheus::Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "inference_time_seconds",
                "Time spent inside BatchExecutor::run",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )
        .unwrap();
        registry
            .register(Box::new(inference_time.clone()))
            .unwrap();

        let batches_processed_total = register_int_counter_vec_with_registry!(
            "batches_processed_total",
            "Number of batches processed by the worker pool, by outcome",
            &["outcome"],
            registry,
        )
        .unwrap();

        let queue_size =
            register_int_gauge_with_registry!("queue_size", "Current BatchQueue depth", registry)
                .unwrap();

        let inflight_batches = register_int_gauge_with_registry!(
            "inflight_batches",
            "Number of batches currently inside the worker pool",
            registry,
        )
        .unwrap();

        Self {
            registry,
            requests_total,
            end_to_end_latency,
            batch_size,
            batch_wait_time,
            inference_time,
            batches_processed_total,
            queue_size,
            inflight_batches,
        }
    }
}

/// Metrics shared by the gateway binary: auth, rate limiting, proxying.
pub struct GatewayMetrics {
    pub registry: Registry,
    pub requests_total: IntCounterVec,
    pub auth_outcomes_total: IntCounterVec,
    pub rate_limit_decisions_total: IntCounterVec,
    pub rate_limit_fallback_total: prometheus::IntCounter,
    pub upstream_latency: HistogramVec,
}

impl GatewayMetrics {
    pub fn new(registry: Registry) -> Self {
        let requests_total = register_int_counter_vec_with_registry!(
            "gateway_requests_total",
            "Number of /v1/embed requests by terminal status",
            &["status"],
            registry,
        )
        .unwrap();

        let auth_outcomes_total = register_int_counter_vec_with_registry!(
            "gateway_auth_outcomes_total",
            "Authentication outcomes",
            &["outcome"],
            registry,
        )
        .unwrap();

        let rate_limit_decisions_total = register_int_counter_vec_with_registry!(
            "gateway_rate_limit_decisions_total",
            "Rate limiter decisions by outcome and window",
            &["decision", "limit_type"],
            registry,
        )
        .unwrap();

        let rate_limit_fallback_total = prometheus::IntCounter::with_opts(
            prometheus::Opts::new(
                "gateway_rate_limit_fallback_total",
                "Times the rate limiter bypassed due to an unreachable CounterStore",
            ),
        )
        .unwrap();
        registry
            .register(Box::new(rate_limit_fallback_total.clone()))
            .unwrap();

        let upstream_latency = register_histogram_vec_with_registry!(
            "gateway_upstream_latency_seconds",
            "Latency of the gateway-to-inference RPC",
            &["status"],
            LATENCY_BUCKETS.to_vec(),
            registry,
        )
        .unwrap();

        Self {
            registry,
            requests_total,
            auth_outcomes_total,
            rate_limit_decisions_total,
            rate_limit_fallback_total,
            upstream_latency,
        }
    }
}

/// Spawn a fire-and-forget background task the way the reference
/// codebase's worker tasks are spawned: named, with a panic logged instead
/// of silently vanishing into a dropped `JoinHandle`. Bare `tokio::spawn` on
/// a long-running loop (a collector, a worker slot) leaves no trace if the
/// task dies; this always leaves one.
pub fn spawn_monitored<F>(name: &'static str, fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(join_err) = tokio::spawn(fut).await {
            tracing::error!(task = name, error = %join_err, "monitored background task panicked");
        }
    });
}

/// Render a registry's families in Prometheus text exposition format.
pub fn encode(registry: &Registry) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    let families = registry.gather();
    encoder.encode(&families, &mut buf)?;
    Ok(buf)
}

/// RAII guard that increments a gauge on construction and decrements it on
/// drop, so a gauge can never drift out of sync with the thing it counts.
/// Built on `scopeguard::guard` rather than a hand-rolled `Drop` impl.
pub struct GaugeGuard(scopeguard::ScopeGuard<IntGauge, fn(IntGauge)>);

impl GaugeGuard {
    pub fn acquire(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(scopeguard::guard(gauge.clone(), |g| g.dec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_guard_balances_inc_and_dec() {
        let registry = Registry::new();
        let gauge = register_int_gauge_with_registry!("t_gauge", "test", registry).unwrap();
        assert_eq!(gauge.get(), 0);
        {
            let _guard = GaugeGuard::acquire(&gauge);
            assert_eq!(gauge.get(), 1);
        }
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn inference_metrics_register_without_panicking() {
        let m = InferenceMetrics::new(Registry::new());
        m.queue_size.set(3);
        assert_eq!(m.queue_size.get(), 3);
        let out = encode(&m.registry).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("queue_size"));
    }
}

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use auth::Authenticator;
use clap::Parser;
use gateway::config::GatewayConfig;
use gateway::key_directory::load_key_directory;
use gateway::proxy::ProxyHandler;
use gateway::{build_router, AppState};
use metrics::GatewayMetrics;
use prometheus::Registry;
use rate_limiter::{CounterStore, InMemoryCounterStore, RateLimiter, RedisCounterStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Returns the file-appender's `WorkerGuard` when `log_dir` is set; holding
/// it for the life of `main` is what keeps the non-blocking writer's
/// background thread alive and flushed on shutdown.
fn init_tracing(log_level: &str, json: bool, log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gateway.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(tracing_subscriber::fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).with(file_layer).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).with(file_layer).init();
    }
    guard
}

fn build_counter_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn CounterStore>> {
    match &config.counter_store_url {
        Some(url) => {
            let pool = deadpool_redis::Config::from_url(url)
                .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                .map_err(|err| anyhow::anyhow!("failed to build redis pool: {err}"))?;
            Ok(Arc::new(RedisCounterStore::new(pool)))
        }
        None => {
            warn!("no GATEWAY_COUNTER_STORE_URL configured; using single-process in-memory rate limiting");
            Ok(Arc::new(InMemoryCounterStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::parse();
    let _log_guard = init_tracing(&config.log_level, config.log_json, config.log_dir.as_deref());

    let metrics = Arc::new(GatewayMetrics::new(Registry::new()));
    let directory = load_key_directory(&config.key_directory_path)?;
    let authenticator = Authenticator::new(Arc::new(directory), metrics.clone());

    let counter_store = build_counter_store(&config)?;
    let rate_limiting_disabled = Arc::new(AtomicBool::new(false));
    if let Err(err) = counter_store.usage("__gateway_startup_probe__", Duration::from_secs(1), 0).await {
        if config.bypass_rate_limits {
            warn!(error = %err, "counter store unreachable at startup; bypass is enabled, reporting rate limiting disabled via /health");
            rate_limiting_disabled.store(true, Ordering::Relaxed);
        } else {
            warn!(error = %err, "counter store unreachable at startup");
        }
    }
    let rate_limiter = RateLimiter::new(counter_store, metrics.clone(), config.bypass_rate_limits);

    let http_client = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()?;

    let proxy = ProxyHandler::new(
        authenticator,
        rate_limiter,
        http_client,
        config.inference_url.clone(),
        config.upstream_timeout,
        metrics.clone(),
    );

    let state = AppState {
        proxy: Arc::new(proxy),
        metrics,
        rate_limiting_disabled,
    };
    let app = build_router(state);

    let addr = SocketAddr::new(config.bind_addr, config.port);
    info!(%addr, inference_url = %config.inference_url, "starting gateway server");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

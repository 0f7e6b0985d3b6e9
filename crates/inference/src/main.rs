use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use inference::config::InferenceConfig;
use inference::{build_router, build_state};
use metrics::InferenceMetrics;
use prometheus::Registry;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Returns the file-appender's `WorkerGuard` when `log_dir` is set; holding
/// it for the life of `main` is what keeps the non-blocking writer's
/// background thread alive and flushed on shutdown.
fn init_tracing(log_level: &str, json: bool, log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inference.log");
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InferenceConfig::parse();
    let _log_guard = init_tracing(&config.log_level, config.log_json, config.log_dir.as_deref());

    let metrics = Arc::new(InferenceMetrics::new(Registry::new()));
    let state = build_state(&config, metrics)?;
    let app = build_router(state);

    let addr = SocketAddr::new(config.bind_addr, config.port);
    info!(%addr, max_batch_size = config.max_batch_size, num_workers = config.num_workers, "starting inference server");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

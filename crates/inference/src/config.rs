use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

fn parse_millis(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    Ok(Duration::from_millis(arg.parse()?))
}

/// Immutable startup configuration for the inference process, loaded once
/// via `clap` with environment-variable overrides (`INFERENCE_*`).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Dynamic batching inference server")]
pub struct InferenceConfig {
    #[arg(long, env = "INFERENCE_BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    #[arg(long, env = "INFERENCE_PORT", default_value_t = 8081)]
    pub port: u16,

    #[arg(long, env = "INFERENCE_MAX_BATCH_SIZE", default_value_t = 32)]
    pub max_batch_size: usize,

    #[arg(long, env = "INFERENCE_BATCH_TIMEOUT_MS", value_parser = parse_millis, default_value = "10")]
    pub batch_timeout: Duration,

    #[arg(long, env = "INFERENCE_NUM_COLLECTORS", default_value_t = 2)]
    pub num_collectors: usize,

    #[arg(long, env = "INFERENCE_NUM_WORKERS", default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, env = "INFERENCE_QUEUE_CAPACITY", default_value_t = 1024)]
    pub queue_capacity: usize,

    #[arg(long, env = "INFERENCE_REQUEST_DEADLINE_MS", value_parser = parse_millis, default_value = "2000")]
    pub request_deadline: Duration,

    #[arg(long, env = "INFERENCE_EMBEDDING_DIMS", default_value_t = 256)]
    pub embedding_dims: usize,

    #[arg(long, env = "INFERENCE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "INFERENCE_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Directory for non-blocking rolling file logs, in addition to stdout.
    /// Unset by default.
    #[arg(long, env = "INFERENCE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl InferenceConfig {
    pub fn batcher_config(&self) -> batch_engine::BatcherConfig {
        batch_engine::BatcherConfig {
            max_batch_size: self.max_batch_size,
            batch_timeout: self.batch_timeout,
            num_collectors: self.num_collectors,
            num_workers: self.num_workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

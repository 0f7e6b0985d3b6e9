use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

fn parse_millis(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    Ok(Duration::from_millis(arg.parse()?))
}

/// Immutable startup configuration for the gateway, loaded once via `clap`
/// with environment-variable overrides (`GATEWAY_*`).
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authenticating, rate-limiting proxy in front of the inference server")]
pub struct GatewayConfig {
    #[arg(long, env = "GATEWAY_BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "GATEWAY_INFERENCE_URL", default_value = "http://127.0.0.1:8081")]
    pub inference_url: String,

    #[arg(long, env = "GATEWAY_UPSTREAM_TIMEOUT_MS", value_parser = parse_millis, default_value = "5000")]
    pub upstream_timeout: Duration,

    #[arg(long, env = "GATEWAY_BYPASS_RATE_LIMITS", default_value_t = false)]
    pub bypass_rate_limits: bool,

    /// Redis connection URL backing the distributed counter store. When
    /// absent, the gateway falls back to an in-process counter store —
    /// correct for local development, not for a multi-instance deployment.
    #[arg(long, env = "GATEWAY_COUNTER_STORE_URL")]
    pub counter_store_url: Option<String>,

    /// Path to a CSV of `api_key,principal_id,display_name,requests_per_minute,requests_per_hour`
    /// lines, loaded once at startup into a `StaticKeyDirectory`.
    #[arg(long, env = "GATEWAY_KEY_DIRECTORY_PATH")]
    pub key_directory_path: PathBuf,

    #[arg(long, env = "GATEWAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "GATEWAY_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Directory for non-blocking rolling file logs, in addition to stdout.
    /// Unset by default.
    #[arg(long, env = "GATEWAY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

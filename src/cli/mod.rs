//! Command-line interface
//!
//! The binary is the credential source: it reads the key id and PEM file
//! (flags or `KALSHI_KEY_ID` / `KALSHI_KEY_FILE`) and hands them to the
//! library, which never touches files or the environment for credentials.

pub mod collect;
pub mod error;
pub mod get;
pub mod stream;

pub use collect::{CollectArgs, CollectKind};
pub use error::CliError;
pub use get::GetArgs;
pub use stream::StreamArgs;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::Credentials;
use crate::downloader::config::{DEFAULT_RATE_LIMIT_PER_SECOND, DEFAULT_WORKERS};
use crate::downloader::RateLimitPolicy;
use crate::fetcher::{ClientConfig, Environment, KalshiHttpClient, RetryPolicy};

/// Maximum worker count; matches the batch concurrency ceiling
const MAX_WORKERS: usize = 20;

fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Kalshi collector CLI
#[derive(Parser, Debug)]
#[command(name = "kalshi-collector")]
#[command(about = "Signed REST and WebSocket client for the Kalshi exchange", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Target environment: demo or prod
    #[arg(long, global = true, env = "KALSHI_ENV", default_value = "demo")]
    pub env: Environment,

    /// Override the REST base URL (e.g. a local mock server)
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Override the WebSocket base URL
    #[arg(long, global = true)]
    pub ws_base: Option<String>,

    /// API key id
    #[arg(long, global = true, env = "KALSHI_KEY_ID")]
    pub key_id: Option<String>,

    /// PEM file holding the RSA private key
    #[arg(long, global = true, env = "KALSHI_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Request ceiling per second
    #[arg(long, global = true, default_value_t = DEFAULT_RATE_LIMIT_PER_SECOND,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    /// Space requests evenly instead of allowing bursts up to the ceiling
    #[arg(long, global = true, default_value_t = false)]
    pub even_spacing: bool,

    /// Worker count: connection pool size and batch concurrency (max 20)
    #[arg(long, global = true, default_value_t = DEFAULT_WORKERS, value_parser = parse_workers)]
    pub workers: usize,

    /// Attempts per request on the retrying path (1-20)
    #[arg(long, global = true, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Signed GET against any trade API path
    Get(GetArgs),

    /// Collect every market or event into a JSON file, with checkpoints
    Collect(CollectArgs),

    /// Stream live messages to stdout as JSON lines
    Stream(StreamArgs),
}

impl Cli {
    /// Client settings from the global flags
    pub fn client_config(&self) -> ClientConfig {
        let policy = if self.even_spacing {
            RateLimitPolicy::EvenSpacing
        } else {
            RateLimitPolicy::Adaptive
        };

        let mut config = ClientConfig::new(self.env)
            .with_rate_limit(self.rate_limit, policy)
            .with_workers(self.workers)
            .with_retry(RetryPolicy {
                attempts: self.max_retries,
                ..RetryPolicy::default()
            });
        if let Some(url) = &self.api_base {
            config = config.with_http_base_url(url.clone());
        }
        if let Some(url) = &self.ws_base {
            config = config.with_ws_base_url(url.clone());
        }
        config
    }

    /// Read the key id and PEM file
    pub fn load_credentials(&self) -> Result<Arc<Credentials>, CliError> {
        let key_id = self.key_id.as_deref().ok_or_else(|| {
            CliError::ConfigurationError("missing --key-id (or KALSHI_KEY_ID)".to_string())
        })?;
        let key_file = self.key_file.as_ref().ok_or_else(|| {
            CliError::ConfigurationError("missing --key-file (or KALSHI_KEY_FILE)".to_string())
        })?;

        let pem = std::fs::read_to_string(key_file).map_err(|e| {
            CliError::ConfigurationError(format!(
                "failed to read key file {}: {e}",
                key_file.display()
            ))
        })?;
        Ok(Arc::new(Credentials::from_pem(key_id, &pem)?))
    }

    /// Shared REST client for one command
    pub fn build_client(&self) -> Result<Arc<KalshiHttpClient>, CliError> {
        let credentials = self.load_credentials()?;
        Ok(Arc::new(KalshiHttpClient::new(self.client_config(), credentials)?))
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

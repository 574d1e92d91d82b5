//! `get` command: one signed GET, response printed as JSON

use clap::Parser;
use tracing::info;

use super::{Cli, CliError, OutputFormat};
use crate::fetcher::environment::{api_path, API_PREFIX};
use crate::fetcher::{QueryParams, RequestDescriptor};

/// Parse a `key=value` query parameter
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid parameter '{s}', expected key=value"))?;
    if key.is_empty() {
        return Err(format!("invalid parameter '{s}', key is empty"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Full request path; short forms like `/markets` get the API prefix
pub fn resolve_path(path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    if path.starts_with(API_PREFIX) {
        path
    } else {
        api_path(&path)
    }
}

/// Arguments for `get`
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// API path, e.g. `/exchange/status` or `/trade-api/v2/markets/KXBTC`
    pub path: String,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "param", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Send once without retrying
    #[arg(long, default_value_t = false)]
    pub no_retry: bool,
}

impl GetArgs {
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let client = cli.build_client()?;
        let query: QueryParams = self.params.clone();
        let request = RequestDescriptor::get(resolve_path(&self.path)).with_query(query);

        info!(endpoint = %request.endpoint(), "Sending request");
        let response = if self.no_retry {
            client.execute(&request).await?
        } else {
            client.execute_with_retry(&request, cli.max_retries).await?
        };

        let rendered = match cli.output_format {
            OutputFormat::Json => serde_json::to_string(&response),
            OutputFormat::Human => serde_json::to_string_pretty(&response),
        }
        .map_err(|e| CliError::InvalidArgument(format!("unprintable response: {e}")))?;
        println!("{rendered}");
        Ok(())
    }
}

//! `stream` command: live messages to stdout

use clap::Parser;
use std::io::Write;
use tracing::info;

use super::{Cli, CliError};
use crate::shutdown::SharedShutdown;
use crate::stream::{HandlerError, StreamClient, StreamConfig};

/// Arguments for `stream`
#[derive(Parser, Debug)]
pub struct StreamArgs {
    /// Market tickers; none subscribes to every market
    pub tickers: Vec<String>,

    /// Channel to subscribe (repeatable)
    #[arg(long = "channel", default_value = "ticker")]
    pub channels: Vec<String>,

    /// Exit on the first disconnect instead of reconnecting
    #[arg(long, default_value_t = false)]
    pub no_reconnect: bool,
}

impl StreamArgs {
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let credentials = cli.load_credentials()?;
        let config = StreamConfig::from_client_config(&cli.client_config())
            .with_channels(self.channels.clone())
            .with_tickers(self.tickers.clone())
            .with_auto_reconnect(!self.no_reconnect);

        info!(url = %config.url, tickers = self.tickers.len(), "Starting stream");
        let client = StreamClient::new(config, credentials).with_shutdown(shutdown);
        client.add_message_handler(|message| {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{message}").map_err(|e| HandlerError::new(e.to_string()))
        });

        client.run().await?;
        Ok(())
    }
}

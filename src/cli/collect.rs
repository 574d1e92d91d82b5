//! `collect` command: bulk collection into a JSON file

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::{Cli, CliError, OutputFormat};
use crate::downloader::{
    BulkCollector, ChunkReport, CollectionJob, CollectionStatus, CollectionSummary,
    CollectorConfig,
};
use crate::fetcher::BatchFetcher;
use crate::output::JsonFileExporter;
use crate::shutdown::SharedShutdown;

/// What to collect
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CollectKind {
    Markets,
    Events,
}

/// Arguments for `collect`
#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// Collection to run
    #[arg(value_enum)]
    pub kind: CollectKind,

    /// Listing status filter, e.g. open, closed, settled
    #[arg(long)]
    pub status: Option<String>,

    /// Output JSON file
    #[arg(long, short)]
    pub output: PathBuf,

    /// Checkpoint file (default: `<output>.checkpoint.json`)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Continue from an existing checkpoint
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// Keys per detail-fetch chunk
    #[arg(long, default_value_t = crate::downloader::config::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Pause between chunks in milliseconds
    #[arg(long, default_value_t = 500)]
    pub chunk_delay_ms: u64,

    /// Keep the checkpoint after a successful export
    #[arg(long, default_value_t = false)]
    pub keep_checkpoint: bool,

    /// Indent the output file
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
}

/// `<output>.checkpoint.json` next to the output file
pub fn default_checkpoint_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "collection".into());
    name.push(".checkpoint.json");
    output.with_file_name(name)
}

impl CollectArgs {
    fn job(&self) -> CollectionJob {
        match self.kind {
            CollectKind::Markets => CollectionJob::markets(self.status.as_deref()),
            CollectKind::Events => CollectionJob::events(self.status.as_deref()),
        }
    }

    fn collector_config(&self) -> Result<CollectorConfig, CliError> {
        if self.chunk_size == 0 {
            return Err(CliError::InvalidArgument(
                "chunk size must be at least 1".to_string(),
            ));
        }
        let checkpoint = self
            .checkpoint
            .clone()
            .unwrap_or_else(|| default_checkpoint_path(&self.output));

        let mut config = CollectorConfig::new(checkpoint)
            .with_resume(self.resume)
            .with_chunk_size(self.chunk_size)
            .with_chunk_delay(Duration::from_millis(self.chunk_delay_ms));
        if self.keep_checkpoint {
            config = config.keep_checkpoint();
        }
        Ok(config)
    }

    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let job = self.job();
        let config = self.collector_config()?;
        let client = cli.build_client()?;
        let fetcher = BatchFetcher::new(client).with_retries(cli.max_retries);

        let progress = create_progress_bar(&job.name);
        let collector = BulkCollector::new(fetcher, config)
            .with_shutdown(shutdown)
            .on_chunk({
                let progress = progress.clone();
                Arc::new(move |report: &ChunkReport| {
                    progress.set_length(report.listed as u64);
                    progress.set_position((report.records + report.failed) as u64);
                    progress.set_message(format!(
                        "chunk {}/{} ({} failed)",
                        report.chunk + 1,
                        report.chunks,
                        report.failed
                    ));
                })
            });

        info!(job = %job.name, output = %self.output.display(), "Starting collection");
        let exporter = JsonFileExporter::new(&self.output).pretty(self.pretty);
        let result = collector.run(&job, &exporter).await;
        progress.finish_and_clear();

        let summary = result?;
        match cli.output_format {
            OutputFormat::Json => output_json(&job, &self.output, &summary),
            OutputFormat::Human => output_human(&job, &self.output, &summary),
        }

        match summary.status {
            CollectionStatus::Aborted { errors } => Err(CliError::CollectionAborted { errors }),
            CollectionStatus::Completed if !summary.export_confirmed => {
                Err(CliError::ExportFailed(self.output.display().to_string()))
            }
            CollectionStatus::Completed if summary.listing_truncated => {
                Err(CliError::ListingTruncated {
                    pages: summary.pages,
                })
            }
            _ => Ok(()),
        }
    }
}

fn output_json(job: &CollectionJob, output: &Path, summary: &CollectionSummary) {
    let report = serde_json::json!({
        "job": job.name,
        "status": summary.status.as_str(),
        "output_path": output.display().to_string(),
        "records": summary.records,
        "processed": summary.processed,
        "failed": summary.failed,
        "pages": summary.pages,
        "checkpoints_written": summary.checkpoints_written,
        "export_confirmed": summary.export_confirmed,
        "listing_truncated": summary.listing_truncated,
    });
    println!("{report}");
}

fn output_human(job: &CollectionJob, output: &Path, summary: &CollectionSummary) {
    match &summary.status {
        CollectionStatus::Completed => {
            println!("\nCollection {} completed", job.name);
            println!("Output: {}", output.display());
        }
        CollectionStatus::Interrupted => {
            println!("\nCollection {} interrupted; rerun with --resume to continue", job.name);
        }
        CollectionStatus::Aborted { errors } => {
            eprintln!("\nCollection {} aborted after {errors} consecutive errors", job.name);
            error!(job = %job.name, errors, "Collection aborted");
        }
    }
    println!("Records: {}", summary.records);
    println!("Pages listed: {}", summary.pages);
    if summary.listing_truncated {
        println!("Listing stopped at the page limit; some keys were not collected");
    }
    if !summary.failed.is_empty() {
        println!("Failed keys ({}):", summary.failed.len());
        for key in summary.failed.iter().take(20) {
            println!("  {key}");
        }
        if summary.failed.len() > 20 {
            println!("  ... and {} more", summary.failed.len() - 20);
        }
    }
}

fn create_progress_bar(job: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Collecting {job}"));
    pb
}

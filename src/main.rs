use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::{error, info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

use page_align::{Cli, DebugSink, ImageFiles, PageAligner, PageAlignment, Placement, PngDebugSink};

/// Output record for one page
#[derive(Debug, Serialize)]
struct PageReport {
    page: usize,
    width: u32,
    height: u32,
    skew_degrees: f64,
    skew_source: String,
    matched: usize,
    fallback: usize,
    placements: Vec<Placement>,
}

impl From<PageAlignment> for PageReport {
    fn from(alignment: PageAlignment) -> Self {
        Self {
            page: alignment.page,
            width: alignment.size.width,
            height: alignment.size.height,
            skew_degrees: alignment.skew.estimate.degrees_or_zero(),
            skew_source: format!("{:?}", alignment.skew.source),
            matched: alignment.matched,
            fallback: alignment.fallback,
            placements: alignment.placements,
        }
    }
}

fn log_subscriber(filter: EnvFilter, writer: NonBlocking) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

/// Page workers log through a background writer; keep the guard alive until
/// the last line should be flushed.
fn init_logging(verbose: bool) -> Result<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing::subscriber::set_global_default(log_subscriber(filter, writer))
        .context("Failed to install logger")?;
    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose)?;

    let config = cli.load_config().context("Failed to load configuration")?;

    let debug_sink = cli
        .debug_dir
        .as_ref()
        .map(PngDebugSink::new)
        .transpose()
        .with_context(|| format!("Failed to create debug directory: {:?}", cli.debug_dir))?;

    let files = ImageFiles::new(cli.pages.clone());
    let aligner = PageAligner::new(&files, &files, &files, &config)
        .with_debug_sink(debug_sink.as_ref().map(|s| s as &dyn DebugSink));

    info!(pages = files.len(), "Aligning document");

    let mut reports = Vec::with_capacity(files.len());
    let mut failures = 0usize;
    aligner.align_document(files.len(), |page, result| match result {
        Ok(alignment) => reports.push(PageReport::from(alignment)),
        Err(e) => {
            error!(page, "Page failed: {}", e);
            failures += 1;
        }
    });

    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output: {:?}", path))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    serde_json::to_writer_pretty(&mut writer, &reports).context("Failed to write placements")?;
    writeln!(writer)?;
    writer.flush()?;

    if let Some(path) = &cli.output {
        info!("Saved placements: {:?}", path);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} page(s) failed", failures, files.len());
    }
    Ok(())
}

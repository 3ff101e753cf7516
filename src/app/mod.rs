//! Binary-side orchestration: config layering, input collection, the batch
//! run and the completion summary.

mod input;
mod progress_ui;
mod signal;
pub(crate) mod terminal;

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bulkfetch_core::{
    BatchReport, DownloadConfig, DownloadEngine, HttpClient, OutputDir, ProgressReporter,
};
use tracing::{debug, info};

use crate::cli::Args;
use progress_ui::SpinnerObserver;

/// How the process should exit once the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Batch drained (or nothing to do).
    Success,
    /// `--fail-on-error` was set and some transfer failed.
    Failure,
    /// Stopped by ctrl-c.
    Interrupted,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Interrupted => ExitCode::from(130),
        }
    }
}

/// Exit code for errors raised before the batch started.
pub(crate) const SETUP_ERROR_EXIT: u8 = 2;

/// Runs one bulk download. Errors are setup failures; transfer failures
/// only show up in the summary and the returned [`ProcessExit`].
pub(crate) async fn run(args: Args) -> Result<ProcessExit> {
    let config = resolve_config(&args)?;
    debug!(?config, "effective configuration");

    let client = HttpClient::from_config(&config).context("failed to build HTTP client")?;
    let urls = input::collect_urls(&args, client.inner()).await?;

    if urls.is_empty() {
        info!("No input provided. Pass URLs as arguments, --input-file, --listing-url, or stdin.");
        info!("Example: echo 'https://example.com/data/file-t3.nc' | bulkfetch");
        return Ok(ProcessExit::Success);
    }

    let engine = DownloadEngine::from_config(&config)?;
    let sink = Arc::new(
        OutputDir::reset(&config.output_dir)
            .await
            .context("failed to prepare output directory")?,
    );

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        args.quiet,
        args.no_progress,
        terminal::is_dumb_terminal(),
    );
    let spinner = Arc::new(SpinnerObserver::new(use_spinner, urls.len()));
    let reporter =
        Arc::new(ProgressReporter::new(config.log_threshold).with_observer(spinner.clone()));

    let interrupt = signal::cancel_on_ctrl_c(engine.cancellation_token());
    let report = engine.run_batch(urls, &client, sink, reporter).await;
    interrupt.abort();
    spinner.finish();

    print_summary(&report);

    Ok(exit_for(&report, args.fail_on_error))
}

/// Defaults, then the config file, then command-line flags; validated.
fn resolve_config(args: &Args) -> Result<DownloadConfig> {
    let file_config = DownloadConfig::load(args.config.as_deref())?;
    let config = args.apply_to(file_config);
    config.validate()?;
    Ok(config)
}

fn exit_for(report: &BatchReport, fail_on_error: bool) -> ProcessExit {
    if report.was_cancelled() {
        ProcessExit::Interrupted
    } else if fail_on_error && report.failed() > 0 {
        ProcessExit::Failure
    } else {
        ProcessExit::Success
    }
}

#[allow(clippy::print_stdout)]
fn print_summary(report: &BatchReport) {
    println!(
        "{} succeeded, {} failed ({} bytes)",
        report.succeeded(),
        report.failed(),
        report.stats().bytes()
    );
    for failure in report.failures() {
        if let Some(error) = failure.error() {
            println!("  [{}] {}: {error}", error.kind().as_str(), failure.url());
        }
    }
}

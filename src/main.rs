//! Report Aggregator - combine test reports into one static dashboard
//!
//! A CLI tool that finds JSON test reports with a glob, copies a pre-built
//! dashboard into an output directory, and writes the `sources.json`
//! manifest the dashboard reads.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Invalid arguments, cancelled builder, or failed aggregation

mod build_command;
mod bundle;
mod cli;
mod config;
mod errors;
mod locator;
mod models;
mod pipeline;

use anyhow::{Context, Result};
use cli::{Args, Mode};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use models::{AggregateEvent, Options, Progress, Request};
use pipeline::{Aggregator, AggregatorSettings};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    init_logging(&args);

    println!("{}", style("Report Aggregator").bold());
    println!("{}", cli::version_notice(env!("CARGO_PKG_VERSION")));
    debug!("Arguments: {:?}", args);

    let mode = match args.validate() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            eprintln!("Use the {} flag to see the available options", style("--help").bold());
            eprintln!("{}", style("¯\\_(ツ)_/¯").red().bold());
            std::process::exit(1);
        }
    };

    match mode {
        Mode::Build => handle_build().await,
        Mode::Aggregate(request) => {
            let code = run_aggregation(&args, request).await?;
            std::process::exit(code);
        }
    }
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Handle --build: ask questions and print the resulting command.
async fn handle_build() -> Result<()> {
    let built = tokio::task::spawn_blocking(|| {
        let mut prompter = build_command::TerminalPrompter::new()?;
        build_command::run_builder(&mut prompter)
    })
    .await
    .context("Command builder crashed")??;

    match built {
        Some(built) => {
            println!(
                "\n✅ Your command is:\n\n   {}\n",
                style(built.command_line()).cyan()
            );
            println!("You're all set!");
            Ok(())
        }
        None => {
            println!("🚧 Cancelled. Exiting...");
            std::process::exit(1);
        }
    }
}

/// Run the pipeline with a spinner. Returns the exit code.
async fn run_aggregation(args: &Args, request: Request) -> Result<i32> {
    println!("Building using:");
    for (name, value) in args.provided() {
        println!("   {}: {}", name, style(value).cyan());
    }

    let settings = AggregatorSettings {
        shell_dir: args.shell_dir.clone(),
        config_timeout: args.config_timeout(),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let aggregator = Aggregator::new(request, settings).with_event_channel(tx);

    let spinner = new_spinner(args.quiet);
    let watcher = tokio::spawn(watch_progress(rx, spinner));

    let result = aggregator.aggregate().await;
    // Closing the channel lets the watcher finish.
    drop(aggregator);
    watcher.await.context("Progress watcher crashed")?;

    match result {
        Some(options) => {
            println!(
                "\n✅ Report aggregated into {}",
                options.output_dir.display()
            );
            println!("   Manifest: {}", options.manifest_path().display());
            if options.open {
                if let Err(e) = open_bundle(&options).await {
                    error!("Failed to open report: {:#}", e);
                    eprintln!("\n❌ Error: {:#}", e);
                    return Ok(1);
                }
            }
            println!("All done!");
            Ok(0)
        }
        None => Ok(1),
    }
}

fn new_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Aggregating report: 0%");
    pb
}

/// Drive the spinner from pipeline events until the channel closes.
async fn watch_progress(mut rx: mpsc::UnboundedReceiver<AggregateEvent>, spinner: ProgressBar) {
    while let Some(event) = rx.recv().await {
        match event {
            AggregateEvent::Progress(Progress::Complete) => {
                spinner.finish_with_message("Report aggregated!");
            }
            AggregateEvent::Progress(progress) => {
                spinner.set_message(format!("Building aggregated report: {}", progress));
            }
            AggregateEvent::Failed(err) => {
                spinner.abandon_with_message("Failed to build aggregated report");
                debug!("Failed stage {}: {:?}", err.stage(), err.cause());
                eprintln!("\n❌ {}", style(&err).red().bold());
                eprintln!("{}", style("Exited with error code: 1").red().bold());
            }
        }
    }
}

/// Open the bundle's entry page with the platform's opener.
async fn open_bundle(options: &Options) -> Result<()> {
    let index = options.index_path();
    info!("Opening aggregated report: {}", index.display());
    println!("Opening aggregated report...");

    let status = opener_command(&index)
        .status()
        .await
        .with_context(|| format!("Failed to launch opener for {}", index.display()))?;

    if !status.success() {
        anyhow::bail!("Opener exited with {} for {}", status, index.display());
    }
    Ok(())
}

fn opener_command(target: &Path) -> tokio::process::Command {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = tokio::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else if cfg!(target_os = "macos") {
        tokio::process::Command::new("open")
    } else {
        tokio::process::Command::new("xdg-open")
    };
    cmd.arg(target);
    cmd
}

//! Command-line interface argument parsing.
//!
//! This module handles CLI argument parsing using clap and turns the parsed
//! flags into one of the supported run modes.

use crate::bundle::DEFAULT_SHELL_DIR;
use crate::models::{Options, Request};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Report Aggregator - combine test-report JSON files into one dashboard
///
/// Finds JSON reports with a glob, copies the dashboard next to them, and
/// writes a `sources.json` manifest the dashboard reads.
///
/// Examples:
///   report-aggregator --sources "./reports/**/*.json" --output ./bundle
///   report-aggregator -s "./reports/**/*.json" -o ./bundle --include-html --open
///   report-aggregator --config ./aggregator.config.sh
///   report-aggregator --build
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the config file
    ///
    /// Either a `.toml` file or an executable that prints
    /// `{"cfg": {...}}` or `{"error": "..."}` on stdout.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Glob to use to find JSON reports to aggregate
    #[arg(short, long, value_name = "GLOB")]
    pub sources: Option<String>,

    /// Output directory to write the aggregated report to
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Use the command builder to help you write the command
    #[arg(short, long)]
    pub build: bool,

    /// Open the aggregated report after building
    #[arg(short = 'O', long)]
    pub open: bool,

    /// Include HTML reports found alongside the JSON reports
    #[arg(short = 'I', long)]
    pub include_html: bool,

    /// Directory holding the pre-built dashboard
    #[arg(
        long,
        value_name = "DIR",
        default_value = DEFAULT_SHELL_DIR,
        env = "REPORT_AGGREGATOR_SHELL_DIR"
    )]
    pub shell_dir: PathBuf,

    /// Seconds a config module may take before it is killed
    #[arg(long, value_name = "SECS", default_value = "30")]
    pub config_timeout: u64,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// What the user asked the tool to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Interactive command builder.
    Build,
    /// Build a bundle.
    Aggregate(Request),
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments and pick the run mode.
    ///
    /// Exactly one of these groups is accepted:
    /// `--config`, `--build`, or `--sources` + `--output`
    /// (optionally with `--open` and `--include-html`).
    pub fn validate(&self) -> Result<Mode, String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.config_timeout == 0 {
            return Err("Config timeout must be at least 1 second".to_string());
        }

        let direct_flags = self.sources.is_some()
            || self.output.is_some()
            || self.open
            || self.include_html;

        if self.config.is_none() && !self.build && !direct_flags {
            return Err("No options provided.".to_string());
        }

        match (&self.config, self.build, &self.sources, &self.output) {
            (Some(config), false, None, None) if !self.open && !self.include_html => {
                Ok(Mode::Aggregate(Request::Config(config.clone())))
            }
            (None, true, None, None) if !self.open && !self.include_html => Ok(Mode::Build),
            (None, false, Some(sources), Some(output)) => {
                let mut options = Options::new(sources.clone(), output.clone());
                options.include_html = self.include_html;
                options.open = self.open;
                Ok(Mode::Aggregate(Request::Direct(options)))
            }
            _ => Err("Invalid options provided. Please provide either a configuration file, \
                      sources and output, or use the build command."
                .to_string()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    pub fn config_timeout(&self) -> Duration {
        Duration::from_secs(self.config_timeout)
    }

    /// The options the user actually passed, for display.
    pub fn provided(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();

        if let Some(ref config) = self.config {
            out.push(("config", config.display().to_string()));
        }
        if let Some(ref sources) = self.sources {
            out.push(("sources", sources.clone()));
        }
        if let Some(ref output) = self.output {
            out.push(("output", output.display().to_string()));
        }
        if self.open {
            out.push(("open", "yes".to_string()));
        }
        if self.include_html {
            out.push(("includeHtml", "yes".to_string()));
        }

        out
    }
}

/// Describe how stable a version string is.
///
/// Pre-releases (`-alpha.N`, `-beta.N`, `-rc.N`) and `0.x` versions come
/// with a caution.
pub fn version_notice(version: &str) -> String {
    let (release, pre_release) = match version.split_once('-') {
        Some((release, pre)) => (release, Some(pre)),
        None => (version, None),
    };

    if let Some(pre) = pre_release {
        let (name, number) = pre.split_once('.').unwrap_or((pre, ""));
        let kind = match name {
            "alpha" => "This is an alpha version.",
            "beta" => "This is a beta version.",
            "rc" => "This is a release candidate version.",
            _ => "This is a pre-release version.",
        };
        let shown = if number.is_empty() {
            format!("{}-{}", release, name)
        } else {
            format!("{}-{}.{}", release, name, number)
        };
        return format!("🚧 Version: {}. {} Use with caution 🚧", shown, kind);
    }

    if release.split('.').next() == Some("0") {
        format!(
            "🚧 Version: {}. This has yet to be stabilized. Use with caution 🚧",
            release
        )
    } else {
        format!("Version: {}", release)
    }
}

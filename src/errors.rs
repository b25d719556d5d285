//! Error types for each pipeline stage.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while resolving a configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load {}: {reason}", path.display())]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("{0}")]
    Execution(String),

    #[error("Failed to run configuration in an isolated process: {0}")]
    Isolation(#[source] io::Error),

    #[error("Configuration {} did not answer within {seconds}s", path.display())]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("Configuration sent an unreadable message: {0}")]
    Protocol(String),
}

/// Failures while discovering reports.
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Cannot read {}: {}", .0.path().display(), .0.error())]
    Walk(#[from] glob::GlobError),

    #[error("Cannot check for {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Report discovery task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures while writing the bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Cannot create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Dashboard assets not found at {}", path.display())]
    MissingShell { path: PathBuf },

    #[error("Cannot copy {}: {source}", path.display())]
    CopyShell {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cannot write {}: {source}", path.display())]
    WriteManifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Dashboard copy task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Any stage failure.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// Pipeline stage at which a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveConfig,
    PrepareOutput,
    CopyShell,
    LocateReports,
    WriteManifest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ResolveConfig => write!(f, "resolve configuration"),
            Stage::PrepareOutput => write!(f, "prepare output directory"),
            Stage::CopyShell => write!(f, "copy dashboard"),
            Stage::LocateReports => write!(f, "locate reports"),
            Stage::WriteManifest => write!(f, "write manifest"),
        }
    }
}

/// The single error reported for a failed run.
#[derive(Debug, Error)]
#[error("Failed to generate: {source}")]
pub struct AggregationError {
    stage: Stage,
    #[source]
    source: StageError,
}

impl AggregationError {
    pub fn new(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The underlying stage failure.
    pub fn cause(&self) -> &StageError {
        &self.source
    }
}

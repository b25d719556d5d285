//! The aggregation pipeline.
//!
//! A run moves strictly forward through its stages:
//!
//! ```text
//! START -> (config resolved) -> dir ready -> shell copied
//!       -> reports located -> manifest written -> DONE
//! ```
//!
//! Any stage may fail instead, which ends the run with a single
//! [`AggregateEvent::Failed`].

use crate::bundle;
use crate::config::{self, DEFAULT_CONFIG_TIMEOUT};
use crate::errors::{AggregationError, Stage};
use crate::locator;
use crate::models::{AggregateEvent, Manifest, Options, Progress, Request};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Environment-dependent settings that are not part of the request.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// Directory holding the pre-built dashboard.
    pub shell_dir: PathBuf,
    /// How long a configuration module may take to answer.
    pub config_timeout: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            shell_dir: PathBuf::from(bundle::DEFAULT_SHELL_DIR),
            config_timeout: DEFAULT_CONFIG_TIMEOUT,
        }
    }
}

/// Builds one bundle from one request.
pub struct Aggregator {
    request: Request,
    settings: AggregatorSettings,
    event_tx: Option<mpsc::UnboundedSender<AggregateEvent>>,
}

impl Aggregator {
    /// Create an aggregator. Nothing touches the filesystem until
    /// [`Aggregator::aggregate`] is called.
    pub fn new(request: Request, settings: AggregatorSettings) -> Self {
        Self {
            request,
            settings,
            event_tx: None,
        }
    }

    /// Attach a channel that receives progress and failure events.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<AggregateEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: AggregateEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn progress(&self, progress: Progress) {
        debug!("Progress: {}", progress);
        self.emit(AggregateEvent::Progress(progress));
    }

    fn fail(&self, err: AggregationError) {
        error!("Aggregation failed at '{}': {}", err.stage(), err);
        self.emit(AggregateEvent::Failed(err));
    }

    /// Run the pipeline once.
    ///
    /// Returns the effective options when the bundle was written, `None`
    /// after a failure. Failures are reported through the event channel and
    /// never escape as errors or panics.
    pub async fn aggregate(&self) -> Option<Options> {
        self.progress(Progress::Started);

        match self.run().await {
            Ok(options) => {
                self.progress(Progress::Complete);
                Some(options)
            }
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    /// Every stage up to and including the manifest write.
    async fn run(&self) -> Result<Options, AggregationError> {
        let options =
            config::resolve_effective_options(&self.request, self.settings.config_timeout)
                .await
                .map_err(|e| AggregationError::new(Stage::ResolveConfig, e))?;

        info!(
            "Aggregating {} into {}",
            options.source_glob,
            options.output_dir.display()
        );

        bundle::prepare_output_dir(&options.output_dir)
            .await
            .map_err(|e| AggregationError::new(Stage::PrepareOutput, e))?;

        bundle::copy_shell(&self.settings.shell_dir, &options.output_dir)
            .await
            .map_err(|e| AggregationError::new(Stage::CopyShell, e))?;

        self.progress(Progress::BundleReady);

        let entries = locator::locate_reports(&options.source_glob, options.include_html)
            .await
            .map_err(|e| AggregationError::new(Stage::LocateReports, e))?;

        self.progress(Progress::ReportsLocated);

        let manifest = Manifest::from(entries);
        if manifest.is_empty() {
            info!("No reports matched {}", options.source_glob);
        }

        bundle::write_manifest(&options.output_dir, &manifest)
            .await
            .map_err(|e| AggregationError::new(Stage::WriteManifest, e))?;

        info!(
            "Aggregated {} reports ({} with HTML)",
            manifest.len(),
            manifest.html_count()
        );

        Ok(options)
    }
}

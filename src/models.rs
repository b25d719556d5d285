//! Data models for the report aggregator.
//!
//! This module contains the core data structures shared by the pipeline
//! stages: the aggregation request, the effective options, the manifest
//! entries written to `sources.json`, and the events streamed to callers.

use crate::errors::AggregationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The effective options for one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Glob used to find the JSON reports.
    #[serde(alias = "sources", alias = "source_glob")]
    pub source_glob: String,

    /// Directory the bundle is written to.
    #[serde(alias = "output", alias = "output_dir")]
    pub output_dir: PathBuf,

    /// Attach a sibling `index.html` to each report when one exists.
    #[serde(default, alias = "include_html")]
    pub include_html: bool,

    /// Open the bundle once it is built.
    #[serde(default)]
    pub open: bool,
}

impl Options {
    /// Creates options for a direct run with HTML pairing and opening disabled.
    pub fn new(source_glob: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_glob: source_glob.into(),
            output_dir: output_dir.into(),
            include_html: false,
            open: false,
        }
    }

    /// Path of the manifest inside the output directory.
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE)
    }

    /// Path of the dashboard entry point inside the output directory.
    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join("index.html")
    }
}

/// Name of the manifest file inside a bundle.
pub const MANIFEST_FILE: &str = "sources.json";

/// How a run obtains its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Options come from a configuration module.
    Config(PathBuf),
    /// Options were supplied directly by the caller.
    Direct(Options),
}

/// A single discovered report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Path to the JSON report, as discovered.
    pub json: PathBuf,
    /// Sibling HTML report, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<PathBuf>,
}

impl ReportEntry {
    /// Creates an entry with no HTML rendering.
    pub fn json_only(json: impl Into<PathBuf>) -> Self {
        Self {
            json: json.into(),
            html: None,
        }
    }
}

/// Ordered list of reports; serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ReportEntry>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries paired with an HTML report.
    pub fn html_count(&self) -> usize {
        self.entries.iter().filter(|e| e.html.is_some()).count()
    }
}

impl From<Vec<ReportEntry>> for Manifest {
    fn from(entries: Vec<ReportEntry>) -> Self {
        Self { entries }
    }
}

/// Progress milestone of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Progress {
    /// Run started.
    Started,
    /// Output directory exists and the dashboard shell is in place.
    BundleReady,
    /// Reports have been located.
    ReportsLocated,
    /// Manifest written; the run is done.
    Complete,
}

impl Progress {
    /// Returns the milestone as a percentage.
    pub fn percent(&self) -> u8 {
        match self {
            Progress::Started => 0,
            Progress::BundleReady => 25,
            Progress::ReportsLocated => 50,
            Progress::Complete => 100,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Messages sent from the pipeline to whoever is watching the run.
#[derive(Debug)]
pub enum AggregateEvent {
    /// A milestone was reached.
    Progress(Progress),
    /// The run failed. Always the last event of a run.
    Failed(AggregationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_html_has_only_json_key() {
        let entry = ReportEntry::json_only("reports/a/report.json");
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value, serde_json::json!({ "json": "reports/a/report.json" }));
    }

    #[test]
    fn test_manifest_serializes_as_array() {
        let manifest = Manifest::from(vec![
            ReportEntry::json_only("a.json"),
            ReportEntry {
                json: PathBuf::from("b/report.json"),
                html: Some(PathBuf::from("b/index.html")),
            },
        ]);

        let out = serde_json::to_string(&manifest).unwrap();
        assert_eq!(
            out,
            r#"[{"json":"a.json"},{"json":"b/report.json","html":"b/index.html"}]"#
        );
        assert_eq!(manifest.html_count(), 1);
    }

    #[test]
    fn test_options_accept_camel_case_and_short_keys() {
        let camel: Options =
            serde_json::from_str(r#"{"sourceGlob":"r/*.json","outputDir":"out","includeHtml":true}"#)
                .unwrap();
        let short: Options =
            serde_json::from_str(r#"{"sources":"r/*.json","output":"out","includeHtml":true}"#)
                .unwrap();

        assert_eq!(camel, short);
        assert!(camel.include_html);
        assert!(!camel.open);
    }

    #[test]
    fn test_progress_percentages_are_increasing() {
        let milestones = [
            Progress::Started,
            Progress::BundleReady,
            Progress::ReportsLocated,
            Progress::Complete,
        ];
        let percents: Vec<u8> = milestones.iter().map(Progress::percent).collect();

        assert_eq!(percents, vec![0, 25, 50, 100]);
        assert_eq!(Progress::BundleReady.to_string(), "25%");
    }
}

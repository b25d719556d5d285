//! Report discovery.
//!
//! This module expands the user's glob into an ordered list of JSON reports
//! and optionally pairs each one with the `index.html` sitting next to it.

use crate::errors::LocatorError;
use crate::models::ReportEntry;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the HTML rendering that may sit beside a JSON report.
pub const HTML_REPORT_FILE: &str = "index.html";

/// Find every report matching `pattern`, in discovery order.
pub async fn locate_reports(
    pattern: &str,
    include_html: bool,
) -> Result<Vec<ReportEntry>, LocatorError> {
    let owned = pattern.to_string();
    let reports = tokio::task::spawn_blocking(move || find_report_files(&owned)).await??;

    debug!("Pattern {} matched {} reports", pattern, reports.len());

    if !include_html {
        return Ok(reports.into_iter().map(ReportEntry::json_only).collect());
    }

    let mut entries = Vec::with_capacity(reports.len());
    for json in reports {
        let html = sibling_html(&json).await?;
        entries.push(ReportEntry { json, html });
    }

    Ok(entries)
}

/// Expand a pattern (with brace alternatives) into matching files.
/// Blocks on filesystem access.
///
/// Alternatives are matched left to right; a file matched twice keeps its
/// first position.
pub fn find_report_files(pattern: &str) -> Result<Vec<PathBuf>, LocatorError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for alternative in expand_braces(pattern) {
        let paths = glob::glob(&alternative).map_err(|source| LocatorError::Pattern {
            pattern: alternative.clone(),
            source,
        })?;

        for entry in paths {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Expand `{a,b}` alternatives into separate patterns.
///
/// Nested groups are supported. An unmatched `{` is left as-is.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close)) = find_brace_group(pattern) else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let body = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    split_alternatives(body)
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{}{}{}", prefix, alt, suffix)))
        .collect()
}

/// Locate the first top-level `{...}` group.
fn find_brace_group(pattern: &str) -> Option<(usize, usize)> {
    let open = pattern.find('{')?;
    let mut depth = 0usize;

    for (i, c) in pattern[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((open, open + i));
                }
            }
            _ => {}
        }
    }

    None
}

/// Split a group body on commas that are not inside a nested group.
fn split_alternatives(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);

    parts
}

/// Probe for an `index.html` next to a JSON report.
async fn sibling_html(json: &Path) -> Result<Option<PathBuf>, LocatorError> {
    let candidate = match json.parent() {
        Some(dir) => dir.join(HTML_REPORT_FILE),
        None => PathBuf::from(HTML_REPORT_FILE),
    };

    match tokio::fs::metadata(&candidate).await {
        Ok(meta) if meta.is_file() => Ok(Some(candidate)),
        Ok(_) => Ok(None),
        Err(e) if is_absent(&e) => Ok(None),
        Err(source) => Err(LocatorError::Probe {
            path: candidate,
            source,
        }),
    }
}

/// Errors that mean "there is no such file" rather than a broken environment.
fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

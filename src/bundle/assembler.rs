//! Bundle assembly: output directory, dashboard shell, and manifest.

use crate::errors::BundleError;
use crate::models::{Manifest, MANIFEST_FILE};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Default location of the pre-built dashboard, relative to the working directory.
pub const DEFAULT_SHELL_DIR: &str = "app/build";

/// Create the output directory (and parents). An existing directory is fine.
pub async fn prepare_output_dir(dir: &Path) -> Result<(), BundleError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| BundleError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

    debug!("Output directory ready: {}", dir.display());
    Ok(())
}

/// Copy every file of the dashboard shell into the output directory,
/// overwriting files with the same name. Returns the number of files copied.
pub async fn copy_shell(shell_dir: &Path, output_dir: &Path) -> Result<usize, BundleError> {
    let missing = match tokio::fs::metadata(shell_dir).await {
        Ok(meta) => !meta.is_dir(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(source) => {
            return Err(BundleError::CopyShell {
                path: shell_dir.to_path_buf(),
                source,
            })
        }
    };
    if missing {
        return Err(BundleError::MissingShell {
            path: shell_dir.to_path_buf(),
        });
    }

    let (from, to) = (shell_dir.to_path_buf(), output_dir.to_path_buf());
    let plan = tokio::task::spawn_blocking(move || plan_copy(&from, &to)).await??;
    let mut copied = 0;

    for item in plan {
        match item {
            CopyItem::Dir(target) => {
                tokio::fs::create_dir_all(&target)
                    .await
                    .map_err(|source| BundleError::CopyShell {
                        path: target,
                        source,
                    })?;
            }
            CopyItem::File { from, to } => {
                tokio::fs::copy(&from, &to)
                    .await
                    .map_err(|source| BundleError::CopyShell { path: from, source })?;
                copied += 1;
            }
        }
    }

    info!(
        "Copied {} dashboard files from {}",
        copied,
        shell_dir.display()
    );
    Ok(copied)
}

enum CopyItem {
    Dir(PathBuf),
    File { from: PathBuf, to: PathBuf },
}

/// Walk the shell directory and map each entry to its destination.
/// Directories always come before their contents. Blocks on filesystem access.
fn plan_copy(shell_dir: &Path, output_dir: &Path) -> Result<Vec<CopyItem>, BundleError> {
    let mut plan = Vec::new();

    for entry in WalkDir::new(shell_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| shell_dir.to_path_buf());
            BundleError::CopyShell {
                path,
                source: e.into(),
            }
        })?;

        let rel = entry
            .path()
            .strip_prefix(shell_dir)
            .unwrap_or(entry.path());
        let target = output_dir.join(rel);

        if entry.file_type().is_dir() {
            plan.push(CopyItem::Dir(target));
        } else {
            plan.push(CopyItem::File {
                from: entry.path().to_path_buf(),
                to: target,
            });
        }
    }

    Ok(plan)
}

/// Serialize the manifest and write it as `sources.json`.
pub async fn write_manifest(output_dir: &Path, manifest: &Manifest) -> Result<PathBuf, BundleError> {
    let path = output_dir.join(MANIFEST_FILE);
    let body = serde_json::to_vec(manifest)?;

    tokio::fs::write(&path, body)
        .await
        .map_err(|source| BundleError::WriteManifest {
            path: path.clone(),
            source,
        })?;

    info!(
        "Wrote manifest with {} reports to {}",
        manifest.len(),
        path.display()
    );
    Ok(path)
}

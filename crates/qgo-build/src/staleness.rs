//! Artifact staleness checks
//!
//! A build is current when the artifact's modification time is strictly
//! later than that of every tracked source file (`*.go`, `go.mod`, `go.sum`)
//! and of every extra input such as the manifest the build was configured
//! from. Any I/O failure while checking is treated as "stale".

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Outcome of a staleness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(StaleReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The artifact does not exist yet
    MissingOutput,
    /// This source file is at least as new as the artifact
    SourceChanged(PathBuf),
    /// The check itself failed
    Unknown(String),
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

fn is_tracked(path: &Path) -> bool {
    let ext_go = path.extension().is_some_and(|ext| ext == "go");
    let module_file = path
        .file_name()
        .is_some_and(|name| name == "go.mod" || name == "go.sum");
    ext_go || module_file
}

/// Most recently modified tracked source under `root`.
///
/// Hidden directories and `exclude` (the output directory) are skipped.
pub fn last_change(root: &Path, exclude: &Path) -> std::io::Result<Option<(PathBuf, SystemTime)>> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        !entry.file_name().to_string_lossy().starts_with('.') && entry.path() != exclude
    });

    let mut latest: Option<(PathBuf, SystemTime)> = None;
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || !is_tracked(entry.path()) {
            continue;
        }

        let modified = entry.metadata().map_err(std::io::Error::from)?.modified()?;
        if latest.as_ref().map_or(true, |(_, time)| modified > *time) {
            latest = Some((entry.into_path(), modified));
        }
    }
    Ok(latest)
}

/// Compare `output` against the tracked sources under `root` and the
/// `extra` input files. A missing extra file is ignored.
pub fn check(output: &Path, root: &Path, exclude: &Path, extra: &[PathBuf]) -> Freshness {
    let built = match std::fs::metadata(output) {
        Ok(meta) => match meta.modified() {
            Ok(time) => time,
            Err(e) => return Freshness::Stale(StaleReason::Unknown(e.to_string())),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Freshness::Stale(StaleReason::MissingOutput)
        }
        Err(e) => return Freshness::Stale(StaleReason::Unknown(e.to_string())),
    };

    for input in extra {
        match std::fs::metadata(input).and_then(|meta| meta.modified()) {
            Ok(changed) if changed >= built => {
                return Freshness::Stale(StaleReason::SourceChanged(input.clone()))
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Freshness::Stale(StaleReason::Unknown(e.to_string())),
        }
    }

    match last_change(root, exclude) {
        Ok(Some((source, changed))) if changed >= built => {
            Freshness::Stale(StaleReason::SourceChanged(source))
        }
        Ok(_) => Freshness::Fresh,
        Err(e) => {
            tracing::warn!(root = %root.display(), error = %e, "staleness check failed");
            Freshness::Stale(StaleReason::Unknown(e.to_string()))
        }
    }
}

//! Output root removal.
//!
//! Force semantics: a missing directory is a no-op, and when a recursive
//! delete fails the tree is walked entry by entry, skipping what cannot be
//! removed.

use crate::build::pipeline::{Job, PipelineError};
use crate::build::result::{FileFailure, TaskResult};
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Job name of the clean step
pub const CLEAN: &str = "clean";

/// Error during clean.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CleanError {
    /// The target would delete a protected directory
    #[error("refusing to delete '{}': it contains '{}'", .target.display(), .protected.display())]
    Unsafe { target: PathBuf, protected: PathBuf },
}

/// Summary of a clean run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    /// The directory existed and was (at least partly) removed
    pub removed: bool,
    /// Entries that could not be removed
    pub skipped: Vec<FileFailure>,
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Check that deleting `target` cannot take any of `protected` with it.
pub fn check_target(target: &Path, protected: &[PathBuf]) -> Result<(), CleanError> {
    let target_norm = normalize(target);
    for dir in protected {
        if normalize(dir).starts_with(&target_norm) {
            return Err(CleanError::Unsafe { target: target.to_path_buf(), protected: dir.clone() });
        }
    }
    Ok(())
}

/// Delete `target` recursively.
pub fn clean(target: &Path, protected: &[PathBuf]) -> Result<CleanReport, CleanError> {
    check_target(target, protected)?;

    match fs::remove_dir_all(target) {
        Ok(()) => Ok(CleanReport { removed: true, skipped: vec![] }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %target.display(), "nothing to clean");
            Ok(CleanReport::default())
        }
        Err(e) => {
            tracing::warn!(path = %target.display(), error = %e, "recursive delete failed, removing entries one by one");
            let mut skipped = Vec::new();
            force_remove(target, &mut skipped);
            Ok(CleanReport { removed: true, skipped })
        }
    }
}

fn force_remove(path: &Path, skipped: &mut Vec<FileFailure>) {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => return skip(path, e, skipped),
    };

    if meta.is_dir() {
        match fs::read_dir(path) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    force_remove(&entry.path(), skipped);
                }
            }
            Err(e) => return skip(path, e, skipped),
        }
        if let Err(e) = fs::remove_dir(path) {
            // A non-empty directory here is already reported by its children.
            if e.kind() != io::ErrorKind::NotFound && !has_skipped_child(path, skipped) {
                skip(path, e, skipped);
            }
        }
    } else if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            skip(path, e, skipped);
        }
    }
}

fn has_skipped_child(dir: &Path, skipped: &[FileFailure]) -> bool {
    skipped.iter().any(|f| f.path.starts_with(dir) && f.path != dir)
}

fn skip(path: &Path, error: io::Error, skipped: &mut Vec<FileFailure>) {
    tracing::warn!(path = %path.display(), error = %error, "cannot remove, skipping");
    skipped.push(FileFailure::new(path, error));
}

/// Pipeline job cleaning the output root.
#[derive(Debug, Clone)]
pub struct CleanJob {
    target: PathBuf,
    protected: Vec<PathBuf>,
}

impl CleanJob {
    /// Clean `target`, refusing if it equals or contains a protected path.
    pub fn new(target: impl Into<PathBuf>, protected: Vec<PathBuf>) -> Self {
        Self { target: target.into(), protected }
    }
}

#[async_trait]
impl Job for CleanJob {
    fn name(&self) -> &str {
        CLEAN
    }

    async fn run(&self) -> Result<TaskResult, PipelineError> {
        let start = Instant::now();
        let job = self.clone();
        let report = tokio::task::spawn_blocking(move || clean(&job.target, &job.protected))
            .await
            .map_err(|e| PipelineError::job(CLEAN, e))?
            .map_err(|e| PipelineError::job(CLEAN, e))?;

        tracing::info!(
            path = %self.target.display(),
            removed = report.removed,
            skipped = report.skipped.len(),
            "cleaned"
        );
        Ok(TaskResult::success(CLEAN, vec![], start.elapsed()))
    }
}

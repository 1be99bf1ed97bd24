//! Build result types.
//!
//! Contains types for representing the outcome of build operations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Status of a single task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Task succeeded
    Success,
    /// Task failed with error
    Failed(String),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// A single source file that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Offending source file
    pub path: PathBuf,
    /// Diagnostic from the failing step
    pub message: String,
}

impl FileFailure {
    pub fn new(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self { path: path.into(), message: message.to_string() }
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Result of running a single task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that ran
    pub task: String,
    /// Task status
    pub status: BuildStatus,
    /// Output files written
    pub outputs: Vec<PathBuf>,
    /// Files that failed
    pub failures: Vec<FileFailure>,
    /// Run duration
    pub duration: Duration,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(task: impl Into<String>, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { task: task.into(), status: BuildStatus::Success, outputs, failures: vec![], duration }
    }

    /// Create a failed result.
    pub fn failed(task: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            task: task.into(),
            status: BuildStatus::Failed(error.into()),
            outputs: vec![],
            failures: vec![],
            duration,
        }
    }

    /// Build a result from written outputs and per-file failures.
    ///
    /// The task fails when any file failed; outputs written by the other
    /// files are kept.
    pub fn from_files(
        task: impl Into<String>,
        mut outputs: Vec<PathBuf>,
        failures: Vec<FileFailure>,
        duration: Duration,
    ) -> Self {
        outputs.sort();
        let status = match failures.len() {
            0 => BuildStatus::Success,
            1 => BuildStatus::Failed("1 file failed".to_string()),
            n => BuildStatus::Failed(format!("{} files failed", n)),
        };
        Self { task: task.into(), status, outputs, failures, duration }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Paths of the files that failed.
    pub fn failed_paths(&self) -> Vec<&Path> {
        self.failures.iter().map(|f| f.path.as_path()).collect()
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Default, Clone)]
pub struct BuildResult {
    /// Results for each task, in the order they completed
    pub tasks: Vec<TaskResult>,
    /// Total duration
    pub total_duration: Duration,
    /// The run was stopped by a termination signal
    pub interrupted: bool,
}

impl BuildResult {
    /// Create a new empty build result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task result.
    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    /// Append every task result of another run.
    pub fn merge(&mut self, other: BuildResult) {
        self.tasks.extend(other.tasks);
        self.interrupted |= other.interrupted;
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Get the number of successful tasks.
    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_success()).count()
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the overall run succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Get failed task results.
    pub fn failures(&self) -> Vec<&TaskResult> {
        self.tasks.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Result of a named task, if it ran.
    pub fn task(&self, name: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task == name)
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let failed = self.failed_count();
        let total = self.tasks.len();
        let outputs = self.all_outputs().len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} failed ({} total)",
                success, failed, total
            ));
            for task in self.failures() {
                lines.push(format!("  - {}: {}", task.task, task.status));
                for failure in task.failures.iter().take(5) {
                    lines.push(format!("      {}", failure));
                }
                if task.failures.len() > 5 {
                    lines.push(format!("      ... and {} more", task.failures.len() - 5));
                }
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} tasks, {} files written in {:?}",
                total, outputs, self.total_duration
            ));
        }

        if self.interrupted {
            lines.push("Interrupted".to_string());
        }

        lines.join("\n")
    }
}

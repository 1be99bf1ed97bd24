//! Watch mode for automatic task re-runs on file changes
//!
//! The source root is watched recursively through a debounced watcher. Each
//! debounced batch is mapped to the tasks whose watch pattern set selects a
//! changed path, and those tasks are re-run one after another. Batches that
//! arrive during a run wait in the channel, so a task never overlaps itself.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::build::pipeline::{Job, PipelineError};
use crate::build::registry::TaskRegistry;
use crate::build::result::TaskResult;
use crate::config::schema::WatchConfig;

/// Job name of the watcher
pub const WATCH: &str = "watch";

/// Error during watch mode
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// Source directory not found
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// The event channel closed
    #[error("Watch channel closed")]
    ChannelClosed,
}

/// Tracks files with errors across runs for recovery detection
#[derive(Debug, Default)]
pub struct ErrorTracker {
    /// Failing files per task from that task's previous run
    files_with_errors: HashMap<String, HashSet<PathBuf>>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task run and return the files it fixed.
    pub fn update(&mut self, result: &TaskResult) -> Vec<PathBuf> {
        let current: HashSet<PathBuf> = result.failures.iter().map(|f| f.path.clone()).collect();
        let previous = self.files_with_errors.remove(&result.task).unwrap_or_default();

        let mut fixed: Vec<PathBuf> = previous.difference(&current).cloned().collect();
        fixed.sort();

        if !current.is_empty() {
            self.files_with_errors.insert(result.task.clone(), current);
        }
        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.files_with_errors.is_empty()
    }

    /// Get the number of files with errors
    pub fn error_count(&self) -> usize {
        self.files_with_errors.values().map(HashSet::len).sum()
    }
}

/// Watcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Waiting for a change
    Idle,
    /// Re-running tasks for a change
    Triggered,
}

/// Maps filesystem changes to task re-runs.
#[derive(Debug)]
pub struct Watcher {
    registry: Arc<TaskRegistry>,
    source_root: PathBuf,
    config: WatchConfig,
    tracker: ErrorTracker,
    state: WatchState,
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

impl Watcher {
    pub fn new(registry: Arc<TaskRegistry>, source_root: impl Into<PathBuf>, config: WatchConfig) -> Self {
        Self {
            registry,
            source_root: source_root.into(),
            config,
            tracker: ErrorTracker::new(),
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Re-run every task selected by `paths`, each once, in registry order.
    pub async fn handle_changes(&mut self, paths: &[PathBuf]) -> Vec<TaskResult> {
        let tasks = self.registry.tasks_for_paths(paths);
        if tasks.is_empty() {
            tracing::trace!(changed = paths.len(), "no task watches the changed paths");
            return vec![];
        }

        self.state = WatchState::Triggered;
        if self.config.clear_screen {
            clear_screen();
        }
        for path in paths {
            let shown = path.strip_prefix(&self.source_root).unwrap_or(path);
            tracing::info!(path = %shown.display(), "changed");
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            let result = task.run().await;
            for fixed in self.tracker.update(&result) {
                tracing::info!(task = %result.task, path = %fixed.display(), "fixed");
            }
            if !result.is_success() {
                tracing::warn!(task = %result.task, "{}; waiting for changes", result.status);
            }
            results.push(result);
        }

        if self.tracker.has_errors() {
            tracing::warn!(files = self.tracker.error_count(), "files still failing");
        }
        self.state = WatchState::Idle;
        results
    }

    /// Files that failed in their task's latest run.
    pub fn failing_files(&self) -> usize {
        self.tracker.error_count()
    }

    /// Watch until the event channel closes.
    pub async fn run(mut self) -> Result<(), WatchError> {
        if !self.source_root.exists() {
            return Err(WatchError::SourceNotFound(self.source_root.clone()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let debounce = Duration::from_millis(u64::from(self.config.debounce_ms));
        let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| {
            let _ = tx.send(res);
        })
        .map_err(WatchError::WatcherInit)?;

        debouncer
            .watcher()
            .watch(&self.source_root, RecursiveMode::Recursive)
            .map_err(WatchError::WatchPath)?;

        tracing::info!(path = %self.source_root.display(), "watching for changes");

        while let Some(res) = rx.recv().await {
            match res {
                Ok(events) => {
                    let mut paths: Vec<PathBuf> = events
                        .into_iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                        .map(|e| e.path)
                        .collect();
                    paths.sort();
                    paths.dedup();
                    self.handle_changes(&paths).await;
                }
                // Non-fatal; keep watching
                Err(error) => tracing::warn!(error = ?error, "watch error"),
            }
        }

        Err(WatchError::ChannelClosed)
    }
}

/// Pipeline job running a [`Watcher`] until the process ends.
pub struct WatchJob {
    registry: Arc<TaskRegistry>,
    source_root: PathBuf,
    config: WatchConfig,
}

impl WatchJob {
    pub fn new(registry: Arc<TaskRegistry>, source_root: impl Into<PathBuf>, config: WatchConfig) -> Self {
        Self { registry, source_root: source_root.into(), config }
    }
}

#[async_trait::async_trait]
impl Job for WatchJob {
    fn name(&self) -> &str {
        WATCH
    }

    async fn run(&self) -> Result<TaskResult, PipelineError> {
        let watcher =
            Watcher::new(Arc::clone(&self.registry), &self.source_root, self.config.clone());
        watcher.run().await.map_err(|e| PipelineError::job(WATCH, e))?;
        Ok(TaskResult::success(WATCH, vec![], Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::BuildContext;
    use crate::build::result::FileFailure;
    use crate::config::default_config;
    use crate::server::reload::{ReloadHub, ReloadMessage};
    use std::fs;
    use tempfile::TempDir;

    fn failed(task: &str, paths: &[&str]) -> TaskResult {
        TaskResult::from_files(
            task,
            vec![],
            paths.iter().map(|p| FileFailure::new(*p, "error")).collect(),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_error_tracker_new() {
        let tracker = ErrorTracker::new();
        assert!(!tracker.has_errors());
        assert_eq!(tracker.error_count(), 0);
    }

    #[test]
    fn test_error_tracker_detects_fixed_files() {
        let mut tracker = ErrorTracker::new();
        assert!(tracker.update(&failed("styles", &["a.css", "b.css"])).is_empty());
        assert_eq!(tracker.error_count(), 2);

        let fixed = tracker.update(&failed("styles", &["b.css"]));
        assert_eq!(fixed, vec![PathBuf::from("a.css")]);

        let fixed = tracker.update(&failed("styles", &[]));
        assert_eq!(fixed, vec![PathBuf::from("b.css")]);
        assert!(!tracker.has_errors());
    }

    #[test]
    fn test_error_tracker_is_per_task() {
        let mut tracker = ErrorTracker::new();
        tracker.update(&failed("styles", &["a.css"]));

        assert!(tracker.update(&failed("scripts", &[])).is_empty());
        assert_eq!(tracker.error_count(), 1);
    }

    fn project() -> (TempDir, Arc<TaskRegistry>, ReloadHub) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        fs::create_dir_all(root.join("src/styles")).unwrap();
        fs::create_dir_all(root.join("src/scripts")).unwrap();
        fs::write(root.join("src/styles/main.css"), ".a { color: red }").unwrap();
        fs::write(root.join("src/scripts/main.js"), "let a = 1;").unwrap();

        let mut config = default_config();
        config.scripts.tool = vec![];
        let ctx = BuildContext::new(config, root).unwrap();
        let hub = ReloadHub::new();
        let registry = Arc::new(TaskRegistry::standard(&ctx, &hub).unwrap());
        (temp, registry, hub)
    }

    #[tokio::test]
    async fn test_style_change_reruns_only_styles_and_notifies_once() {
        let (temp, registry, hub) = project();
        let mut rx = hub.subscribe();
        let mut watcher = Watcher::new(registry, temp.path().join("src"), WatchConfig::default());

        let changed = vec![temp.path().join("src/styles/main.css")];
        let results = watcher.handle_changes(&changed).await;

        let names: Vec<_> = results.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(names, vec!["styles"]);
        assert_eq!(watcher.state(), WatchState::Idle);
        assert!(temp.path().join("dist/styles/main.css").exists());
        assert!(!temp.path().join("dist/scripts/main.js").exists());

        assert_eq!(
            rx.try_recv().unwrap(),
            ReloadMessage::Css { paths: vec!["styles/main.css".to_string()] }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unrelated_change_runs_nothing() {
        let (temp, registry, _hub) = project();
        let mut watcher = Watcher::new(registry, temp.path().join("src"), WatchConfig::default());

        let results = watcher.handle_changes(&[temp.path().join("notes.txt")]).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_failing_rerun_is_swallowed() {
        let (temp, registry, _hub) = project();
        let mut watcher = Watcher::new(registry, temp.path().join("src"), WatchConfig::default());
        let broken = temp.path().join("src/styles/main.css");
        fs::write(&broken, "..a { color: red }").unwrap();

        let results = watcher.handle_changes(&[broken.clone()]).await;
        assert!(!results[0].is_success());
        assert_eq!(watcher.state(), WatchState::Idle);
        assert_eq!(watcher.failing_files(), 1);

        fs::write(&broken, ".a { color: blue }").unwrap();
        let results = watcher.handle_changes(&[broken]).await;
        assert!(results[0].is_success());
        assert_eq!(watcher.failing_files(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_root() {
        let temp = TempDir::new().unwrap();
        let watcher = Watcher::new(
            Arc::new(TaskRegistry::default()),
            temp.path().join("missing"),
            WatchConfig::default(),
        );
        assert!(matches!(watcher.run().await, Err(WatchError::SourceNotFound(_))));
    }
}

//! Content tasks
//!
//! A [`Task`] resolves its pattern set, runs each file through the chains
//! its [`ChainMap`] selects and writes one output per chain. Bundling tasks
//! concatenate every input into a single file instead.

use crate::build::discovery::{DiscoveryError, PatternSet};
use crate::build::result::{FileFailure, TaskResult};
use crate::server::reload::{ReloadHub, ReloadMessage};
use crate::transforms::{Asset, ChainMap};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What a finished run tells connected pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Full page reload
    Page,
    /// Stylesheet hot swap
    Css,
}

/// A named, self-contained unit of file processing.
#[derive(Debug, Clone)]
pub struct Task {
    name: String,
    inputs: PatternSet,
    watch: PatternSet,
    base: PathBuf,
    output_root: PathBuf,
    out_subdir: PathBuf,
    chains: ChainMap,
    bundle: Option<String>,
    reload: ReloadKind,
    jobs: usize,
    hub: ReloadHub,
}

impl Task {
    /// Create a task writing into `output_root/out_subdir`.
    ///
    /// The base directory is the static prefix of the first include pattern.
    /// The watch set defaults to the inputs.
    pub fn new(
        name: impl Into<String>,
        inputs: PatternSet,
        output_root: impl Into<PathBuf>,
        out_subdir: impl Into<PathBuf>,
        hub: ReloadHub,
    ) -> Result<Self, DiscoveryError> {
        let base = inputs.base()?;
        Ok(Self {
            name: name.into(),
            watch: inputs.clone(),
            inputs,
            base,
            output_root: output_root.into(),
            out_subdir: out_subdir.into(),
            chains: ChainMap::default(),
            bundle: None,
            reload: ReloadKind::Page,
            jobs: 1,
            hub,
        })
    }

    pub fn with_chains(mut self, chains: ChainMap) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_watch(mut self, watch: PatternSet) -> Self {
        self.watch = watch;
        self
    }

    /// Concatenate every input into one file with this name.
    pub fn with_bundle(mut self, bundle: Option<String>) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn with_reload(mut self, reload: ReloadKind) -> Self {
        self.reload = reload;
        self
    }

    /// Maximum files in flight.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &PatternSet {
        &self.inputs
    }

    /// Whether a change to `path` should re-run this task.
    pub fn watches(&self, path: &Path) -> bool {
        self.watch.selects(path)
    }

    /// Base directory output paths are relative to.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory the task writes into.
    pub fn dest_dir(&self) -> PathBuf {
        self.output_root.join(&self.out_subdir)
    }

    pub fn bundle(&self) -> Option<&str> {
        self.bundle.as_deref()
    }

    /// Run the task once and notify connected pages.
    pub async fn run(&self) -> TaskResult {
        let start = Instant::now();
        tracing::debug!(task = %self.name, "starting");

        let inputs = self.inputs.clone();
        let files = match tokio::task::spawn_blocking(move || inputs.discover()).await {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => return self.fail(e.to_string(), start),
            Err(e) => return self.fail(format!("discovery panicked: {}", e), start),
        };

        if files.is_empty() {
            tracing::debug!(task = %self.name, "no input files");
            return TaskResult::success(&self.name, vec![], start.elapsed());
        }

        let dest = self.dest_dir();
        if let Err(e) = tokio::fs::create_dir_all(&dest).await {
            return self.fail(format!("cannot create {}: {}", dest.display(), e), start);
        }

        let (outputs, failures) = match self.bundle {
            Some(ref bundle) => self.run_bundle(&files, &dest.join(bundle)).await,
            None => self.run_files(files).await,
        };

        for failure in &failures {
            tracing::error!(task = %self.name, path = %failure.path.display(), "{}", failure.message);
        }

        let result = TaskResult::from_files(&self.name, outputs, failures, start.elapsed());
        tracing::info!(
            task = %self.name,
            outputs = result.outputs.len(),
            failed = result.failures.len(),
            elapsed = ?result.duration,
            "finished"
        );
        self.notify(&result);
        result
    }

    fn fail(&self, message: String, start: Instant) -> TaskResult {
        tracing::error!(task = %self.name, "{}", message);
        TaskResult::failed(&self.name, message, start.elapsed())
    }

    /// Transform concurrently, claim destinations in source order, then write.
    ///
    /// A file whose output path was already claimed by another source fails
    /// and writes nothing, so the result does not depend on completion order.
    async fn run_files(&self, files: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<FileFailure>) {
        let mut transformed: Vec<_> = stream::iter(files)
            .map(|path| async move {
                let assets = self.transform_file(&path).await;
                (path, assets)
            })
            .buffer_unordered(self.jobs)
            .collect()
            .await;
        transformed.sort_by(|a, b| a.0.cmp(&b.0));

        let dest = self.dest_dir();
        let mut failures = Vec::new();
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut pending = Vec::with_capacity(transformed.len());

        for (path, assets) in transformed {
            let assets = match assets {
                Ok(assets) => assets,
                Err(message) => {
                    failures.push(FileFailure::new(path, message));
                    continue;
                }
            };
            let targets: Vec<PathBuf> = assets.iter().map(|a| dest.join(&a.relative)).collect();
            if let Some(message) = collision(&path, &targets, &claimed) {
                failures.push(FileFailure::new(path, message));
                continue;
            }
            for target in &targets {
                claimed.insert(target.clone(), path.clone());
            }
            pending.push((path, targets.into_iter().zip(assets).collect::<Vec<_>>()));
        }

        let written: Vec<_> = stream::iter(pending)
            .map(|(path, outputs)| async move {
                let mut written = Vec::with_capacity(outputs.len());
                for (target, asset) in outputs {
                    if let Err(message) = write_output(&target, &asset.contents).await {
                        return Err(FileFailure::new(path, message));
                    }
                    written.push(target);
                }
                Ok(written)
            })
            .buffer_unordered(self.jobs)
            .collect()
            .await;

        let mut outputs = Vec::new();
        for result in written {
            match result {
                Ok(paths) => outputs.extend(paths),
                Err(failure) => failures.push(failure),
            }
        }
        (outputs, failures)
    }

    async fn transform_file(&self, path: &Path) -> Result<Vec<Asset>, String> {
        let contents = tokio::fs::read(path).await.map_err(|e| format!("cannot read: {}", e))?;
        let relative = path
            .strip_prefix(&self.base)
            .map_err(|_| format!("outside of {}", self.base.display()))?
            .to_path_buf();

        let chains = self.chains.resolve(path).to_vec();
        let source = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            chains
                .iter()
                .map(|chain| chain.run(Asset::new(&source, &relative, contents.clone())))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| format!("transform panicked: {}", e))?
        .map_err(|e| e.to_string())
    }

    async fn run_bundle(&self, files: &[PathBuf], target: &Path) -> (Vec<PathBuf>, Vec<FileFailure>) {
        let mut bundle = Vec::new();
        let mut failures = Vec::new();
        for path in files {
            match tokio::fs::read(path).await {
                Ok(contents) => {
                    if !bundle.is_empty() && !bundle.ends_with(b"\n") {
                        bundle.push(b'\n');
                    }
                    bundle.extend_from_slice(&contents);
                }
                Err(e) => failures.push(FileFailure::new(path, format!("cannot read: {}", e))),
            }
        }

        if !failures.is_empty() {
            return (vec![], failures);
        }
        match write_output(target, &bundle).await {
            Ok(()) => (vec![target.to_path_buf()], failures),
            Err(message) => (vec![], vec![FileFailure::new(target, message)]),
        }
    }

    /// Send at most one notification for a finished run.
    fn notify(&self, result: &TaskResult) -> Option<ReloadMessage> {
        if result.outputs.is_empty() {
            return None;
        }
        let message = match self.reload {
            ReloadKind::Page => ReloadMessage::Reload,
            ReloadKind::Css => ReloadMessage::Css {
                paths: result
                    .outputs
                    .iter()
                    .filter_map(|p| p.strip_prefix(&self.output_root).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .collect(),
            },
        };
        self.hub.publish(message.clone());
        Some(message)
    }
}

/// Describe the first output of `source` that is already taken.
fn collision(
    source: &Path,
    targets: &[PathBuf],
    claimed: &HashMap<PathBuf, PathBuf>,
) -> Option<String> {
    let mut own = HashSet::new();
    for target in targets {
        if let Some(owner) = claimed.get(target) {
            return Some(format!(
                "output {} is also produced by {}",
                target.display(),
                owner.display()
            ));
        }
        if !own.insert(target) {
            return Some(format!(
                "output {} is produced twice by {}",
                target.display(),
                source.display()
            ));
        }
    }
    None
}

async fn write_output(target: &Path, contents: &[u8]) -> Result<(), String> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    tokio::fs::write(target, contents)
        .await
        .map_err(|e| format!("cannot write {}: {}", target.display(), e))
}

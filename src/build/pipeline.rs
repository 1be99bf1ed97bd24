//! Pipeline composition.
//!
//! A [`Pipeline`] is a tree of [`Job`]s. `series` nodes run their children
//! in order and stop at the first failure; `parallel` nodes poll all
//! children concurrently and never cancel a sibling.

use crate::build::result::{BuildResult, TaskResult};
use crate::build::task::Task;
use async_recursion::async_recursion;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Error raised by a job that could not produce a result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The job failed before or while running
    #[error("{job}: {message}")]
    Job { job: String, message: String },
}

impl PipelineError {
    pub fn job(job: &str, message: impl fmt::Display) -> Self {
        PipelineError::Job { job: job.to_string(), message: message.to_string() }
    }
}

/// A zero-argument unit of work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Name shown in results and logs
    fn name(&self) -> &str;

    /// Run to completion.
    async fn run(&self) -> Result<TaskResult, PipelineError>;
}

#[async_trait]
impl Job for Task {
    fn name(&self) -> &str {
        Task::name(self)
    }

    async fn run(&self) -> Result<TaskResult, PipelineError> {
        Ok(Task::run(self).await)
    }
}

/// Series/parallel composition of jobs.
#[derive(Clone)]
pub enum Pipeline {
    Job(Arc<dyn Job>),
    Series(Vec<Pipeline>),
    Parallel(Vec<Pipeline>),
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Job(job) => write!(f, "job({})", job.name()),
            Pipeline::Series(children) => f.debug_tuple("series").field(children).finish(),
            Pipeline::Parallel(children) => f.debug_tuple("parallel").field(children).finish(),
        }
    }
}

impl Pipeline {
    pub fn job(job: Arc<dyn Job>) -> Self {
        Pipeline::Job(job)
    }

    pub fn series(children: Vec<Pipeline>) -> Self {
        Pipeline::Series(children)
    }

    pub fn parallel(children: Vec<Pipeline>) -> Self {
        Pipeline::Parallel(children)
    }

    /// Names of every job in the tree, depth first.
    pub fn job_names(&self) -> Vec<String> {
        match self {
            Pipeline::Job(job) => vec![job.name().to_string()],
            Pipeline::Series(children) | Pipeline::Parallel(children) => {
                children.iter().flat_map(Pipeline::job_names).collect()
            }
        }
    }

    /// Run the tree and collect the result of every job that ran.
    pub async fn run(&self) -> BuildResult {
        let start = Instant::now();
        self.execute().await.with_duration(start.elapsed())
    }

    #[async_recursion]
    async fn execute(&self) -> BuildResult {
        match self {
            Pipeline::Job(job) => {
                let mut result = BuildResult::new();
                result.add_result(run_job(job.as_ref()).await);
                result
            }
            Pipeline::Series(children) => {
                let mut result = BuildResult::new();
                for child in children {
                    let child_result = child.execute().await;
                    let ok = child_result.is_success();
                    result.merge(child_result);
                    if !ok {
                        tracing::debug!("series stopped after failure");
                        break;
                    }
                }
                result
            }
            Pipeline::Parallel(children) => {
                let mut pending: FuturesUnordered<_> =
                    children.iter().map(|child| child.execute()).collect();
                let mut result = BuildResult::new();
                while let Some(child_result) = pending.next().await {
                    result.merge(child_result);
                }
                result
            }
        }
    }
}

async fn run_job(job: &dyn Job) -> TaskResult {
    let start = Instant::now();
    match job.run().await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(job = %job.name(), "{}", e);
            TaskResult::failed(job.name(), e.to_string(), start.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Outcome {
        Ok,
        Failed,
        Error,
    }

    struct Probe {
        name: String,
        delay_ms: u64,
        outcome: Outcome,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Job for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self) -> Result<TaskResult, PipelineError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.log.lock().unwrap().push(self.name.clone());
            match self.outcome {
                Outcome::Ok => Ok(TaskResult::success(&self.name, vec![], Duration::ZERO)),
                Outcome::Failed => Ok(TaskResult::failed(&self.name, "broken", Duration::ZERO)),
                Outcome::Error => Err(PipelineError::job(&self.name, "could not start")),
            }
        }
    }

    fn probe(log: &Arc<Mutex<Vec<String>>>, name: &str, delay_ms: u64, outcome: Outcome) -> Pipeline {
        Pipeline::job(Arc::new(Probe {
            name: name.to_string(),
            delay_ms,
            outcome,
            log: Arc::clone(log),
        }))
    }

    #[tokio::test]
    async fn test_series_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::series(vec![
            probe(&log, "a", 20, Outcome::Ok),
            probe(&log, "b", 0, Outcome::Ok),
        ]);

        let result = pipeline.run().await;
        assert!(result.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_series_fails_fast() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::series(vec![
            probe(&log, "clean", 0, Outcome::Ok),
            probe(&log, "build", 0, Outcome::Failed),
            probe(&log, "serve", 0, Outcome::Ok),
        ]);

        let result = pipeline.run().await;
        assert!(!result.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["clean", "build"]);
        assert!(result.task("serve").is_none());
    }

    #[tokio::test]
    async fn test_parallel_runs_all_children_despite_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::parallel(vec![
            probe(&log, "images", 0, Outcome::Failed),
            probe(&log, "fonts", 30, Outcome::Ok),
        ]);

        let result = pipeline.run().await;
        assert_eq!(result.tasks.len(), 2);
        assert_eq!(result.failed_count(), 1);
        assert!(result.task("fonts").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_parallel_results_in_completion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::parallel(vec![
            probe(&log, "slow", 50, Outcome::Ok),
            probe(&log, "fast", 0, Outcome::Ok),
        ]);

        let result = pipeline.run().await;
        let names: Vec<_> = result.tasks.iter().map(|t| t.task.as_str()).collect();
        assert_eq!(names, vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn test_job_error_becomes_failed_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = probe(&log, "server", 0, Outcome::Error).run().await;

        let server = result.task("server").unwrap();
        assert_eq!(server.status.to_string(), "failed: server: could not start");
    }

    #[tokio::test]
    async fn test_failed_parallel_stops_enclosing_series() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::series(vec![
            Pipeline::parallel(vec![
                probe(&log, "html", 0, Outcome::Ok),
                probe(&log, "styles", 0, Outcome::Failed),
            ]),
            Pipeline::parallel(vec![probe(&log, "watch", 0, Outcome::Ok)]),
        ]);

        let result = pipeline.run().await;
        assert!(!result.is_success());
        assert!(!log.lock().unwrap().contains(&"watch".to_string()));
    }

    #[test]
    fn test_job_names() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::series(vec![
            probe(&log, "clean", 0, Outcome::Ok),
            Pipeline::parallel(vec![probe(&log, "html", 0, Outcome::Ok)]),
        ]);
        assert_eq!(pipeline.job_names(), vec!["clean", "html"]);
    }
}

//! The default entry point: clean, build, then watch and serve.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use super::{Cli, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildContext, BuildResult, CleanJob, Pipeline, TaskRegistry};
use crate::config::loader::{find_config, load_config, merge_cli_overrides, CliOverrides};
use crate::config::ConfigError;
use crate::server::{shutdown_signal, ReloadHub, ServerJob};
use crate::watch::WatchJob;

/// Load the configuration, apply CLI overrides and resolve the context.
pub(crate) fn load_context(cli: &Cli) -> Result<BuildContext, ConfigError> {
    let config_path = cli.config.clone().or_else(find_config);
    let cwd = std::env::current_dir()?;

    let (mut config, root) = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "using config");
            let config = load_config(Some(&path))?;
            let root = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => cwd.clone(),
            };
            (config, root)
        }
        None => {
            tracing::debug!("no sitepack.toml found, using defaults");
            (crate::config::loader::default_config(), cwd.clone())
        }
    };

    let overrides = CliOverrides {
        src: cli.src.clone(),
        out: cli.out.clone(),
        profile: cli.profile,
        port: cli.port,
        minify: cli.no_minify.then_some(false),
        source_maps: cli.no_source_maps.then_some(false),
        jobs: cli.jobs.map(|j| j as usize),
    };
    merge_cli_overrides(&mut config, &overrides);

    // Watcher events carry canonical paths.
    let root = std::fs::canonicalize(&root).unwrap_or(root);
    BuildContext::new(config, root)
}

/// `series(clean, parallel(content tasks))`
pub(crate) fn build_pipeline(ctx: &BuildContext, registry: &TaskRegistry) -> Pipeline {
    let protected: Vec<PathBuf> =
        vec![ctx.project_root().to_path_buf(), ctx.source_root().to_path_buf()];
    let clean = CleanJob::new(ctx.output_root(), protected);
    Pipeline::series(vec![Pipeline::job(Arc::new(clean)), registry.content_pipeline()])
}

/// `parallel(watch, server)`
pub(crate) fn dev_pipeline(
    ctx: &BuildContext,
    registry: Arc<TaskRegistry>,
    hub: ReloadHub,
) -> Pipeline {
    let config = ctx.config();
    let watch = WatchJob::new(registry, ctx.source_root(), config.watch.clone());
    let server = ServerJob::new(config.server.clone(), ctx.output_root(), hub);
    Pipeline::parallel(vec![Pipeline::job(Arc::new(watch)), Pipeline::job(Arc::new(server))])
}

/// Run a pipeline until it finishes or a shutdown signal arrives.
async fn run_interruptible(pipeline: &Pipeline) -> BuildResult {
    tokio::select! {
        result = pipeline.run() => result,
        _ = shutdown_signal() => {
            tracing::info!("interrupted");
            BuildResult { interrupted: true, ..BuildResult::default() }
        }
    }
}

fn report(result: &BuildResult) {
    if result.is_success() {
        println!("{}", result.summary());
    } else {
        eprintln!("{}", result.summary());
    }
}

fn source_root_missing(root: &Path) -> bool {
    if root.is_dir() {
        return false;
    }
    eprintln!("Error: Source directory not found: {}", root.display());
    eprintln!("Create the directory or specify a different path with --src");
    true
}

/// Run the full pipeline.
pub(crate) async fn run_dev(cli: &Cli) -> ExitCode {
    let ctx = match load_context(cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    if source_root_missing(ctx.source_root()) {
        return ExitCode::from(EXIT_ERROR);
    }

    let hub = ReloadHub::new();
    let registry = match TaskRegistry::standard(&ctx, &hub) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    tracing::info!(
        profile = %ctx.profile(),
        src = %ctx.source_root().display(),
        out = %ctx.output_root().display(),
        tasks = ?registry.names(),
        "building"
    );

    let result = run_interruptible(&build_pipeline(&ctx, &registry)).await;
    if result.interrupted {
        return ExitCode::from(EXIT_SUCCESS);
    }
    report(&result);
    if !result.is_success() {
        return ExitCode::from(EXIT_ERROR);
    }
    if cli.once {
        return ExitCode::from(EXIT_SUCCESS);
    }

    let result = run_interruptible(&dev_pipeline(&ctx, registry, hub)).await;
    if result.interrupted || result.is_success() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        report(&result);
        ExitCode::from(EXIT_ERROR)
    }
}

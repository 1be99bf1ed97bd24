//! Command-line interface implementation
//!
//! A single entry point: clean, build every task, then watch and serve
//! until interrupted. `--once` stops after the build.

mod dev;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config::Profile;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// sitepack - build a static site's assets and serve them with live reload
#[derive(Parser, Debug)]
#[command(name = "sitepack")]
#[command(about = "Build HTML, styles, scripts, images, fonts and media into a deployable directory, then watch and serve it")]
#[command(version)]
pub struct Cli {
    /// Config file (default: nearest sitepack.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Deployment profile
    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    /// Source root
    #[arg(long, value_name = "DIR")]
    pub src: Option<PathBuf>,

    /// Output root
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Dev server port
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Files processed concurrently per task
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub jobs: Option<u64>,

    /// Skip minification
    #[arg(long)]
    pub no_minify: bool,

    /// Do not ask the script tool for source maps
    #[arg(long)]
    pub no_source_maps: bool,

    /// Build once and exit (no watch, no server)
    #[arg(long)]
    pub once: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sitepack=debug,tower_http=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_INVALID_ARGS } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: cannot start async runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    runtime.block_on(dev::run_dev(&cli))
}

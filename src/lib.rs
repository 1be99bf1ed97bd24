//! sitepack - static site asset pipeline
//!
//! This library provides functionality to:
//! - Select source files with ordered include/exclude glob sets
//! - Run each file through per-extension transform chains (includes, HTML,
//!   CSS, scripts, images)
//! - Compose tasks in series and in parallel
//! - Watch the source tree and re-run only the affected tasks
//! - Serve the output with live reload

pub mod build;
pub mod cli;
pub mod config;
pub mod server;
pub mod transforms;
pub mod watch;

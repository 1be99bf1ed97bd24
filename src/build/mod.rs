//! Build pipeline module for sitepack
//!
//! Turns a source tree into a deployable output directory.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: ordered include/exclude glob sets select each task's inputs
//! - **Tasks**: each file runs through the transform chains picked by its extension
//! - **Composition**: tasks are arranged in `series` and `parallel` nodes
//!
//! # Example
//!
//! ```ignore
//! use sitepack::build::{BuildContext, CleanJob, Pipeline, TaskRegistry};
//! use sitepack::config::load_config;
//! use sitepack::server::ReloadHub;
//!
//! let config = load_config(None)?;
//! let ctx = BuildContext::new(config, project_root)?;
//! let registry = TaskRegistry::standard(&ctx, &ReloadHub::new())?;
//! let pipeline = Pipeline::series(vec![
//!     Pipeline::job(Arc::new(CleanJob::new(ctx.output_root(), vec![]))),
//!     registry.content_pipeline(),
//! ]);
//!
//! let result = pipeline.run().await;
//! println!("{}", result.summary());
//! ```

pub mod clean;
pub mod context;
pub mod discovery;
pub mod pipeline;
pub mod registry;
pub mod result;
pub mod task;

pub use clean::*;
pub use context::*;
pub use discovery::*;
pub use pipeline::*;
pub use registry::TaskRegistry;
pub use result::*;
pub use task::*;

//! Build context containing configuration and state for a build.

use crate::config::{check, resolve_path, ConfigError, Profile, SiteConfig};
use crate::transforms::css::browsers_from_targets;
use crate::transforms::{ImageFormat, ScriptTool};
use lightningcss::targets::Browsers;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Default number of files processed concurrently per task.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Immutable build context handed to every task at construction.
///
/// Resolved once from the merged configuration; nothing in the build reads
/// the working directory or global state afterwards.
#[derive(Debug, Clone)]
pub struct BuildContext {
    config: SiteConfig,
    project_root: PathBuf,
    source_root: PathBuf,
    output_root: PathBuf,
    suffix: Option<String>,
    bundle_libs: bool,
    image_formats: BTreeSet<ImageFormat>,
    jobs: usize,
    browsers: Browsers,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// The configuration is validated here so CLI overrides are checked the
    /// same way as file values.
    pub fn new(config: SiteConfig, project_root: PathBuf) -> Result<Self, ConfigError> {
        check(&config)?;
        let browsers = browsers_from_targets(&config.styles.targets)
            .map_err(|e| ConfigError::Validation(vec![e]))?;

        let settings = config.profile_settings();
        let source_root = resolve_path(&project_root, &config.project.src);
        let output_root = resolve_path(&project_root, &settings.out);
        let image_formats = config.build.image_formats.iter().copied().collect();
        let jobs = config.build.jobs.unwrap_or_else(default_jobs);

        Ok(Self {
            project_root,
            source_root,
            output_root,
            suffix: settings.suffix,
            bundle_libs: settings.bundle_libs,
            image_formats,
            jobs,
            browsers,
            config,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Source root (absolute).
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Output root (absolute).
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn profile(&self) -> Profile {
        self.config.project.profile
    }

    /// Suffix inserted before the extension of style and script outputs.
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Whether the `[libs]` bundle settings apply.
    pub fn bundle_libs(&self) -> bool {
        self.bundle_libs
    }

    pub fn minify(&self) -> bool {
        self.config.build.minify
    }

    pub fn source_maps(&self) -> bool {
        self.config.build.source_maps
    }

    /// Extra formats produced for each PNG/JPEG image.
    pub fn image_formats(&self) -> &BTreeSet<ImageFormat> {
        &self.image_formats
    }

    /// Files processed concurrently per task.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Browser targets for stylesheet lowering.
    pub fn browsers(&self) -> Browsers {
        self.browsers
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.config.images.jpeg_quality
    }

    pub fn avif_quality(&self) -> u8 {
        self.config.images.avif_quality
    }

    /// The script tool step, or `None` when no tool is configured.
    pub fn script_tool(&self) -> Option<ScriptTool> {
        let scripts = &self.config.scripts;
        let mut tool = ScriptTool::from_command(&scripts.tool)?;
        if self.minify() {
            tool = tool.with_args(&scripts.minify_args);
        }
        if self.source_maps() {
            tool = tool.with_args(&scripts.source_map_args);
        }
        Some(tool)
    }

    /// Glob pattern for `rel` under the source root, relative to the
    /// project root.
    ///
    /// `src_pattern("styles/**/*.css")` → `src/styles/**/*.css`.
    pub fn src_pattern(&self, rel: &str) -> String {
        let prefix: PathBuf = self
            .config
            .project
            .src
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let prefix = prefix.to_string_lossy().replace('\\', "/");
        if prefix.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{}", prefix.trim_end_matches('/'), rel)
        }
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        resolve_path(&self.project_root, path)
    }
}

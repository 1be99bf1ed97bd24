//! Configuration schema types for `sitepack.toml`
//!
//! Defines the structure and validation rules for a site's build
//! configuration. Every section is optional; a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::transforms::css::browsers_from_targets;
use crate::transforms::images::{ImageFormat, DEFAULT_JPEG_QUALITY};

/// Deployment profile
///
/// Both profiles run the same pipeline; they differ in output root, output
/// file naming and whether vendor `libs` are bundled.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Standalone site in `dist/`
    #[default]
    Dist,
    /// Assets for an existing site in `assets/`, `.min` suffixed, vendor libs bundled
    Assets,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Dist => f.write_str("dist"),
            Profile::Assets => f.write_str("assets"),
        }
    }
}

/// Project section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Source root
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Deployment profile
    #[serde(default)]
    pub profile: Profile,
    /// Output root (defaults from the profile)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<PathBuf>,
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { src: default_src(), profile: Profile::default(), out: None }
    }
}

/// Build options shared by every task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Minify HTML, CSS and scripts
    #[serde(default = "default_true")]
    pub minify: bool,
    /// Ask the script tool for source maps
    #[serde(default = "default_true")]
    pub source_maps: bool,
    /// Extra formats each PNG/JPEG image is converted to
    #[serde(default = "default_image_formats")]
    pub image_formats: Vec<ImageFormat>,
    /// Files processed concurrently per task (defaults to available parallelism)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

fn default_true() -> bool {
    true
}

fn default_image_formats() -> Vec<ImageFormat> {
    vec![ImageFormat::Webp]
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            minify: true,
            source_maps: true,
            image_formats: default_image_formats(),
            jobs: None,
        }
    }
}

/// Per-profile overrides (`[profiles.dist]`, `[profiles.assets]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    /// Output root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<PathBuf>,
    /// Suffix inserted before the extension of styles and scripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Apply the `[libs]` bundle settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_libs: Option<bool>,
}

/// Profile settings after built-in defaults and overrides are merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSettings {
    pub out: PathBuf,
    pub suffix: Option<String>,
    pub bundle_libs: bool,
}

impl ProfileSettings {
    /// Built-in settings for a profile.
    pub fn builtin(profile: Profile) -> Self {
        match profile {
            Profile::Dist => Self { out: PathBuf::from("dist"), suffix: None, bundle_libs: false },
            Profile::Assets => {
                Self {
                out: PathBuf::from("assets"),
                suffix: Some(".min".to_string()),
                bundle_libs: true,
            }
            }
        }
    }

    fn merged(mut self, overrides: &ProfileOverrides) -> Self {
        if let Some(ref out) = overrides.out {
            self.out = out.clone();
        }
        if let Some(ref suffix) = overrides.suffix {
            self.suffix = if suffix.is_empty() { None } else { Some(suffix.clone()) };
        }
        if let Some(bundle) = overrides.bundle_libs {
            self.bundle_libs = bundle;
        }
        self
    }
}

/// Stylesheet options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Browser versions to lower syntax and add prefixes for
    #[serde(default = "default_browser_targets")]
    pub targets: BTreeMap<String, String>,
}

fn default_browser_targets() -> BTreeMap<String, String> {
    [("chrome", "80"), ("edge", "80"), ("firefox", "72"), ("safari", "13")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self { targets: default_browser_targets() }
    }
}

/// Script tool options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Command reading a script on stdin and writing the result to stdout.
    /// An empty list disables the step (scripts are only include-resolved).
    #[serde(default = "default_script_tool")]
    pub tool: Vec<String>,
    /// Arguments appended when minification is on
    #[serde(default = "default_minify_args")]
    pub minify_args: Vec<String>,
    /// Arguments appended when source maps are on
    #[serde(default = "default_source_map_args")]
    pub source_map_args: Vec<String>,
}

fn default_script_tool() -> Vec<String> {
    ["esbuild", "--target=es2015", "--loader=js", "--sourcefile={file}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_minify_args() -> Vec<String> {
    vec!["--minify".to_string()]
}

fn default_source_map_args() -> Vec<String> {
    vec!["--sourcemap=inline".to_string()]
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            tool: default_script_tool(),
            minify_args: default_minify_args(),
            source_map_args: default_source_map_args(),
        }
    }
}

/// Image options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// JPEG re-encoding quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// AVIF quality (1-100)
    #[serde(default = "default_avif_quality")]
    pub avif_quality: u8,
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_avif_quality() -> u8 {
    70
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { jpeg_quality: default_jpeg_quality(), avif_quality: default_avif_quality() }
    }
}

/// Vendor library options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibsConfig {
    /// Concatenate `scriptsLibs` inputs into this single file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_bundle: Option<String>,
    /// Concatenate `stylesLibs` inputs into this single file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles_bundle: Option<String>,
}

/// Development server options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false }
    }
}

/// Complete `sitepack.toml` configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub profiles: BTreeMap<Profile, ProfileOverrides>,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub libs: LibsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "images.jpeg_quality")
    pub field: String,
    /// Error message
    pub message: String,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sitepack.toml: '{}' {}", self.field, self.message)
    }
}

impl SiteConfig {
    /// Settings of the selected profile, with `[profiles.*]` and
    /// `project.out` applied.
    pub fn profile_settings(&self) -> ProfileSettings {
        let profile = self.project.profile;
        let mut settings = ProfileSettings::builtin(profile);
        if let Some(overrides) = self.profiles.get(&profile) {
            settings = settings.merged(overrides);
        }
        if let Some(ref out) = self.project.out {
            settings.out = out.clone();
        }
        settings
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ConfigValidationError { field: field.to_string(), message });
        };

        if self.project.src.as_os_str().is_empty() {
            push("project.src", "must be a non-empty path".to_string());
        }

        if lies_within(&self.profile_settings().out, &self.project.src) {
            push("project.out", "must not be project.src or inside it".to_string());
        }

        if self.build.jobs == Some(0) {
            push("build.jobs", "must be a positive integer".to_string());
        }

        for format in &self.build.image_formats {
            if !format.is_supported() {
                push(
                    "build.image_formats",
                    format!("'{}' requires sitepack built with the '{}' feature", format, format),
                );
            }
        }

        if !(1..=100).contains(&self.images.jpeg_quality) {
            push("images.jpeg_quality", "must be between 1 and 100".to_string());
        }

        if !(1..=100).contains(&self.images.avif_quality) {
            push("images.avif_quality", "must be between 1 and 100".to_string());
        }

        if let Err(message) = browsers_from_targets(&self.styles.targets) {
            push("styles.targets", message);
        }

        if self.server.port == 0 {
            push("server.port", "must be a positive integer".to_string());
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Lexical check that `path` is `dir` or below it. Paths of different
/// kinds (absolute vs relative) are never nested.
fn lies_within(path: &Path, dir: &Path) -> bool {
    let (path, dir) = (normalize(path), normalize(dir));
    if path.is_absolute() != dir.is_absolute() {
        return false;
    }
    let escapes = |p: &Path| matches!(p.components().next(), Some(Component::ParentDir));
    if escapes(&path) && !escapes(&dir) {
        return false;
    }
    path.starts_with(&dir)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

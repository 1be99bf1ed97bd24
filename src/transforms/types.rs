//! Core transform types and error definitions
//!
//! Contains the [`Asset`] value that flows through a chain, the [`Transform`]
//! trait every content step implements, and [`TransformError`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Errors that can occur while applying a transform to an asset
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TransformError {
    /// Content was expected to be UTF-8 text
    #[error("{step}: content is not valid UTF-8")]
    NotUtf8 { step: String },

    /// An `@@include` or `@import` target could not be read
    #[error("cannot include '{}': {message}", .path.display())]
    IncludeNotFound { path: PathBuf, message: String },

    /// An include chain refers back to a file already being expanded
    #[error("circular include: {}", .0.display())]
    CircularInclude(PathBuf),

    /// Malformed directive or directive arguments
    #[error("invalid directive: {0}")]
    InvalidDirective(String),

    /// Minifier or style processor rejected the input
    #[error("{step}: {message}")]
    Syntax { step: String, message: String },

    /// Image could not be decoded or encoded
    #[error("{step}: {message}")]
    Image { step: String, message: String },

    /// External tool could not be started or exited unsuccessfully
    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },
}

impl TransformError {
    pub(crate) fn syntax(step: &str, message: impl fmt::Display) -> Self {
        TransformError::Syntax { step: step.to_string(), message: message.to_string() }
    }

    pub(crate) fn image(step: &str, message: impl fmt::Display) -> Self {
        TransformError::Image { step: step.to_string(), message: message.to_string() }
    }
}

/// A file in flight through a transform chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Absolute path of the source file this asset was read from
    pub source: PathBuf,
    /// Destination path relative to the task's output directory
    pub relative: PathBuf,
    /// Current content
    pub contents: Vec<u8>,
}

impl Asset {
    /// Create an asset from a source path, its output-relative path and content.
    pub fn new(source: impl Into<PathBuf>, relative: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self { source: source.into(), relative: relative.into(), contents }
    }

    /// Borrow the content as text, failing if it is not UTF-8.
    pub fn text(&self, step: &str) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents)
            .map_err(|_| TransformError::NotUtf8 { step: step.to_string() })
    }

    /// Replace the content with new text.
    pub fn with_text(mut self, text: String) -> Self {
        self.contents = text.into_bytes();
        self
    }

    /// Directory containing the source file (include resolution base).
    pub fn source_dir(&self) -> &Path {
        self.source.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Lowercased extension of the output path, if any.
    pub fn extension(&self) -> Option<String> {
        self.relative.extension().map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// A single content step: `Asset -> Asset`.
///
/// Implementations must be pure with respect to their inputs apart from
/// reading referenced files (includes) or invoking an external tool.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Short step name used in diagnostics
    fn name(&self) -> &str;

    /// Apply the step.
    fn apply(&self, asset: Asset) -> Result<Asset, TransformError>;
}

/// An ordered list of transforms. Each chain yields exactly one output file.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    steps: Vec<Arc<dyn Transform>>,
}

impl Chain {
    /// An empty chain copies the file unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then(mut self, step: impl Transform + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Append a step only when `enabled` is true.
    pub fn then_if(self, enabled: bool, step: impl Transform + 'static) -> Self {
        if enabled {
            self.then(step)
        } else {
            self
        }
    }

    /// Step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether this chain is a straight copy.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order, feeding each the previous output.
    pub fn run(&self, asset: Asset) -> Result<Asset, TransformError> {
        self.steps.iter().try_fold(asset, |asset, step| step.apply(asset))
    }
}

/// Maps a file extension to the chains applied to files with that extension.
///
/// Resolved once per file; files whose extension has no entry use the
/// fallback chains.
#[derive(Debug, Clone)]
pub struct ChainMap {
    by_extension: HashMap<String, Vec<Chain>>,
    fallback: Vec<Chain>,
}

impl Default for ChainMap {
    fn default() -> Self {
        Self::uniform(Chain::new())
    }
}

impl ChainMap {
    /// Every file goes through the same single chain.
    pub fn uniform(chain: Chain) -> Self {
        Self { by_extension: HashMap::new(), fallback: vec![chain] }
    }

    /// Register the chains for one or more extensions (case-insensitive).
    pub fn with_extensions(mut self, extensions: &[&str], chains: Vec<Chain>) -> Self {
        for ext in extensions {
            self.by_extension.insert(ext.to_lowercase(), chains.clone());
        }
        self
    }

    /// Chains to apply for a path.
    pub fn resolve(&self, path: &Path) -> &[Chain] {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .and_then(|ext| self.by_extension.get(&ext))
            .unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Upper;

    impl Transform for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
            let text = asset.text(self.name())?.to_uppercase();
            Ok(asset.with_text(text))
        }
    }

    #[derive(Debug)]
    struct Fail;

    impl Transform for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        fn apply(&self, _asset: Asset) -> Result<Asset, TransformError> {
            Err(TransformError::syntax("fail", "boom"))
        }
    }

    fn asset(text: &str) -> Asset {
        Asset::new("/src/a.txt", "a.txt", text.as_bytes().to_vec())
    }

    #[test]
    fn test_empty_chain_copies() {
        let out = Chain::new().run(asset("hello")).unwrap();
        assert_eq!(out.contents, b"hello");
    }

    #[test]
    fn test_chain_applies_in_order() {
        let chain = Chain::new().then(Upper);
        assert_eq!(chain.step_names(), vec!["upper"]);
        let out = chain.run(asset("hello")).unwrap();
        assert_eq!(out.contents, b"HELLO");
    }

    #[test]
    fn test_chain_stops_at_failure() {
        let chain = Chain::new().then(Fail).then(Upper);
        let err = chain.run(asset("x")).unwrap_err();
        assert_eq!(err.to_string(), "fail: boom");
    }

    #[test]
    fn test_then_if_skips_disabled() {
        let chain = Chain::new().then_if(false, Upper);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_text_rejects_binary() {
        let a = Asset::new("/src/a.bin", "a.bin", vec![0xff, 0xfe]);
        assert!(matches!(a.text("step"), Err(TransformError::NotUtf8 { .. })));
    }

    #[test]
    fn test_chain_map_resolves_by_extension() {
        let map = ChainMap::default().with_extensions(&["png", "JPG"], vec![Chain::new(), Chain::new()]);
        assert_eq!(map.resolve(Path::new("a/b.png")).len(), 2);
        assert_eq!(map.resolve(Path::new("a/b.JPG")).len(), 2);
        assert_eq!(map.resolve(Path::new("a/b.svg")).len(), 1);
        assert_eq!(map.resolve(Path::new("noext")).len(), 1);
    }
}

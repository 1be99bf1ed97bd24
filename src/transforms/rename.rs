//! Output path renaming steps.

use std::path::PathBuf;

use super::types::{Asset, Transform, TransformError};

/// Insert a suffix between the file stem and its extension
/// (`main.css` + `.min` = `main.min.css`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffix(pub String);

impl Transform for Suffix {
    fn name(&self) -> &str {
        "suffix"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        asset.relative = with_suffix(&asset.relative, &self.0);
        Ok(asset)
    }
}

/// Path with `suffix` inserted before the extension.
pub fn with_suffix(path: &std::path::Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

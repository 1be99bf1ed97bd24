//! Stylesheet processing (import splicing, nesting, prefixes, minification)
//!
//! `@import` rules with relative paths are spliced in place before the sheet
//! is handed to lightningcss, which lowers nesting and adds vendor prefixes
//! for the configured browser targets and optionally minifies.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::{Captures, Regex};

use super::types::{Asset, Transform, TransformError};

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"@import\s+(?:url\(\s*(?:"([^"]+)"|'([^']+)'|([^'"\s)]+))\s*\)|"([^"]+)"|'([^']+)')\s*([^;]*);"#,
        )
        .expect("import pattern is valid")
    })
}

/// Whether an import target points outside the local tree.
fn is_remote(target: &str) -> bool {
    target.starts_with("//") || target.contains("://") || target.starts_with("data:")
}

/// Splice relative `@import` rules into `text`.
///
/// Imports with a media query are wrapped in `@media`; `layer` and
/// `supports` conditions are rejected. Remote imports are kept as written.
pub fn splice_imports(
    text: &str,
    base_dir: &Path,
    origin: Option<&Path>,
) -> Result<String, TransformError> {
    let mut visiting = HashSet::new();
    if let Some(origin) = origin.and_then(|p| fs::canonicalize(p).ok()) {
        visiting.insert(origin);
    }
    splice(text, base_dir, &mut visiting)
}

fn splice(
    text: &str,
    base_dir: &Path,
    visiting: &mut HashSet<PathBuf>,
) -> Result<String, TransformError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in import_regex().captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always matches");
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let target = import_target(&caps);
        if is_remote(target) {
            out.push_str(whole.as_str());
            continue;
        }

        let condition = caps.get(6).map(|m| m.as_str().trim()).unwrap_or_default();
        if is_cascade_condition(condition) {
            return Err(TransformError::InvalidDirective(format!(
                "@import '{}' {}: layer and supports conditions are not supported",
                target, condition
            )));
        }

        let path = base_dir.join(target);
        let canonical = fs::canonicalize(&path).map_err(|e| TransformError::IncludeNotFound {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if !visiting.insert(canonical.clone()) {
            return Err(TransformError::CircularInclude(canonical));
        }

        let content = fs::read_to_string(&canonical).map_err(|e| {
            TransformError::IncludeNotFound { path: path.clone(), message: e.to_string() }
        })?;
        let nested_base = canonical.parent().unwrap_or(base_dir).to_path_buf();
        let spliced = splice(&content, &nested_base, visiting)?;
        visiting.remove(&canonical);

        if condition.is_empty() {
            out.push_str(&spliced);
        } else {
            out.push_str(&format!("@media {} {{\n{}\n}}", condition, spliced));
        }
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// `layer`, `layer(name)` or `supports(...)` leading an import condition.
fn is_cascade_condition(condition: &str) -> bool {
    let lower = condition.to_ascii_lowercase();
    let keyword = lower.split(|c: char| c == '(' || c.is_whitespace()).next().unwrap_or_default();
    keyword == "layer" || (keyword == "supports" && lower[keyword.len()..].starts_with('('))
}

fn import_target<'t>(caps: &Captures<'t>) -> &'t str {
    (1..=5).find_map(|i| caps.get(i)).map(|m| m.as_str()).unwrap_or_default()
}

/// Parse a browser version like `"13"`, `"13.1"` or `"13.1.2"` into
/// lightningcss's packed `major << 16 | minor << 8 | patch` form.
pub fn parse_browser_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    let patch: u32 = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    if parts.next().is_some() || minor > 255 || patch > 255 {
        return None;
    }
    Some((major << 16) | (minor << 8) | patch)
}

/// Build lightningcss browser targets from a `browser -> version` table.
pub fn browsers_from_targets(targets: &BTreeMap<String, String>) -> Result<Browsers, String> {
    let mut browsers = Browsers::default();
    for (name, version) in targets {
        let parsed = parse_browser_version(version)
            .ok_or_else(|| format!("invalid version '{}' for browser '{}'", version, name))?;
        let slot = match name.as_str() {
            "android" => &mut browsers.android,
            "chrome" => &mut browsers.chrome,
            "edge" => &mut browsers.edge,
            "firefox" => &mut browsers.firefox,
            "ie" => &mut browsers.ie,
            "ios_saf" | "ios" => &mut browsers.ios_saf,
            "opera" => &mut browsers.opera,
            "safari" => &mut browsers.safari,
            "samsung" => &mut browsers.samsung,
            other => return Err(format!("unknown browser '{}'", other)),
        };
        *slot = Some(parsed);
    }
    Ok(browsers)
}

/// Run a stylesheet through lightningcss.
pub fn process_css(
    code: &str,
    filename: &str,
    browsers: Browsers,
    minify: bool,
) -> Result<String, TransformError> {
    let options = ParserOptions { filename: filename.to_string(), ..ParserOptions::default() };
    let mut sheet =
        StyleSheet::parse(code, options).map_err(|e| TransformError::syntax("css", e))?;

    sheet
        .minify(MinifyOptions { targets: Targets::from(browsers), ..MinifyOptions::default() })
        .map_err(|e| TransformError::syntax("css", e))?;

    let printed = sheet
        .to_css(PrinterOptions { minify, targets: Targets::from(browsers), ..PrinterOptions::default() })
        .map_err(|e| TransformError::syntax("css", e))?;
    Ok(printed.code)
}

/// Transform step splicing relative `@import` rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct CssImport;

impl Transform for CssImport {
    fn name(&self) -> &str {
        "css-import"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let text = asset.text(self.name())?;
        if !import_regex().is_match(text) {
            return Ok(asset);
        }
        let spliced = splice_imports(text, asset.source_dir(), Some(&asset.source))?;
        Ok(asset.with_text(spliced))
    }
}

/// Transform step lowering, prefixing and optionally minifying a stylesheet.
#[derive(Debug, Clone)]
pub struct CssProcess {
    browsers: Browsers,
    minify: bool,
}

impl CssProcess {
    pub fn new(browsers: Browsers, minify: bool) -> Self {
        Self { browsers, minify }
    }
}

impl Transform for CssProcess {
    fn name(&self) -> &str {
        "css"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let filename = asset.source.display().to_string();
        let css = process_css(asset.text(self.name())?, &filename, self.browsers, self.minify)?;
        Ok(asset.with_text(css))
    }
}

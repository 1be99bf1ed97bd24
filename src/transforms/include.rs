//! Textual file inclusion
//!
//! Supports the `@@include('path')` directive for splicing partials into
//! pages and scripts, and `@@include('path', {"key": "value"})` for passing
//! variables that replace `@@key` inside the included file.
//! Paths are resolved relative to the including file's directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::types::{Asset, Transform, TransformError};

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"@@include\(\s*(?:'([^']*)'|"([^"]*)")\s*(?:,\s*(\{[^)]*\}))?\s*\)"#)
            .expect("include pattern is valid")
    })
}

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@@([A-Za-z_][A-Za-z0-9_]*)").expect("variable pattern is valid"))
}

/// Check whether text contains at least one include directive.
pub fn has_include(text: &str) -> bool {
    include_regex().is_match(text)
}

/// Resolve every include directive in `text`.
///
/// `base_dir` is the directory of the file `text` came from. `origin`, when
/// given, is that file itself and takes part in cycle detection.
pub fn resolve_includes(
    text: &str,
    base_dir: &Path,
    origin: Option<&Path>,
) -> Result<String, TransformError> {
    let mut visiting = HashSet::new();
    if let Some(origin) = origin.and_then(|p| fs::canonicalize(p).ok()) {
        visiting.insert(origin);
    }
    expand(text, base_dir, &mut visiting)
}

fn expand(
    text: &str,
    base_dir: &Path,
    visiting: &mut HashSet<PathBuf>,
) -> Result<String, TransformError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in include_regex().captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always matches");
        out.push_str(&text[last..whole.start()]);
        out.push_str(&expand_directive(&caps, base_dir, visiting)?);
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

fn expand_directive(
    caps: &Captures<'_>,
    base_dir: &Path,
    visiting: &mut HashSet<PathBuf>,
) -> Result<String, TransformError> {
    let target = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
    if target.trim().is_empty() {
        return Err(TransformError::InvalidDirective("@@include with an empty path".to_string()));
    }

    let context = match caps.get(3) {
        Some(json) => Some(parse_context(json.as_str())?),
        None => None,
    };

    let path = base_dir.join(target);
    let canonical = fs::canonicalize(&path)
        .map_err(|e| TransformError::IncludeNotFound { path: path.clone(), message: e.to_string() })?;

    if !visiting.insert(canonical.clone()) {
        return Err(TransformError::CircularInclude(canonical));
    }

    let content = fs::read_to_string(&canonical)
        .map_err(|e| TransformError::IncludeNotFound { path: path.clone(), message: e.to_string() })?;
    let content = match &context {
        Some(vars) => substitute_variables(&content, vars),
        None => content,
    };

    let nested_base = canonical.parent().unwrap_or(base_dir).to_path_buf();
    let expanded = expand(&content, &nested_base, visiting)?;

    visiting.remove(&canonical);
    Ok(expanded)
}

fn parse_context(json: &str) -> Result<Map<String, Value>, TransformError> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TransformError::InvalidDirective(format!(
            "include context must be a JSON object, got {}",
            json
        ))),
        Err(e) => Err(TransformError::InvalidDirective(format!("include context: {}", e))),
    }
}

/// Replace `@@name` references with values from `vars`.
///
/// Unknown names and the `include` keyword are left untouched.
pub fn substitute_variables(text: &str, vars: &Map<String, Value>) -> String {
    variable_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match vars.get(name) {
                Some(_) if name == "include" => caps[0].to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Transform step that splices `@@include` directives.
#[derive(Debug, Default, Clone, Copy)]
pub struct Include;

impl Transform for Include {
    fn name(&self) -> &str {
        "include"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let text = asset.text(self.name())?;
        if !has_include(text) {
            return Ok(asset);
        }
        let resolved = resolve_includes(text, asset.source_dir(), Some(&asset.source))?;
        Ok(asset.with_text(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_has_include() {
        assert!(has_include("<div>@@include('a.html')</div>"));
        assert!(has_include(r#"@@include("a.html")"#));
        assert!(!has_include("<div>@@title</div>"));
    }

    #[test]
    fn test_resolve_simple_include() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "templates/header.html", "<header>Hi</header>");

        let out =
            resolve_includes("<body>@@include('templates/header.html')</body>", temp.path(), None)
                .unwrap();
        assert_eq!(out, "<body><header>Hi</header></body>");
    }

    #[test]
    fn test_nested_include_resolves_relative_to_partial() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "templates/layout.html", "[@@include('parts/nav.html')]");
        write(temp.path(), "templates/parts/nav.html", "nav");

        let out = resolve_includes("@@include('templates/layout.html')", temp.path(), None).unwrap();
        assert_eq!(out, "[nav]");
    }

    #[test]
    fn test_include_with_variables() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "head.html", "<title>@@title</title><p>@@count @@missing</p>");

        let out = resolve_includes(
            r#"@@include('head.html', {"title": "Home", "count": 3})"#,
            temp.path(),
            None,
        )
        .unwrap();
        assert_eq!(out, "<title>Home</title><p>3 @@missing</p>");
    }

    #[test]
    fn test_include_context_must_be_object() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.html", "a");

        let err = resolve_includes("@@include('a.html', {oops})", temp.path(), None).unwrap_err();
        assert!(matches!(err, TransformError::InvalidDirective(_)));
    }

    #[test]
    fn test_missing_include_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = resolve_includes("@@include('nope.html')", temp.path(), None).unwrap_err();
        assert!(matches!(err, TransformError::IncludeNotFound { .. }));
        assert!(err.to_string().contains("nope.html"));
    }

    #[test]
    fn test_circular_include_detected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.html", "@@include('b.html')");
        write(temp.path(), "b.html", "@@include('a.html')");

        let err = resolve_includes("@@include('a.html')", temp.path(), None).unwrap_err();
        assert!(matches!(err, TransformError::CircularInclude(_)));
    }

    #[test]
    fn test_self_include_detected_through_origin() {
        let temp = TempDir::new().unwrap();
        let page = write(temp.path(), "index.html", "@@include('index.html')");

        let err = resolve_includes("@@include('index.html')", temp.path(), Some(&page)).unwrap_err();
        assert!(matches!(err, TransformError::CircularInclude(_)));
    }

    #[test]
    fn test_same_partial_twice_is_not_a_cycle() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "p.html", "x");

        let out = resolve_includes("@@include('p.html')@@include('p.html')", temp.path(), None).unwrap();
        assert_eq!(out, "xx");
    }

    #[test]
    fn test_include_transform_passes_through_plain_files() {
        let asset = Asset::new("/nowhere/a.js", "a.js", b"let a = 1;".to_vec());
        let out = Include.apply(asset.clone()).unwrap();
        assert_eq!(out, asset);
    }

    #[test]
    fn test_include_transform_uses_source_directory() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "scripts/_util.js", "function util() {}");
        let main = write(temp.path(), "scripts/main.js", "@@include('_util.js')\nutil();");

        let asset = Asset::new(&main, "main.js", fs::read(&main).unwrap());
        let out = Include.apply(asset).unwrap();
        assert_eq!(out.contents, b"function util() {}\nutil();");
    }
}

//! Source file discovery for the build system.
//!
//! A [`PatternSet`] is an ordered list of glob patterns relative to the
//! project root. Patterns prefixed with `!` exclude. A file is selected when
//! the last pattern that matches it is an include, so a later include can
//! bring back a file an earlier exclude removed.

use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Prefix marking an exclude pattern
pub const EXCLUDE_PREFIX: char = '!';

const GLOB_META: &[char] = &['*', '?', '['];

/// Error during source discovery.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    /// Pattern set has nothing to enumerate from
    #[error("Pattern set has no include patterns")]
    NoIncludes,
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

#[derive(Debug, Clone)]
struct Entry {
    raw: String,
    full: String,
    pattern: Pattern,
    exclude: bool,
}

/// Ordered include/exclude glob list resolved against a project root.
#[derive(Debug, Clone)]
pub struct PatternSet {
    root: PathBuf,
    entries: Vec<Entry>,
}

impl PatternSet {
    /// Compile `patterns` relative to `root`.
    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Self, DiscoveryError> {
        let escaped_root = Pattern::escape(&root.to_string_lossy());
        let mut entries = Vec::with_capacity(patterns.len());

        for raw in patterns {
            let raw = raw.as_ref();
            let (exclude, body) = match raw.strip_prefix(EXCLUDE_PREFIX) {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let full = if Path::new(body).is_absolute() {
                body.to_string()
            } else {
                format!("{}/{}", escaped_root.trim_end_matches('/'), body)
            };
            let pattern = Pattern::new(&full).map_err(|source| DiscoveryError::InvalidPattern {
                pattern: raw.to_string(),
                source,
            })?;
            entries.push(Entry { raw: raw.to_string(), full, pattern, exclude });
        }

        Ok(Self { root: root.to_path_buf(), entries })
    }

    /// Project root the patterns are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Patterns as written, `!` prefixes included.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.raw.as_str())
    }

    /// Whether the set selects an absolute path.
    pub fn selects(&self, path: &Path) -> bool {
        let options = match_options();
        self.entries
            .iter()
            .rev()
            .find(|e| e.pattern.matches_path_with(path, options))
            .map(|e| !e.exclude)
            .unwrap_or(false)
    }

    /// Base directory: the static prefix of the first include pattern.
    pub fn base(&self) -> Result<PathBuf, DiscoveryError> {
        let first = self.entries.iter().find(|e| !e.exclude).ok_or(DiscoveryError::NoIncludes)?;
        Ok(self.root.join(glob_base(&first.raw)))
    }

    /// Enumerate the selected files, sorted.
    ///
    /// Candidates come from the include patterns only; zero matches is not
    /// an error.
    pub fn discover(&self) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut candidates = BTreeSet::new();

        for entry in self.entries.iter().filter(|e| !e.exclude) {
            let paths = glob_with(&entry.full, match_options()).map_err(|source| {
                DiscoveryError::InvalidPattern { pattern: entry.raw.clone(), source }
            })?;
            for path in paths {
                match path {
                    Ok(path) if path.is_file() => {
                        candidates.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(pattern = %entry.raw, error = %e, "unreadable path"),
                }
            }
        }

        Ok(candidates.into_iter().filter(|p| self.selects(p)).collect())
    }
}

/// Static prefix of a glob: the path components before the first one
/// containing a glob metacharacter.
///
/// `src/styles/**/*.css` → `src/styles`, `src/*.html` → `src`.
pub fn glob_base(pattern: &str) -> PathBuf {
    let body = pattern.strip_prefix(EXCLUDE_PREFIX).unwrap_or(pattern);
    let mut base = PathBuf::new();
    for component in Path::new(body).components() {
        if let Component::Normal(part) = component {
            if part.to_string_lossy().contains(GLOB_META) {
                break;
            }
        }
        base.push(component);
    }
    // A literal file pattern has its parent as base.
    if !body.contains(GLOB_META) {
        base.pop();
    }
    base
}

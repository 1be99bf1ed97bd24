//! HTML minification
//!
//! Delegates to `minify-html-onepass`, which strips comments and collapses
//! whitespace.

use minify_html_onepass::{with_friendly_error, Cfg};

use super::types::{Asset, Transform, TransformError};

/// Minify an HTML document.
pub fn minify_html(source: &[u8]) -> Result<Vec<u8>, TransformError> {
    let mut code = source.to_vec();
    let len = with_friendly_error(&mut code, &Cfg::new()).map_err(|e| {
        TransformError::syntax("html-minify", format!("{} at byte {}", e.message, e.position))
    })?;
    code.truncate(len);
    Ok(code)
}

/// Transform step wrapping [`minify_html`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlMinify;

impl Transform for HtmlMinify {
    fn name(&self) -> &str {
        "html-minify"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        asset.contents = minify_html(&asset.contents)?;
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_removes_comments() {
        let src = b"<html>\n  <body>\n    <!-- note -->\n    <p>Hello   world</p>\n  </body>\n</html>\n";
        let out = minify_html(src).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(!text.contains("<!--"));
        assert!(text.contains("Hello"));
        assert!(text.len() < src.len());
    }

    #[test]
    fn test_transform_keeps_paths() {
        let asset = Asset::new("/src/index.html", "index.html", b"<p>  x  </p>".to_vec());
        let out = HtmlMinify.apply(asset).unwrap();
        assert_eq!(out.relative, std::path::PathBuf::from("index.html"));
    }
}

//! Content transforms
//!
//! Every step is a value implementing [`Transform`] (`Asset -> Asset`).
//! Steps are composed into a [`Chain`], and a [`ChainMap`] picks the chains
//! for a file by its extension. Each chain produces one output file.

pub mod css;
pub mod html;
pub mod images;
pub mod include;
pub mod rename;
pub mod script;
pub mod types;

pub use css::{CssImport, CssProcess};
pub use html::HtmlMinify;
pub use images::{Codec, Convert, ImageFormat, Recompress};
pub use include::Include;
pub use rename::Suffix;
pub use script::ScriptTool;
pub use types::{Asset, Chain, ChainMap, Transform, TransformError};

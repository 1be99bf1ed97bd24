//! Image compression and format conversion
//!
//! PNG and JPEG sources are re-encoded in their own format; the smaller of the
//! re-encoded and original bytes is kept. Each configured extra format
//! produces an additional converted copy.

use std::fmt;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};

use super::types::{Asset, Transform, TransformError};

/// Extensions handled by the PNG codec
pub const PNG_EXTENSIONS: &[&str] = &["png"];
/// Extensions handled by the JPEG codec
pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Modern formats an image can be converted to in addition to its own format
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless WebP
    Webp,
    /// AVIF (requires the `avif` feature)
    Avif,
}

impl ImageFormat {
    /// File extension for converted copies.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
        }
    }

    /// Whether this build can encode the format.
    pub fn is_supported(self) -> bool {
        match self {
            ImageFormat::Webp => true,
            ImageFormat::Avif => cfg!(feature = "avif"),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn decode(step: &str, bytes: &[u8]) -> Result<DynamicImage, TransformError> {
    image::load_from_memory(bytes).map_err(|e| TransformError::image(step, e))
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())?;
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        WebPEncoder::new_lossless(&mut buf).write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        )?;
    } else {
        let rgb = img.to_rgb8();
        WebPEncoder::new_lossless(&mut buf).write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;
    }
    Ok(buf)
}

#[cfg(feature = "avif")]
fn encode_avif(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    use image::codecs::avif::AvifEncoder;

    let rgba = img.to_rgba8();
    let mut buf = Vec::new();
    AvifEncoder::new_with_speed_quality(&mut buf, 6, quality).write_image(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(buf)
}

#[cfg(not(feature = "avif"))]
fn encode_avif(_img: &DynamicImage, _quality: u8) -> Result<Vec<u8>, image::ImageError> {
    Err(image::ImageError::Unsupported(image::error::UnsupportedError::from_format_and_kind(
        image::error::ImageFormatHint::Exact(image::ImageFormat::Avif),
        image::error::UnsupportedErrorKind::Format(image::error::ImageFormatHint::Exact(
            image::ImageFormat::Avif,
        )),
    )))
}

/// Same-format re-encoding codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Lossless PNG with maximum compression
    Png,
    /// JPEG at the given quality
    Jpeg { quality: u8 },
}

/// Transform step re-encoding an image in its own format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recompress(pub Codec);

impl Transform for Recompress {
    fn name(&self) -> &str {
        match self.0 {
            Codec::Png => "png-compress",
            Codec::Jpeg { .. } => "jpeg-compress",
        }
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let img = decode(self.name(), &asset.contents)?;
        let encoded = match self.0 {
            Codec::Png => encode_png(&img),
            Codec::Jpeg { quality } => encode_jpeg(&img, quality),
        }
        .map_err(|e| TransformError::image(self.name(), e))?;

        if encoded.len() < asset.contents.len() {
            asset.contents = encoded;
        }
        Ok(asset)
    }
}

/// Transform step producing a copy in another format, with its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convert {
    format: ImageFormat,
    quality: u8,
}

impl Convert {
    pub fn new(format: ImageFormat, quality: u8) -> Self {
        Self { format, quality }
    }
}

impl Transform for Convert {
    fn name(&self) -> &str {
        match self.format {
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
        }
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, TransformError> {
        let img = decode(self.name(), &asset.contents)?;
        let encoded = match self.format {
            ImageFormat::Webp => encode_webp(&img),
            ImageFormat::Avif => encode_avif(&img, self.quality),
        }
        .map_err(|e| TransformError::image(self.name(), e))?;

        asset.contents = encoded;
        asset.relative.set_extension(self.format.extension());
        Ok(asset)
    }
}

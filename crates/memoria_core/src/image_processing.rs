//! crates/memoria_core/src/image_processing.rs
//!
//! Validation and compression of visitor images before they are uploaded.
//!
//! Compression decodes the image, scales it down to fit a bounding box while
//! keeping its aspect ratio, and re-encodes it under a fresh unique name.

use std::collections::HashMap;
use std::io::Cursor;

use chrono::Utc;
use image::imageops::FilterType;
use image::DynamicImage;
use uuid::Uuid;

use crate::domain::ImageFile;
use crate::errors::PlatformError;

pub const MEGABYTE: usize = 1024 * 1024;
pub const MAX_DNI_IMAGE_SIZE: usize = 5 * MEGABYTE;
pub const MAX_BANNER_IMAGE_SIZE: usize = 10 * MEGABYTE;
pub const MAX_PORTAL_IMAGE_SIZE: usize = 10 * MEGABYTE;

/// MIME types accepted for every image slot.
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("no file was provided")]
    Required,
    #[error("unsupported image type '{0}'")]
    InvalidType(String),
    #[error("file is {size} bytes, over the {max_bytes} byte limit")]
    TooLarge { size: usize, max_bytes: usize },
    #[error("file is empty")]
    Empty,
    #[error("image could not be decoded: {0}")]
    Corrupted(String),
    #[error("image could not be encoded: {0}")]
    Encoding(String),
}

impl ImageError {
    pub fn code(&self) -> &'static str {
        match self {
            ImageError::Required => "file-required",
            ImageError::InvalidType(_) => "invalid-file-type",
            ImageError::TooLarge { .. } => "file-too-large",
            ImageError::Empty => "file-empty",
            ImageError::Corrupted(_) => "file-corrupted",
            ImageError::Encoding(_) => "unknown-error",
        }
    }

    /// The Spanish message shown next to the file input.
    pub fn user_message(&self) -> String {
        PlatformError::from(self.clone()).user_message
    }
}

impl From<ImageError> for PlatformError {
    fn from(err: ImageError) -> Self {
        let params = match &err {
            ImageError::TooLarge { max_bytes, .. } => {
                HashMap::from([("maxSize", (max_bytes / MEGABYTE).to_string())])
            }
            _ => HashMap::new(),
        };
        PlatformError::with_params(err.code(), err.to_string(), &params)
    }
}

/// Checks type, size ceiling and emptiness, in that order.
pub fn validate_image(file: &ImageFile, max_bytes: usize) -> Result<(), ImageError> {
    let mime = file.mime_type.to_ascii_lowercase();
    if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(ImageError::InvalidType(file.mime_type.clone()));
    }
    if file.size() > max_bytes {
        return Err(ImageError::TooLarge {
            size: file.size(),
            max_bytes,
        });
    }
    if file.size() == 0 {
        return Err(ImageError::Empty);
    }
    Ok(())
}

//=========================================================================================
// Compression
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100. PNG and WebP are written losslessly.
    pub quality: u8,
    pub format: OutputFormat,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            quality: 80,
            format: OutputFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartCompressOptions {
    pub compression: CompressionOptions,
    /// Files above this size are always compressed.
    pub max_size_bytes: usize,
}

impl Default for SmartCompressOptions {
    fn default() -> Self {
        Self {
            compression: CompressionOptions::default(),
            max_size_bytes: 2 * MEGABYTE,
        }
    }
}

/// Scales `(width, height)` down to fit within the bounds, keeping the aspect ratio.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let (mut w, mut h) = (width as f64, height as f64);
    if w > max_width as f64 {
        h = h * max_width as f64 / w;
        w = max_width as f64;
    }
    if h > max_height as f64 {
        w = w * max_height as f64 / h;
        h = max_height as f64;
    }
    ((w.round() as u32).max(1), (h.round() as u32).max(1))
}

/// Generates `<millis>_<random>.<ext>` for an upload.
pub fn unique_file_name(extension: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}.{}", Utc::now().timestamp_millis(), &random[..13], extension)
}

/// Extension of `name`, lowercased, or `jpg` when it has none.
pub fn file_extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "jpg".to_string())
}

/// Reads the pixel dimensions from the image header without a full decode.
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Corrupted(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ImageError::Corrupted(e.to_string()))
}

/// Decodes, downsizes and re-encodes an image.
pub fn compress(file: &ImageFile, options: &CompressionOptions) -> Result<ImageFile, ImageError> {
    let decoded =
        image::load_from_memory(&file.bytes).map_err(|e| ImageError::Corrupted(e.to_string()))?;

    let (width, height) = scaled_dimensions(
        decoded.width(),
        decoded.height(),
        options.max_width,
        options.max_height,
    );
    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Triangle)
    };

    let bytes = encode(&resized, options)?;
    tracing::debug!(
        original_bytes = file.size(),
        compressed_bytes = bytes.len(),
        width,
        height,
        "Image compressed"
    );

    Ok(ImageFile::new(
        unique_file_name(options.format.extension()),
        options.format.mime_type(),
        bytes,
    ))
}

fn encode(img: &DynamicImage, options: &CompressionOptions) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    let result = match options.format {
        OutputFormat::Jpeg => {
            let quality = options.quality.clamp(1, 100);
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(&mut buf);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
        OutputFormat::Webp => {
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut buf);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
    };
    result.map_err(|e| ImageError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Whether `file` is over the size threshold or the dimension bounds.
/// Unreadable dimensions count as needing compression.
pub fn should_compress(file: &ImageFile, options: &SmartCompressOptions) -> bool {
    if file.size() > options.max_size_bytes {
        return true;
    }
    match image_dimensions(&file.bytes) {
        Ok((w, h)) => w > options.compression.max_width || h > options.compression.max_height,
        Err(_) => true,
    }
}

/// Compresses only when needed; small images come back untouched.
pub fn smart_compress(file: ImageFile, options: &SmartCompressOptions) -> Result<ImageFile, ImageError> {
    if !should_compress(&file, options) {
        return Ok(file);
    }
    compress(&file, &options.compression)
}

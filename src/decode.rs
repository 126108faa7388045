//! Fallback decoding for formats the display surfaces cannot render natively.
//!
//! The registry is a capability lookup from extension to strategy. Items query
//! it once when they are created; the cache runs the carried strategy during
//! resolution. Nothing in here caches or knows about playback.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageReader};
use tracing::debug;
#[cfg(not(feature = "heic"))]
use tracing::warn;

use crate::config::{DecoderOptions, OutputFormat};
use crate::error::DecodeError;

/// Converts raw bytes of one source format into directly displayable bytes.
pub trait DecodeStrategy: Send + Sync {
    /// Format tag of the produced bytes, e.g. `jpeg`.
    fn output_tag(&self) -> &str;

    /// Decode `raw`. Failures are final; callers never retry.
    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, DecodeError>;
}

/// Re-encodes any raster format the `image` crate reads into JPEG or PNG,
/// applying EXIF orientation on the way since the tag does not survive.
#[derive(Debug, Clone)]
pub struct TranscodeStrategy {
    extension: String,
    output: OutputFormat,
    quality: f32,
}

impl TranscodeStrategy {
    pub fn new(extension: impl Into<String>, output: OutputFormat, quality: f32) -> Self {
        Self {
            extension: extension.into(),
            output,
            quality: quality.clamp(0.0, 1.0),
        }
    }

    fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl DecodeStrategy for TranscodeStrategy {
    fn output_tag(&self) -> &str {
        self.output.tag()
    }

    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let img = ImageReader::new(Cursor::new(raw))
            .with_guessed_format()
            .map_err(|e| DecodeError::new(&self.extension, e))?
            .decode()
            .map_err(|e| DecodeError::new(&self.extension, e))?;
        let img = apply_orientation(img, read_orientation(raw).unwrap_or(1));
        encode(img, &self.extension, self.output, self.jpeg_quality(), raw.len())
    }
}

/// Decodes HEIC/HEIF through libheif, which applies the container's
/// rotation and mirroring itself, then re-encodes like [`TranscodeStrategy`].
#[cfg(feature = "heic")]
#[derive(Debug, Clone)]
pub struct HeicStrategy {
    inner: TranscodeStrategy,
}

#[cfg(feature = "heic")]
impl HeicStrategy {
    pub fn new(extension: impl Into<String>, output: OutputFormat, quality: f32) -> Self {
        Self {
            inner: TranscodeStrategy::new(extension, output, quality),
        }
    }
}

#[cfg(feature = "heic")]
impl DecodeStrategy for HeicStrategy {
    fn output_tag(&self) -> &str {
        self.inner.output.tag()
    }

    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let ext = &self.inner.extension;
        let ctx = HeifContext::read_from_bytes(raw).map_err(|e| DecodeError::new(ext, e))?;
        let handle = ctx
            .primary_image_handle()
            .map_err(|e| DecodeError::new(ext, e))?;
        let decoded = LibHeif::new()
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(|e| DecodeError::new(ext, e))?;
        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| DecodeError::new(ext, "no interleaved RGB plane"))?;

        let row_len = plane.width as usize * 3;
        let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
        for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
            let row = row
                .get(..row_len)
                .ok_or_else(|| DecodeError::new(ext, "short pixel row"))?;
            pixels.extend_from_slice(row);
        }
        let img = image::RgbImage::from_raw(plane.width, plane.height, pixels)
            .ok_or_else(|| DecodeError::new(ext, "pixel buffer size mismatch"))?;
        encode(
            DynamicImage::ImageRgb8(img),
            ext,
            self.inner.output,
            self.inner.jpeg_quality(),
            raw.len(),
        )
    }
}

fn encode(
    img: DynamicImage,
    extension: &str,
    output: OutputFormat,
    jpeg_quality: u8,
    raw_len: usize,
) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    let encoded = match output {
        OutputFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, jpeg_quality)),
        OutputFormat::Png => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_with_encoder(PngEncoder::new(&mut out)),
    };
    encoded.map_err(|e| DecodeError::new(extension, e))?;
    debug!(
        extension,
        output = output.tag(),
        raw_len,
        out_len = out.len(),
        "fallback decode complete"
    );
    Ok(out)
}

/// Whether `extension` names a HEIF-family container.
fn is_heif(extension: &str) -> bool {
    matches!(extension, "heic" | "heif")
}

fn read_orientation(raw: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(raw))
        .ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        // transpose
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        // transverse
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(feature = "heic")]
fn strategy_for_options(ext: &str, opts: &DecoderOptions) -> Arc<dyn DecodeStrategy> {
    if is_heif(ext) {
        return Arc::new(HeicStrategy::new(ext, opts.output_format, opts.quality));
    }
    Arc::new(TranscodeStrategy::new(ext, opts.output_format, opts.quality))
}

#[cfg(not(feature = "heic"))]
fn strategy_for_options(ext: &str, opts: &DecoderOptions) -> Arc<dyn DecodeStrategy> {
    if is_heif(ext) {
        warn!(
            extension = ext,
            "built without the `heic` feature; these files will fail to decode"
        );
    }
    Arc::new(TranscodeStrategy::new(ext, opts.output_format, opts.quality))
}

/// Extension to decode-strategy lookup.
#[derive(Clone)]
pub struct DecoderRegistry {
    strategies: HashMap<String, Arc<dyn DecodeStrategy>>,
}

impl DecoderRegistry {
    /// A registry where every format renders natively.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn from_options(opts: &DecoderOptions) -> Self {
        let mut registry = Self::empty();
        for ext in &opts.fallback_extensions {
            registry.register(ext, strategy_for_options(ext, opts));
        }
        registry
    }

    /// Add or replace the strategy for `extension` (case-insensitive).
    pub fn register(&mut self, extension: &str, strategy: Arc<dyn DecodeStrategy>) {
        self.strategies
            .insert(extension.to_ascii_lowercase(), strategy);
    }

    #[must_use]
    pub fn needs_fallback(&self, extension: &str) -> bool {
        self.strategies
            .contains_key(&extension.to_ascii_lowercase())
    }

    #[must_use]
    pub fn strategy_for(&self, extension: &str) -> Option<Arc<dyn DecodeStrategy>> {
        self.strategies
            .get(&extension.to_ascii_lowercase())
            .cloned()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::from_options(&DecoderOptions::default())
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exts: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        exts.sort_unstable();
        f.debug_struct("DecoderRegistry")
            .field("fallback_extensions", &exts)
            .finish()
    }
}

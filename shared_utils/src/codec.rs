//! Decode/Re-encode Engine
//!
//! Everything codec-specific sits behind [`ImageCodec`]; the orchestrators
//! only ever see `decode`, `encode` and `metadata`. [`RustCodec`] is the
//! production implementation:
//!
//! | Operation | Implementation |
//! |---|---|
//! | decode | `image` (format sniffed from content) |
//! | resize | `image` Lanczos3 |
//! | encode WebP | `webp` (libwebp, lossy, per-profile quality/effort) |
//! | encode AVIF | `image` AVIF encoder (ravif) |
//! | metadata | `image` header read, no full decode |

use crate::error::{PipelineError, Result};
use crate::profile::{QualityProfile, TargetFormat};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Decoder allocation ceiling; the corpus has some very large scans.
const MAX_DECODE_ALLOC: u64 = 1 << 30;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

pub trait ImageCodec: Send + Sync {
    /// Best-effort decode of an in-memory source file.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage>;

    fn encode(
        &self,
        image: &DynamicImage,
        format: TargetFormat,
        profile: &QualityProfile,
    ) -> Result<Vec<u8>>;

    /// Natural size read from the file header.
    fn metadata(&self, path: &Path) -> Result<Dimensions>;

    fn convert(
        &self,
        bytes: &[u8],
        format: TargetFormat,
        profile: &QualityProfile,
    ) -> Result<Vec<u8>> {
        let image = self.decode(bytes)?;
        self.encode(&image, format, profile)
    }

    /// Downscale to `width`, keeping the aspect ratio. Never upscales.
    fn resize_to_width(&self, image: &DynamicImage, width: u32) -> Result<DynamicImage> {
        if width == 0 || width >= image.width() {
            return Err(PipelineError::Resize(format!(
                "target width {} is not below natural width {}",
                width,
                image.width()
            )));
        }
        let height = scaled_height(image.width(), image.height(), width);
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }
}

/// Height matching `target_width` at the source aspect ratio, at least 1px.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let h = (height as f64 * target_width as f64 / width as f64).round() as u32;
    h.max(1)
}

/// `image` + libwebp backed codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCodec;

impl RustCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode_once(bytes: &[u8]) -> Result<DynamicImage> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode(e.to_string()))?;
        if reader.format().is_none() {
            return Err(PipelineError::Decode("unrecognised image format".into()));
        }
        let mut limits = image::Limits::default();
        limits.max_alloc = Some(MAX_DECODE_ALLOC);
        reader.limits(limits);
        Ok(reader.decode()?)
    }

    fn encode_webp(image: &DynamicImage, profile: &QualityProfile) -> Result<Vec<u8>> {
        let encode_err = |message: String| PipelineError::Encode {
            format: "WebP",
            message,
        };

        // libwebp only takes 8-bit RGB/RGBA.
        let pixels = to_8bit(image);
        let encoder = webp::Encoder::from_image(&pixels).map_err(|e| encode_err(e.to_string()))?;

        let mut config =
            webp::WebPConfig::new().map_err(|_| encode_err("invalid encoder config".into()))?;
        config.lossless = 0;
        config.quality = profile.quality;
        config.alpha_quality = i32::from(profile.alpha_quality);
        config.method = i32::from(profile.method);

        let memory = encoder
            .encode_advanced(&config)
            .map_err(|e| encode_err(format!("{:?}", e)))?;
        Ok(memory.to_vec())
    }

    fn encode_avif(image: &DynamicImage, profile: &QualityProfile) -> Result<Vec<u8>> {
        let pixels = to_8bit(image);
        let mut buf = Vec::new();
        let quality = profile.quality.clamp(1.0, 100.0).round() as u8;
        let speed = profile.method.clamp(1, 10);
        let encoder =
            image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, speed, quality);
        pixels
            .write_with_encoder(encoder)
            .map_err(|e| PipelineError::Encode {
                format: "AVIF",
                message: e.to_string(),
            })?;
        Ok(buf)
    }
}

impl ImageCodec for RustCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        match Self::decode_once(bytes) {
            Ok(image) => Ok(image),
            Err(first) if is_truncated_jpeg(bytes) => {
                debug!(error = %first, "JPEG lacks end marker, retrying with EOI appended");
                let mut repaired = Vec::with_capacity(bytes.len() + JPEG_EOI.len());
                repaired.extend_from_slice(bytes);
                repaired.extend_from_slice(&JPEG_EOI);
                Self::decode_once(&repaired).map_err(|_| first)
            }
            Err(e) => Err(e),
        }
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: TargetFormat,
        profile: &QualityProfile,
    ) -> Result<Vec<u8>> {
        match format {
            TargetFormat::WebP => Self::encode_webp(image, profile),
            TargetFormat::Avif => Self::encode_avif(image, profile),
        }
    }

    fn metadata(&self, path: &Path) -> Result<Dimensions> {
        let metadata_err = |message: String| PipelineError::Metadata {
            path: path.to_path_buf(),
            message,
        };
        let (width, height) = ImageReader::open(path)
            .map_err(|e| metadata_err(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| metadata_err(e.to_string()))?
            .into_dimensions()
            .map_err(|e| metadata_err(e.to_string()))?;
        Ok(Dimensions { width, height })
    }
}

fn is_truncated_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&JPEG_SOI) && !bytes.ends_with(&JPEG_EOI)
}

fn to_8bit(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image.clone(),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

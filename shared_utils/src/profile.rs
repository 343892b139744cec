//! Output formats and named encoder presets.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetFormat {
    WebP,
    Avif,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::WebP => "webp",
            TargetFormat::Avif => "avif",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TargetFormat::WebP => "WebP",
            TargetFormat::Avif => "AVIF",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoder parameters bundled under a name.
///
/// `method` is libwebp's effort level (0 fast .. 6 slow) for WebP and the
/// ravif speed (1 slow .. 10 fast) for AVIF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityProfile {
    pub name: &'static str,
    pub quality: f32,
    pub alpha_quality: u8,
    pub method: u8,
}

/// Same-resolution conversion of a source image.
pub const BASE_WEBP: QualityProfile = QualityProfile {
    name: "base-webp",
    quality: 82.0,
    alpha_quality: 90,
    method: 4,
};

/// Downscaled variants are already softened by resampling, so they get a
/// near-lossless setting.
pub const RESPONSIVE_WEBP: QualityProfile = QualityProfile {
    name: "responsive-webp",
    quality: 90.0,
    alpha_quality: 100,
    method: 5,
};

pub const BASE_AVIF: QualityProfile = QualityProfile {
    name: "base-avif",
    quality: 60.0,
    alpha_quality: 80,
    method: 6,
};

/// Default preset for a base conversion into `format`.
pub fn base_profile(format: TargetFormat) -> &'static QualityProfile {
    match format {
        TargetFormat::WebP => &BASE_WEBP,
        TargetFormat::Avif => &BASE_AVIF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions() {
        assert_eq!(TargetFormat::WebP.extension(), "webp");
        assert_eq!(TargetFormat::Avif.extension(), "avif");
        assert_eq!(TargetFormat::Avif.to_string(), "AVIF");
    }

    #[test]
    fn test_responsive_preset_is_higher_quality_than_base() {
        assert!(RESPONSIVE_WEBP.quality > BASE_WEBP.quality);
        assert!(RESPONSIVE_WEBP.quality >= 90.0);
        assert!((82.0..=85.0).contains(&BASE_WEBP.quality));
        // Middle of libwebp's 0..=6 effort range.
        assert!((3..=5).contains(&BASE_WEBP.method));
    }

    #[test]
    fn test_base_profile_lookup() {
        assert_eq!(base_profile(TargetFormat::WebP).name, "base-webp");
        assert_eq!(base_profile(TargetFormat::Avif).name, "base-avif");
    }
}

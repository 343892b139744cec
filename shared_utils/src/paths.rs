//! Format Filter & Path Deriver
//!
//! Output names are a pure function of the source path. The site's srcset
//! builder relies on exactly this layout:
//!
//! ```text
//! name.png  ->  name.webp  (+ name.avif)
//! name.webp ->  name-480.webp, name-768.webp, ...
//! ```

use std::path::{Path, PathBuf};

/// Source extensions accepted by the base conversion, lowercase.
pub const INPUT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "jfif"];

pub const WEBP_EXTENSION: &str = "webp";

/// Lowercased extension, or an empty string when there is none.
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    extensions.contains(&ext.as_str())
}

/// True iff `path` is a PNG/JPEG-family source.
pub fn is_eligible(path: &Path) -> bool {
    has_extension(path, INPUT_EXTENSIONS)
}

/// Swap the final extension for `new_extension` (leading dot optional).
///
/// Dots earlier in the file name are kept; a path without an extension gets
/// the new one appended.
pub fn derive_output_path(path: &Path, new_extension: &str) -> PathBuf {
    path.with_extension(new_extension.trim_start_matches('.'))
}

/// `dir/name.webp` -> `dir/name-{width}.webp`.
pub fn derive_variant_path(base: &Path, width: u32) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| WEBP_EXTENSION.to_string());
    base.with_file_name(format!("{}-{}.{}", stem, width, ext))
}

/// A `.webp` whose stem ends in `-{w}` for one of `widths` is a variant, not a
/// base image.
pub fn is_variant_path(path: &Path, widths: &[u32]) -> bool {
    if get_extension_lowercase(path) != WEBP_EXTENSION {
        return false;
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    match stem.rsplit_once('-') {
        Some((head, suffix)) if !head.is_empty() => suffix
            .parse::<u32>()
            .map(|w| widths.contains(&w))
            .unwrap_or(false),
        _ => false,
    }
}

/// Base WebP images: `.webp` files that are not themselves variants.
pub fn is_base_webp(path: &Path, widths: &[u32]) -> bool {
    get_extension_lowercase(path) == WEBP_EXTENSION && !is_variant_path(path, widths)
}

//! Idempotency Gate
//!
//! An output that exists is authoritative, whatever its age relative to the
//! source. To regenerate, delete the output.

use std::path::Path;

/// One stat call; no hashing, no timestamps.
pub fn should_skip(output: &Path) -> bool {
    output.exists()
}

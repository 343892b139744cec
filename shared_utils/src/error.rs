//! Pipeline Error Types
//!
//! Per-file variants are caught at the task boundary and turned into failure
//! records; only `NoUsableRoot` and `Pool` are meant to end a run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no usable image root among: {}", display_paths(.0))]
    NoUsableRoot(Vec<PathBuf>),

    #[error("cannot list {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed ({format}): {message}")]
    Encode { format: &'static str, message: String },

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read dimensions of {}: {message}", path.display())]
    Metadata { path: PathBuf, message: String },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("codec panicked")]
    CodecPanic,

    #[error("cannot start codec thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

impl PipelineError {
    /// Errors that abort the whole run instead of a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::NoUsableRoot(_) | PipelineError::Pool(_))
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Encoding(inner) => PipelineError::Encode {
                format: "image",
                message: inner.to_string(),
            },
            other => PipelineError::Decode(other.to_string()),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;

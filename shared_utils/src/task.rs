//! Per-task execution helpers: a deadline around codec work and
//! all-or-nothing output writes.

use crate::error::{PipelineError, Result};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Run `job` with a deadline.
///
/// The job runs on its own thread so a hung codec call cannot pin a pool
/// worker forever. On timeout the thread is left to finish in the
/// background and its result is dropped; jobs must therefore not touch the
/// filesystem. `None` runs the job inline. Either way a panic in the job
/// comes back as [`PipelineError::CodecPanic`].
///
/// An abandoned thread still holds its decoded image until the codec
/// returns, while the pool worker has already moved on. Under repeated
/// timeouts the number of images in memory can therefore exceed the pool
/// size; the deadline trades that bound for not losing a worker to a hung
/// decode.
pub fn run_with_timeout<T, F>(timeout: Option<Duration>, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return panic::catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|_| Err(PipelineError::CodecPanic));
    };

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("imgprep-codec".into())
        .spawn(move || {
            // Receiver is gone after a timeout.
            let _ = tx.send(job());
        })
        .map_err(PipelineError::Spawn)?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(timeout_secs = timeout.as_secs(), "Codec call exceeded deadline");
            Err(PipelineError::Timeout(timeout.as_secs()))
        }
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::CodecPanic),
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
///
/// The final path either does not exist or holds the complete output. An
/// existing file at `path` is never replaced. Returns the bytes written.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<u64> {
    let write_err = |source: std::io::Error| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".imgprep-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist_noclobber(path).map_err(|e| write_err(e.error))?;

    Ok(bytes.len() as u64)
}

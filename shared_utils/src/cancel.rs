//! Interrupt handling
//!
//! Ctrl-C flips a token; workers look at it before picking up the next task
//! and never abandon one mid-flight, so no half-written output is left behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Install a Ctrl-C handler that cancels the returned token. Further
/// interrupts only repeat the warning.
pub fn install_ctrlc_handler() -> anyhow::Result<CancelToken> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing in-flight images before stopping");
        handler_token.cancel();
    })?;
    Ok(token)
}

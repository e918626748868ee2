//! Cooperative cancellation shared between the engine and the downloader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable interrupt flag.
///
/// Setting it stops new pages and new downloads from being scheduled.
/// Work already in flight runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

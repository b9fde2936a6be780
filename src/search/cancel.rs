//! Cooperative cancellation for long-running scans.
//!
//! The exhaustive passes over the snapshot are O(N·D) per query; scan loops
//! poll the token once per chunk so a caller-side timeout can abort a slow
//! query without blocking the whole service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clonable cancellation flag shared between a query and its watchdog.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

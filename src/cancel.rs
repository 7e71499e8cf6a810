//! Cooperative cancellation for long-running procedures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-way cancellation flag shared between a coordinator and its workers.
///
/// The flag can only ever transition from "running" to "cancelled". Workers
/// poll it at safe points (before solver calls, after learning iterations,
/// between signals) and abort their work cooperatively.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Returns a new token in the "running" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. This cannot be undone.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

//! Process-wide networking lifecycle.
//!
//! Socket subsystems on some platforms need an explicit startup/cleanup pair.
//! [`NetContext`] models that as a reference-counted guard: the first live
//! context initializes, dropping the last one tears down. A
//! [`ConnectionManager`](crate::ConnectionManager) can only be built from a
//! live context.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

static LIVE_CONTEXTS: AtomicUsize = AtomicUsize::new(0);

/// Guard for the process-wide networking context.
#[derive(Debug)]
pub struct NetContext {
    _private: (),
}

impl NetContext {
    /// Initialize (or join) the networking context.
    #[must_use]
    pub fn init() -> Self {
        let previous = LIVE_CONTEXTS.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            info!("Networking context initialized");
        } else {
            debug!("Networking context joined ({} live)", previous + 1);
        }
        Self { _private: () }
    }

    /// Whether any context is currently live.
    #[must_use]
    pub fn is_active() -> bool {
        LIVE_CONTEXTS.load(Ordering::Acquire) > 0
    }
}

impl Clone for NetContext {
    fn clone(&self) -> Self {
        Self::init()
    }
}

impl Drop for NetContext {
    fn drop(&mut self) {
        if LIVE_CONTEXTS.fetch_sub(1, Ordering::AcqRel) == 1 {
            info!("Networking context torn down");
        }
    }
}

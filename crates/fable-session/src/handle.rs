//! A cloneable handle for controlling an active session from outside

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio_util::sync::CancellationToken;

/// Cloneable handle for aborting the in-flight stream from external
/// code (navigation, character switch).
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) is_streaming: Arc<AtomicBool>,
    /// Bumped on every abort or session switch. Event application
    /// compares against the epoch captured at stream start, so a late
    /// frame from a stale stream can never mutate current state.
    pub(crate) epoch: Arc<AtomicU64>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_streaming: Arc::new(AtomicBool::new(false)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Abort the in-flight stream, if any, and invalidate its frames.
    pub fn abort(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cancel.lock().cancel();
    }

    /// Whether a send is currently streaming.
    pub fn is_streaming(&self) -> bool {
        self.is_streaming.load(Ordering::Acquire)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Install a fresh cancellation token for a new stream.
    pub(crate) fn reset_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        token
    }
}

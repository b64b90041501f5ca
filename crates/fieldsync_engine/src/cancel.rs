//! Cooperative cancellation.

use crate::error::{SyncError, SyncResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation token.
///
/// The orchestrator checks the token between batches and between phases,
/// never mid-batch-item: an in-flight network call runs to completion and
/// its result is applied before cancellation takes effect, so the outbox
/// and cursor stay consistent with what the authority actually received.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(SyncError::Cancelled)` once cancellation was requested.
    pub fn checkpoint(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

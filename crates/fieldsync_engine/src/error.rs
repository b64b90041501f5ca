//! Error types for the sync engine.

use thiserror::Error;
use uuid::Uuid;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried on a later cycle.
        retryable: bool,
    },

    /// Protocol error (malformed message).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] fieldsync_store::StoreError),

    /// The authority reported a conflict that no registered reconciler
    /// claims. Dropping it would lose a mutation, so the cycle aborts.
    #[error("no reconciler claims conflicting event {event_id} ({event_type})")]
    UnhandledConflict {
        /// The conflicting event.
        event_id: Uuid,
        /// Its mutation kind tag.
        event_type: String,
    },

    /// A claimed reconciliation failed; the event stays in the outbox.
    #[error("reconciliation of event {event_id} failed: {message}")]
    Reconcile {
        /// The conflicting event.
        event_id: Uuid,
        /// Failure detail.
        message: String,
    },

    /// An identifier cascade could not be applied. Stale identifiers in
    /// local references corrupt future lookups, so the cycle aborts.
    #[error("identifier remap failed: {0}")]
    Remap(String),

    /// A pulled event could not be applied locally.
    #[error("failed to apply remote event {event_id}: {message}")]
    Apply {
        /// The event that failed to apply.
        event_id: Uuid,
        /// Failure detail.
        message: String,
    },

    /// The cycle was cancelled at a batch or phase boundary.
    #[error("sync cancelled")]
    Cancelled,

    /// Another cycle is already in flight for this engine.
    #[error("a sync cycle is already in progress")]
    CycleInProgress,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later user-triggered cycle may succeed without
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Cancelled | SyncError::CycleInProgress => true,
            _ => false,
        }
    }

    /// Returns true for errors that must unwind the cycle and be surfaced
    /// to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::UnhandledConflict { .. }
                | SyncError::Reconcile { .. }
                | SyncError::Remap(_)
                | SyncError::Apply { .. }
                | SyncError::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Remap("cascade failed".into()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(SyncError::UnhandledConflict {
            event_id: Uuid::new_v4(),
            event_type: "UpdateConsignment".into(),
        }
        .is_fatal());
        assert!(SyncError::Remap("cascade failed".into()).is_fatal());
        assert!(!SyncError::Cancelled.is_fatal());
        assert!(!SyncError::transport_retryable("timeout").is_fatal());
    }
}

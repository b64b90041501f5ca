//! Cycle state machine, statistics and per-cycle reports.

use crate::attachments::AttachmentOutcome;
use std::time::Duration;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, no cycle has run yet.
    Idle,
    /// Engine is loading the authority's full snapshot (first run only).
    Initializing,
    /// Engine is pushing outbox batches.
    Pushing,
    /// Engine is cascading confirmed identifiers.
    Remapping,
    /// Engine is pulling and applying authority events.
    Pulling,
    /// Engine is transferring attachment files.
    TransferringAttachments,
    /// Engine is committing the cursor.
    Committing,
    /// Engine completed a cycle.
    Synced,
    /// Engine aborted a cycle with an error.
    Error,
}

impl SyncState {
    /// Returns true while a cycle is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Initializing
                | SyncState::Pushing
                | SyncState::Remapping
                | SyncState::Pulling
                | SyncState::TransferringAttachments
                | SyncState::Committing
        )
    }

    /// Returns true if a new cycle may start.
    pub fn can_start_cycle(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Aggregate statistics across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed cycles.
    pub cycles_completed: u64,
    /// Events acknowledged by the authority.
    pub events_pushed: u64,
    /// Authority events applied locally.
    pub events_applied: u64,
    /// Conflicts routed through a reconciler.
    pub conflicts_reconciled: u64,
    /// Identifiers cascaded to confirmed values.
    pub ids_remapped: u64,
    /// Attachment transfers that failed or were skipped.
    pub attachment_failures: u64,
    /// Last error message, cleared on a successful cycle.
    pub last_error: Option<String>,
}

/// The outcome of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// True when the cycle started with a full snapshot load.
    pub initialized: bool,
    /// Events acknowledged by the authority this cycle.
    pub pushed: u64,
    /// Events left queued after an error-status response.
    pub push_errors: u64,
    /// Conflicts reconciled this cycle.
    pub reconciled: u64,
    /// Confirmed create events processed by the remapper registry.
    pub remapped: u64,
    /// Authority events applied locally this cycle.
    pub applied: u64,
    /// Per-file attachment outcomes, in pipeline order.
    pub attachments: Vec<AttachmentOutcome>,
    /// True when the cursor advanced.
    pub cursor_advanced: bool,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

impl SyncReport {
    /// Number of attachment outcomes that were not successes.
    pub fn attachment_failures(&self) -> u64 {
        self.attachments
            .iter()
            .filter(|outcome| !outcome.is_success())
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_gate_new_cycles() {
        assert!(SyncState::Idle.can_start_cycle());
        assert!(SyncState::Synced.can_start_cycle());
        assert!(SyncState::Error.can_start_cycle());
        assert!(!SyncState::Pushing.can_start_cycle());
        assert!(!SyncState::Committing.can_start_cycle());

        assert!(SyncState::Pulling.is_active());
        assert!(SyncState::TransferringAttachments.is_active());
        assert!(!SyncState::Synced.is_active());
    }

    #[test]
    fn report_counts_attachment_failures() {
        let report = SyncReport {
            attachments: vec![
                AttachmentOutcome::Uploaded {
                    path: "a.jpg".into(),
                },
                AttachmentOutcome::NotFound {
                    path: "b.jpg".into(),
                },
                AttachmentOutcome::SkippedMissing {
                    path: "c.jpg".into(),
                },
            ],
            ..SyncReport::default()
        };
        assert_eq!(report.attachment_failures(), 2);
    }
}

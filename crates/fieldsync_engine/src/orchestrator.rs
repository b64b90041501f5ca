//! The synchronization orchestrator.

use crate::applier::SyncApplier;
use crate::attachments;
use crate::cancel::CancellationToken;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::progress::{ProgressSink, ProgressStep};
use crate::reconcile::{ConflictReconciler, ReconcilerRegistry};
use crate::remap::{IdRemapper, RemapperRegistry};
use crate::state::{SyncReport, SyncState, SyncStats};
use crate::transport::AuthorityTransport;
use fieldsync_protocol::{EventRecord, EventStatus, PullRequest, PushRequest};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Drives sync cycles against the authority.
///
/// The orchestrator owns the sync cursor and the local write path for the
/// duration of a cycle. Exactly one cycle may be in flight; a second call
/// while one runs is rejected with [`SyncError::CycleInProgress`].
pub struct Orchestrator<T: AuthorityTransport, A: SyncApplier> {
    config: SyncConfig,
    transport: Arc<T>,
    applier: Arc<A>,
    reconcilers: ReconcilerRegistry,
    remappers: RemapperRegistry,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: AuthorityTransport, A: SyncApplier> Orchestrator<T, A> {
    /// Creates an orchestrator with empty registries.
    pub fn new(config: SyncConfig, transport: T, applier: A) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            applier: Arc::new(applier),
            reconcilers: ReconcilerRegistry::new(),
            remappers: RemapperRegistry::new(),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Registers a conflict reconciler.
    pub fn with_reconciler(mut self, reconciler: Box<dyn ConflictReconciler>) -> Self {
        self.reconcilers.register(reconciler);
        self
    }

    /// Registers an identifier remapper.
    pub fn with_remapper(mut self, remapper: Box<dyn IdRemapper>) -> Self {
        self.remappers.register(remapper);
        self
    }

    /// The current engine state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Aggregate statistics across cycles.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The local-state applier.
    pub fn applier(&self) -> &Arc<A> {
        &self.applier
    }

    /// The authority transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Clears all local state. Rejected while a cycle is in flight; the
    /// next cycle behaves as first-time initialization.
    pub fn reset_local_state(&self) -> SyncResult<()> {
        let state = self.state.read();
        if !state.can_start_cycle() {
            return Err(SyncError::CycleInProgress);
        }
        self.applier.reset()
    }

    /// Runs one full sync cycle for the given client identity.
    ///
    /// Phases: first-run initialization (when the cursor is uninitialized),
    /// push, identifier remap, pull, attachment transfer, cursor commit.
    /// Progress is delivered to `progress` as an ordered step stream ending
    /// in exactly one terminal step.
    pub fn synchronize(
        &self,
        client_id: Uuid,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> SyncResult<SyncReport> {
        let started = Instant::now();
        self.try_begin()?;
        tracing::info!(%client_id, "sync cycle started");

        let mut report = SyncReport::default();
        let result = self.run_cycle(client_id, cancel, progress, &mut report);
        report.duration = started.elapsed();

        match result {
            Ok(()) => {
                *self.state.write() = SyncState::Synced;
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.events_pushed += report.pushed;
                    stats.events_applied += report.applied;
                    stats.conflicts_reconciled += report.reconciled;
                    stats.ids_remapped += report.remapped;
                    stats.attachment_failures += report.attachment_failures();
                    stats.last_error = None;
                }
                tracing::info!(
                    pushed = report.pushed,
                    applied = report.applied,
                    reconciled = report.reconciled,
                    duration_ms = report.duration.as_millis() as u64,
                    "sync cycle finished"
                );
                progress.report(ProgressStep::finished(format!(
                    "{} events sent, {} applied",
                    report.pushed, report.applied
                )));
                Ok(report)
            }
            Err(err) => {
                *self.state.write() = SyncState::Error;
                self.stats.write().last_error = Some(err.to_string());
                tracing::error!(error = %err, "sync cycle aborted");
                progress.report(ProgressStep::failed(err.to_string(), 1.0));
                Err(err)
            }
        }
    }

    fn try_begin(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start_cycle() {
            return Err(SyncError::CycleInProgress);
        }
        *state = SyncState::Initializing;
        Ok(())
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn run_cycle(
        &self,
        client_id: Uuid,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let mut cursor = self.applier.cursor(client_id)?;

        if !cursor.initialized {
            progress.report(ProgressStep::new(
                "Retrieving data",
                "loading the full dataset",
                0.02,
            ));
            let snapshot = self.transport.retrieve_snapshot()?;
            let loaded = self.applier.load_snapshot(&snapshot.records)?;

            cursor.last_event_synced = self.transport.last_confirmed_event(client_id)?;
            cursor.initialized = true;
            self.applier.save_cursor(&cursor)?;
            report.initialized = true;

            tracing::info!(loaded, "first-run snapshot loaded");
            progress.report(ProgressStep::new(
                "Retrieving data",
                format!("{loaded} records loaded"),
                0.1,
            ));
        }
        cancel.checkpoint()?;

        self.push_phase(client_id, &cursor, cancel, progress, report)?;
        cancel.checkpoint()?;

        let (applied_cursor, applied) =
            self.pull_phase(client_id, &cursor, cancel, progress, report)?;
        cancel.checkpoint()?;

        self.set_state(SyncState::TransferringAttachments);
        progress.report(ProgressStep::new(
            "Transferring attachments",
            "uploading and downloading files",
            0.8,
        ));
        let outcomes = attachments::transfer(
            self.transport.as_ref(),
            self.applier.as_ref(),
            &self.config.attachment_folder,
            cancel,
            |index, total, outcome| {
                let fraction = 0.8 + 0.15 * ((index + 1) as f64 / total.max(1) as f64);
                progress.report(ProgressStep::new(
                    "Transferring attachments",
                    outcome.describe(),
                    fraction,
                ));
            },
        )?;
        report.attachments = outcomes;

        self.set_state(SyncState::Committing);
        if applied > 0 {
            cursor.last_event_synced = applied_cursor;
            cursor.initialized = true;
            self.applier.save_cursor(&cursor)?;
            report.cursor_advanced = true;
            tracing::debug!(cursor = ?cursor.last_event_synced, "cursor committed");
        }

        Ok(())
    }

    /// Pushes the outbox in fixed-size batches and applies the authority's
    /// per-event decisions. The outbox itself records what remains.
    fn push_phase(
        &self,
        client_id: Uuid,
        cursor: &fieldsync_store::SyncCursor,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        self.set_state(SyncState::Pushing);

        let pending = self.applier.pending_events()?;
        if pending.is_empty() {
            progress.report(ProgressStep::new("Sending events", "outbox empty", 0.4));
            return Ok(());
        }

        let batch_count = pending.len().div_ceil(self.config.batch_size);
        let mut confirmed_creates: Vec<EventRecord> = Vec::new();

        for (index, batch) in pending.chunks(self.config.batch_size).enumerate() {
            cancel.checkpoint()?;

            let mut events = batch.to_vec();
            for event in &mut events {
                event.last_sync_event = cursor.last_event_synced;
            }

            let request = PushRequest::new(client_id, events);
            let response = match self.transport.push(&request) {
                Ok(response) => response,
                Err(err) if err.is_retryable() => {
                    // No response for this batch: its events stay queued and
                    // the remaining batches still get their chance.
                    tracing::warn!(batch = index + 1, error = %err, "push batch failed, events retained");
                    report.push_errors += batch.len() as u64;
                    continue;
                }
                Err(err) => return Err(err),
            };

            for result in &response.results {
                let Some(original) = batch.iter().find(|e| e.event_id == result.event_id) else {
                    tracing::warn!(event_id = %result.event_id, "authority answered for an unknown event");
                    continue;
                };

                match result.status {
                    EventStatus::Success => {
                        self.applier.remove_event(result.event_id)?;
                        report.pushed += 1;
                        if original.is_create() && !result.element_id.is_nil() {
                            let mut confirmed = original.clone();
                            confirmed.element_id = result.element_id;
                            confirmed.status = EventStatus::Success;
                            confirmed_creates.push(confirmed);
                        }
                    }
                    EventStatus::Conflict => {
                        let mut conflicting = original.clone();
                        conflicting.status = EventStatus::Conflict;
                        conflicting.element_id = result.element_id;
                        conflicting.conflict_payload = result.conflict_payload.clone();

                        let Some(reconciler) = self.reconcilers.resolve(&conflicting) else {
                            return Err(SyncError::UnhandledConflict {
                                event_id: conflicting.event_id,
                                event_type: conflicting.event_type,
                            });
                        };
                        reconciler.reconcile(&conflicting, cancel)?;
                        self.applier.remove_event(result.event_id)?;
                        report.reconciled += 1;

                        if conflicting.is_create() && !result.element_id.is_nil() {
                            confirmed_creates.push(conflicting);
                        }
                    }
                    EventStatus::Error | EventStatus::Idle => {
                        tracing::warn!(event_id = %result.event_id, status = ?result.status, "event retained for next cycle");
                        report.push_errors += 1;
                    }
                }
            }

            let fraction = 0.1 + 0.3 * ((index + 1) as f64 / batch_count as f64);
            progress.report(ProgressStep::new(
                "Sending events",
                format!("batch {} of {batch_count}", index + 1),
                fraction,
            ));
        }

        if !confirmed_creates.is_empty() {
            self.set_state(SyncState::Remapping);
            let updated = self.remappers.run(&confirmed_creates)?;
            report.remapped = updated.len() as u64;
        }

        Ok(())
    }

    /// Pulls authority events after the cursor and applies them in batch
    /// groups. Returns the candidate cursor and the applied count.
    fn pull_phase(
        &self,
        client_id: Uuid,
        cursor: &fieldsync_store::SyncCursor,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
        report: &mut SyncReport,
    ) -> SyncResult<(Option<Uuid>, usize)> {
        self.set_state(SyncState::Pulling);
        progress.report(ProgressStep::new(
            "Fetching events",
            "requesting changes from the authority",
            0.4,
        ));

        let request = PullRequest::new(cursor.last_event_synced, client_id);
        let response = self.transport.pull(&request)?;

        let total = response.events.len();
        let mut candidate = cursor.last_event_synced;
        let mut applied = 0usize;

        if total == 0 {
            return Ok((candidate, 0));
        }

        let batch_count = total.div_ceil(self.config.batch_size);
        for (index, batch) in response.events.chunks(self.config.batch_size).enumerate() {
            cancel.checkpoint()?;

            applied += self.applier.apply_remote_events(batch)?;
            if let Some(last) = batch.last() {
                candidate = Some(last.event_id);
            }

            let fraction = 0.4 + 0.4 * ((index + 1) as f64 / batch_count as f64);
            progress.report(ProgressStep::new(
                "Applying events",
                format!("batch {} of {batch_count}", index + 1),
                fraction,
            ));
        }

        report.applied = applied as u64;
        Ok((candidate, applied))
    }
}

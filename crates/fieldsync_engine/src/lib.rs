//! # Fieldsync Engine
//!
//! Offline-first synchronization engine.
//!
//! This crate provides:
//! - The synchronization orchestrator (push → pull → attachments → commit)
//! - Cycle state machine and per-cycle reports
//! - Authority transport abstraction with a mock for tests
//! - Conflict reconciler and identifier remapper registries
//! - The attachment transfer pipeline
//! - Cooperative cancellation and ordered progress reporting
//!
//! ## Architecture
//!
//! The orchestrator is the only caller of the other components and the sole
//! owner of the local write path while a cycle runs. One cycle:
//!
//! 1. **Push** the outbox in fixed-size batches and apply the authority's
//!    per-event decisions; confirmed creates feed the remapper registry.
//! 2. **Pull** authority events after the cursor and apply them locally.
//! 3. **Transfer attachments** in both directions; per-file failures never
//!    block the cycle.
//! 4. **Commit** the cursor, only if pulled events were applied.
//!
//! ## Key invariants
//!
//! - At most one cycle in flight per engine; concurrent calls are rejected
//! - Events for one entity are pushed and applied in outbox insertion order
//! - The cursor never advances past an event that failed to apply
//! - An unreconciled conflict aborts the cycle; it is never dropped
//! - Cancellation is observed at batch and phase boundaries only

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod attachments;
mod cancel;
mod config;
mod error;
mod http;
mod orchestrator;
mod progress;
mod reconcile;
mod remap;
mod state;
mod transport;

pub use applier::{MemoryApplier, StoreApplier, SyncApplier};
pub use attachments::AttachmentOutcome;
pub use cancel::CancellationToken;
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport};
pub use orchestrator::Orchestrator;
pub use progress::{CollectingSink, NullSink, ProgressSink, ProgressStep};
pub use reconcile::{ConflictReconciler, ConsignmentConflictReconciler, ReconcilerRegistry};
pub use remap::{CreateConsignmentRemapper, IdRemapper, RemapperRegistry};
pub use state::{SyncReport, SyncState, SyncStats};
pub use transport::{AuthorityTransport, MockTransport};

//! # Fieldsync Protocol
//!
//! Sync protocol types and JSON codecs for fieldsync.
//!
//! This crate provides:
//! - [`EventRecord`] for outbox rows and replication records
//! - [`EventStatus`] for per-event authority decisions
//! - Protocol messages (Push, Pull, Snapshot)
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod messages;

pub use error::{CodecError, CodecResult};
pub use event::{event_types, EventRecord, EventStatus};
pub use messages::{
    EventResult, PullRequest, PullResponse, PushRequest, PushResponse, SnapshotRecord,
    SnapshotResponse,
};

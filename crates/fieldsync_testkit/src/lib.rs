//! # Fieldsync Testkit
//!
//! Test utilities for fieldsync.
//!
//! This crate provides:
//! - [`InMemoryAuthority`]: a scripted, stateful authority implementing the
//!   engine's transport contract, with a per-event idempotency ledger
//! - Fixture builders for consignments and event records
//!
//! The authority is deliberately well-behaved: replaying an acknowledged
//! batch answers the recorded decisions again without duplicating effects,
//! which is the contract the engine's at-most-once delivery relies on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authority;
mod fixtures;

pub use authority::InMemoryAuthority;
pub use fixtures::{
    consignment, create_event, delete_event, remote_update, snapshot_record, update_event,
};

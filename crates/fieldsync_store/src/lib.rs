//! # Fieldsync Store
//!
//! Local durable state for fieldsync.
//!
//! This crate provides:
//! - The event outbox (ordered log of pending local mutations)
//! - The per-client sync cursor
//! - Entity projections (consignments) kept consistent with the outbox
//! - The attachment link index and the attachment file store
//! - A full local reset that forces first-time initialization
//!
//! ## Design
//!
//! State lives in a single SQLite database. Writes that must not diverge
//! (an entity mutation and the outbox event recording it) happen in one
//! transaction. Transactions are short-lived: no lock is ever held across
//! a network wait, which belongs to the engine crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attachments;
pub mod consignments;
pub mod cursor;
mod error;
mod files;
mod models;
pub mod outbox;
mod schema;
mod store;
mod transform;

pub use attachments::AttachmentRepository;
pub use consignments::ConsignmentRepository;
pub use cursor::CursorRepository;
pub use error::{StoreError, StoreResult};
pub use files::AttachmentFiles;
pub use models::{AttachmentLink, Consignment, ConsignmentSnapshot, SyncCursor};
pub use outbox::OutboxRepository;
pub use store::Store;
pub use transform::{IdentityTransform, ValueTransform};

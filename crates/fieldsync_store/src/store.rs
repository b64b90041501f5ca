//! The local store: one SQLite database behind a single handle.

use crate::attachments::AttachmentRepository;
use crate::consignments::ConsignmentRepository;
use crate::cursor::CursorRepository;
use crate::error::StoreResult;
use crate::models::{AttachmentLink, Consignment, SyncCursor};
use crate::outbox::OutboxRepository;
use crate::schema;
use crate::transform::{IdentityTransform, ValueTransform};
use fieldsync_protocol::{event_types, EventRecord};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Handle to the local database.
///
/// All access goes through short-lived transactions; the handle is cheap to
/// share behind an [`Arc`]. Writes that must not diverge (an entity
/// mutation and the outbox event recording it) are exposed as combined
/// operations running in one transaction.
pub struct Store {
    conn: Mutex<Connection>,
    transform: Arc<dyn ValueTransform>,
}

impl Store {
    /// Opens (and initializes) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            transform: Arc::new(IdentityTransform),
        })
    }

    /// Opens an in-memory database, useful for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            transform: Arc::new(IdentityTransform),
        })
    }

    /// Installs a value transform applied around payload persistence.
    pub fn with_transform(mut self, transform: Arc<dyn ValueTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Runs a closure against the connection.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Runs a closure inside a transaction; commits on `Ok`, rolls back on
    /// `Err`.
    fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }

    // ---- Outbox ----

    /// Appends a standalone event to the outbox.
    pub fn append_event(&self, event: &mut EventRecord) -> StoreResult<()> {
        self.with_conn(|conn| OutboxRepository::new(conn, self.transform.as_ref()).append(event))
    }

    /// All pending events in insertion order.
    pub fn pending_events(&self) -> StoreResult<Vec<EventRecord>> {
        self.with_conn(|conn| OutboxRepository::new(conn, self.transform.as_ref()).list_all())
    }

    /// Deletes an outbox row; `false` if it was already gone.
    pub fn remove_event(&self, event_id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| OutboxRepository::new(conn, self.transform.as_ref()).remove(event_id))
    }

    /// Number of events awaiting transmission.
    pub fn pending_event_count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| OutboxRepository::new(conn, self.transform.as_ref()).count())
    }

    // ---- Consignments ----

    /// Writes a consignment and appends the outbox event recording the
    /// mutation in the same transaction, so the projection and the outbox
    /// never diverge.
    pub fn record_consignment_event(
        &self,
        consignment: &Consignment,
        event_type: &str,
    ) -> StoreResult<EventRecord> {
        let payload = consignment.to_payload()?;
        let mut event = EventRecord::new(
            event_type,
            consignment.id,
            Some(Consignment::DATA_TYPE.to_string()),
            payload,
        );

        self.transaction(|tx| {
            ConsignmentRepository::new(tx).upsert(consignment)?;
            OutboxRepository::new(tx, self.transform.as_ref()).append(&mut event)?;
            Ok(())
        })?;
        Ok(event)
    }

    /// Deletes a consignment and appends the delete event in the same
    /// transaction. Returns `None` when the record does not exist.
    pub fn delete_consignment_with_event(&self, id: Uuid) -> StoreResult<Option<EventRecord>> {
        self.transaction(|tx| {
            let repo = ConsignmentRepository::new(tx);
            let Some(existing) = repo.get(id)? else {
                return Ok(None);
            };
            let payload = existing.to_payload()?;
            repo.delete(id)?;

            let mut event = EventRecord::new(
                event_types::DELETE_CONSIGNMENT,
                id,
                Some(Consignment::DATA_TYPE.to_string()),
                payload,
            );
            OutboxRepository::new(tx, self.transform.as_ref()).append(&mut event)?;
            Ok(Some(event))
        })
    }

    /// Writes a consignment projection without recording an event (used
    /// when applying authority state).
    pub fn upsert_consignment(&self, consignment: &Consignment) -> StoreResult<()> {
        self.with_conn(|conn| ConsignmentRepository::new(conn).upsert(consignment))
    }

    /// Deletes a consignment projection without recording an event.
    pub fn delete_consignment(&self, id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| ConsignmentRepository::new(conn).delete(id))
    }

    /// Looks up a consignment.
    pub fn consignment(&self, id: Uuid) -> StoreResult<Option<Consignment>> {
        self.with_conn(|conn| ConsignmentRepository::new(conn).get(id))
    }

    /// All consignments, most recently modified first.
    pub fn consignments(&self) -> StoreResult<Vec<Consignment>> {
        self.with_conn(|conn| ConsignmentRepository::new(conn).list())
    }

    /// Number of consignment projections.
    pub fn consignment_count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| ConsignmentRepository::new(conn).count())
    }

    /// Rewrites a consignment identifier everywhere it is referenced, in
    /// one transaction: the primary row, attachment links, sibling
    /// back-references and pending outbox rows. Re-running with the same
    /// pair touches zero rows.
    pub fn remap_consignment_id(&self, old: Uuid, new: Uuid) -> StoreResult<usize> {
        self.transaction(|tx| {
            tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
            let mut affected = ConsignmentRepository::new(tx).remap_id(old, new)?;
            affected += AttachmentRepository::new(tx).retarget(old, new)?;
            affected += OutboxRepository::new(tx, self.transform.as_ref()).retarget(old, new)?;
            tracing::debug!(%old, %new, affected, "identifier remapped");
            Ok(affected)
        })
    }

    // ---- Attachments ----

    /// Inserts or updates an attachment link.
    pub fn link_attachment(&self, link: &AttachmentLink) -> StoreResult<()> {
        self.with_conn(|conn| AttachmentRepository::new(conn).link(link))
    }

    /// Links awaiting upload.
    pub fn unsynced_attachments(&self) -> StoreResult<Vec<AttachmentLink>> {
        self.with_conn(|conn| AttachmentRepository::new(conn).list_unsynced())
    }

    /// Links the authority already holds.
    pub fn synced_attachments(&self) -> StoreResult<Vec<AttachmentLink>> {
        self.with_conn(|conn| AttachmentRepository::new(conn).list_synced())
    }

    /// All links for one consignment.
    pub fn attachments_for(&self, consignment_id: Uuid) -> StoreResult<Vec<AttachmentLink>> {
        self.with_conn(|conn| AttachmentRepository::new(conn).list_for(consignment_id))
    }

    /// Flips a link's sync flag after a completed transfer.
    pub fn mark_attachment_synced(&self, path: &str) -> StoreResult<bool> {
        self.with_conn(|conn| AttachmentRepository::new(conn).mark_synced(path))
    }

    /// Number of links awaiting upload.
    pub fn unsynced_attachment_count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| AttachmentRepository::new(conn).unsynced_count())
    }

    // ---- Cursor ----

    /// Loads the cursor for a client identity.
    pub fn cursor(&self, client_id: Uuid) -> StoreResult<SyncCursor> {
        self.with_conn(|conn| CursorRepository::new(conn).load(client_id))
    }

    /// Persists a cursor.
    pub fn save_cursor(&self, cursor: &SyncCursor) -> StoreResult<()> {
        self.with_conn(|conn| CursorRepository::new(conn).save(cursor))
    }

    /// All known cursors.
    pub fn cursors(&self) -> StoreResult<Vec<SyncCursor>> {
        self.with_conn(|conn| CursorRepository::new(conn).list())
    }

    // ---- Reset ----

    /// Clears every table. The next sync cycle behaves as first-time
    /// initialization.
    pub fn reset(&self) -> StoreResult<()> {
        self.with_conn(|conn| schema::clear_all(conn))?;
        tracing::info!("local state reset");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::EventStatus;

    #[test]
    fn record_consignment_event_is_atomic_pair() {
        let store = Store::open_in_memory().unwrap();
        let consignment = Consignment::new("CN-1");

        let event = store
            .record_consignment_event(&consignment, event_types::CREATE_CONSIGNMENT)
            .unwrap();

        assert_eq!(event.mobile_event_id, consignment.id);
        assert_eq!(event.status, EventStatus::Idle);
        assert!(store.consignment(consignment.id).unwrap().is_some());

        let pending = store.pending_events().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, event.event_id);

        let decoded = Consignment::from_payload(&pending[0].payload).unwrap();
        assert_eq!(decoded, consignment);
    }

    #[test]
    fn delete_consignment_with_event_snapshots_prior_state() {
        let store = Store::open_in_memory().unwrap();
        let consignment = Consignment::new("CN-2");
        store
            .record_consignment_event(&consignment, event_types::CREATE_CONSIGNMENT)
            .unwrap();

        let event = store
            .delete_consignment_with_event(consignment.id)
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, event_types::DELETE_CONSIGNMENT);
        assert!(store.consignment(consignment.id).unwrap().is_none());

        let decoded = Consignment::from_payload(&event.payload).unwrap();
        assert_eq!(decoded.reference, "CN-2");

        assert!(store
            .delete_consignment_with_event(consignment.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn remap_cascades_across_all_tables() {
        let store = Store::open_in_memory().unwrap();
        let consignment = Consignment::new("CN-3");
        store
            .record_consignment_event(&consignment, event_types::CREATE_CONSIGNMENT)
            .unwrap();
        store
            .link_attachment(&AttachmentLink {
                path: "cn3/a.jpg".into(),
                consignment_id: consignment.id,
                file_name: "a.jpg".into(),
                synced: false,
            })
            .unwrap();

        let confirmed = Uuid::new_v4();
        let affected = store.remap_consignment_id(consignment.id, confirmed).unwrap();
        assert!(affected >= 3);

        assert!(store.consignment(consignment.id).unwrap().is_none());
        assert!(store.consignment(confirmed).unwrap().is_some());
        assert_eq!(store.attachments_for(confirmed).unwrap().len(), 1);
        assert!(store.attachments_for(consignment.id).unwrap().is_empty());

        let pending = store.pending_events().unwrap();
        assert_eq!(pending[0].mobile_event_id, confirmed);

        assert_eq!(store.remap_consignment_id(consignment.id, confirmed).unwrap(), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let store = Store::open_in_memory().unwrap();
        let consignment = Consignment::new("CN-4");
        store
            .record_consignment_event(&consignment, event_types::CREATE_CONSIGNMENT)
            .unwrap();

        let mut cursor = SyncCursor::new(Uuid::new_v4());
        cursor.initialized = true;
        store.save_cursor(&cursor).unwrap();

        store.reset().unwrap();

        assert_eq!(store.pending_event_count().unwrap(), 0);
        assert_eq!(store.consignment_count().unwrap(), 0);
        let reloaded = store.cursor(cursor.client_id).unwrap();
        assert!(!reloaded.initialized);
    }

    #[test]
    fn value_transform_wraps_payload_persistence() {
        /// Reverses payload text; distinct at rest, identical after open.
        struct Reversing;
        impl crate::transform::ValueTransform for Reversing {
            fn seal(&self, plain: &str) -> crate::error::StoreResult<String> {
                Ok(plain.chars().rev().collect())
            }
            fn open(&self, stored: &str) -> crate::error::StoreResult<String> {
                Ok(stored.chars().rev().collect())
            }
        }

        let store = Store::open_in_memory()
            .unwrap()
            .with_transform(std::sync::Arc::new(Reversing));
        let consignment = Consignment::new("CN-7");
        store
            .record_consignment_event(&consignment, event_types::CREATE_CONSIGNMENT)
            .unwrap();

        // Reads go through `open`, so the payload decodes normally.
        let pending = store.pending_events().unwrap();
        let decoded = Consignment::from_payload(&pending[0].payload).unwrap();
        assert_eq!(decoded, consignment);

        // At rest the payload is sealed.
        let raw: String = store
            .conn
            .lock()
            .query_row("SELECT payload FROM outbox_events", [], |row| row.get(0))
            .unwrap();
        assert!(Consignment::from_payload(&raw).is_err());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let consignment = Consignment::new("CN-5");
        store
            .record_consignment_event(&consignment, event_types::CREATE_CONSIGNMENT)
            .unwrap();

        // A second append of the same event id fails; the entity write in
        // the same transaction must roll back with it.
        let pending = store.pending_events().unwrap();
        let mut duplicate = pending[0].clone();
        let other = Consignment::new("CN-6");
        let result = store.transaction(|tx| {
            ConsignmentRepository::new(tx).upsert(&other)?;
            OutboxRepository::new(tx, store.transform.as_ref()).append(&mut duplicate)?;
            Ok(())
        });

        assert!(result.is_err());
        assert!(store.consignment(other.id).unwrap().is_none());
    }
}

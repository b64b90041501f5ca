//! The local-state seam between the orchestrator and the store.
//!
//! [`SyncApplier`] stands in for the domain's command layer: pulled
//! authority events are dispatched through it, and it owns every local
//! read and write the orchestrator performs. [`StoreApplier`] is the
//! SQLite-backed implementation; [`MemoryApplier`] backs unit tests.

use crate::error::{SyncError, SyncResult};
use fieldsync_protocol::{event_types, EventRecord, SnapshotRecord};
use fieldsync_store::{
    AttachmentFiles, AttachmentLink, Consignment, ConsignmentSnapshot, Store, SyncCursor,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Local-state operations required by the orchestrator.
pub trait SyncApplier: Send + Sync {
    /// All pending outbox events in insertion order.
    fn pending_events(&self) -> SyncResult<Vec<EventRecord>>;

    /// Deletes an outbox row; `false` if it was already gone.
    fn remove_event(&self, event_id: Uuid) -> SyncResult<bool>;

    /// Applies a batch of authority events to local state, in order.
    /// Returns the number applied.
    fn apply_remote_events(&self, events: &[EventRecord]) -> SyncResult<usize>;

    /// Loads a full-dataset snapshot (first-time initialization).
    /// Returns the number of records loaded.
    fn load_snapshot(&self, records: &[SnapshotRecord]) -> SyncResult<usize>;

    /// Loads the cursor for a client identity.
    fn cursor(&self, client_id: Uuid) -> SyncResult<SyncCursor>;

    /// Persists a cursor.
    fn save_cursor(&self, cursor: &SyncCursor) -> SyncResult<()>;

    /// Attachment links awaiting upload.
    fn unsynced_attachments(&self) -> SyncResult<Vec<AttachmentLink>>;

    /// Attachment links whose content the authority holds.
    fn synced_attachments(&self) -> SyncResult<Vec<AttachmentLink>>;

    /// Reads a local attachment file; `None` if missing.
    fn read_attachment(&self, path: &str) -> SyncResult<Option<Vec<u8>>>;

    /// Writes a local attachment file, creating directories as needed.
    fn write_attachment(&self, path: &str, bytes: &[u8]) -> SyncResult<()>;

    /// Returns true if the local file backing a link exists.
    fn attachment_exists(&self, path: &str) -> SyncResult<bool>;

    /// Flips a link's sync flag after a completed transfer.
    fn mark_attachment_synced(&self, path: &str) -> SyncResult<bool>;

    /// Clears all local state; the next cycle re-initializes.
    fn reset(&self) -> SyncResult<()>;
}

/// SQLite-backed applier.
pub struct StoreApplier {
    store: Arc<Store>,
    files: AttachmentFiles,
}

impl StoreApplier {
    /// Creates an applier over a store and an attachment file root.
    pub fn new(store: Arc<Store>, files: AttachmentFiles) -> Self {
        Self { store, files }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn apply_one(&self, event: &EventRecord) -> SyncResult<()> {
        match event.event_type.as_str() {
            event_types::CREATE_CONSIGNMENT | event_types::UPDATE_CONSIGNMENT => {
                let snapshot =
                    ConsignmentSnapshot::from_payload(&event.payload).map_err(|e| {
                        SyncError::Apply {
                            event_id: event.event_id,
                            message: format!("malformed payload: {e}"),
                        }
                    })?;
                self.store.upsert_consignment(&snapshot.record)?;
                self.link_snapshot_attachments(&snapshot)?;
            }
            event_types::DELETE_CONSIGNMENT => {
                let target = if event.element_id.is_nil() {
                    event.mobile_event_id
                } else {
                    event.element_id
                };
                self.store.delete_consignment(target)?;
            }
            other => {
                return Err(SyncError::Apply {
                    event_id: event.event_id,
                    message: format!("unknown event type '{other}'"),
                });
            }
        }
        Ok(())
    }

    fn link_snapshot_attachments(&self, snapshot: &ConsignmentSnapshot) -> SyncResult<()> {
        for path in &snapshot.attachments {
            let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
            self.store.link_attachment(&AttachmentLink {
                path: path.clone(),
                consignment_id: snapshot.record.id,
                file_name,
                synced: true,
            })?;
        }
        Ok(())
    }
}

impl SyncApplier for StoreApplier {
    fn pending_events(&self) -> SyncResult<Vec<EventRecord>> {
        Ok(self.store.pending_events()?)
    }

    fn remove_event(&self, event_id: Uuid) -> SyncResult<bool> {
        Ok(self.store.remove_event(event_id)?)
    }

    fn apply_remote_events(&self, events: &[EventRecord]) -> SyncResult<usize> {
        for event in events {
            self.apply_one(event)?;
            tracing::debug!(event_id = %event.event_id, event_type = %event.event_type, "remote event applied");
        }
        Ok(events.len())
    }

    fn load_snapshot(&self, records: &[SnapshotRecord]) -> SyncResult<usize> {
        let mut loaded = 0;
        for record in records {
            if record.data_type != Consignment::DATA_TYPE {
                tracing::warn!(data_type = %record.data_type, "skipping unknown snapshot kind");
                continue;
            }
            let snapshot =
                ConsignmentSnapshot::from_payload(&record.payload).map_err(|e| {
                    SyncError::Apply {
                        event_id: Uuid::nil(),
                        message: format!("malformed snapshot record: {e}"),
                    }
                })?;
            self.store.upsert_consignment(&snapshot.record)?;
            self.link_snapshot_attachments(&snapshot)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    fn cursor(&self, client_id: Uuid) -> SyncResult<SyncCursor> {
        Ok(self.store.cursor(client_id)?)
    }

    fn save_cursor(&self, cursor: &SyncCursor) -> SyncResult<()> {
        Ok(self.store.save_cursor(cursor)?)
    }

    fn unsynced_attachments(&self) -> SyncResult<Vec<AttachmentLink>> {
        Ok(self.store.unsynced_attachments()?)
    }

    fn synced_attachments(&self) -> SyncResult<Vec<AttachmentLink>> {
        Ok(self.store.synced_attachments()?)
    }

    fn read_attachment(&self, path: &str) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.files.read(path)?)
    }

    fn write_attachment(&self, path: &str, bytes: &[u8]) -> SyncResult<()> {
        Ok(self.files.write(path, bytes)?)
    }

    fn attachment_exists(&self, path: &str) -> SyncResult<bool> {
        Ok(self.files.exists(path)?)
    }

    fn mark_attachment_synced(&self, path: &str) -> SyncResult<bool> {
        Ok(self.store.mark_attachment_synced(path)?)
    }

    fn reset(&self) -> SyncResult<()> {
        Ok(self.store.reset()?)
    }
}

/// An in-memory applier for unit tests.
#[derive(Default)]
pub struct MemoryApplier {
    outbox: Mutex<Vec<EventRecord>>,
    applied: Mutex<Vec<EventRecord>>,
    snapshots: Mutex<Vec<SnapshotRecord>>,
    cursors: Mutex<HashMap<Uuid, SyncCursor>>,
    links: Mutex<Vec<AttachmentLink>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryApplier {
    /// Creates an empty applier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a pending outbox event.
    pub fn add_pending(&self, event: EventRecord) {
        self.outbox.lock().push(event);
    }

    /// Adds an attachment link.
    pub fn add_link(&self, link: AttachmentLink) {
        self.links.lock().push(link);
    }

    /// Adds a local file.
    pub fn add_file(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().insert(path.into(), bytes);
    }

    /// Events applied through [`SyncApplier::apply_remote_events`].
    pub fn applied(&self) -> Vec<EventRecord> {
        self.applied.lock().clone()
    }

    /// Snapshot records loaded through [`SyncApplier::load_snapshot`].
    pub fn loaded_snapshots(&self) -> Vec<SnapshotRecord> {
        self.snapshots.lock().clone()
    }

    /// Current attachment links.
    pub fn links(&self) -> Vec<AttachmentLink> {
        self.links.lock().clone()
    }
}

impl SyncApplier for MemoryApplier {
    fn pending_events(&self) -> SyncResult<Vec<EventRecord>> {
        Ok(self.outbox.lock().clone())
    }

    fn remove_event(&self, event_id: Uuid) -> SyncResult<bool> {
        let mut outbox = self.outbox.lock();
        let before = outbox.len();
        outbox.retain(|e| e.event_id != event_id);
        Ok(outbox.len() < before)
    }

    fn apply_remote_events(&self, events: &[EventRecord]) -> SyncResult<usize> {
        self.applied.lock().extend(events.iter().cloned());
        Ok(events.len())
    }

    fn load_snapshot(&self, records: &[SnapshotRecord]) -> SyncResult<usize> {
        self.snapshots.lock().extend(records.iter().cloned());
        Ok(records.len())
    }

    fn cursor(&self, client_id: Uuid) -> SyncResult<SyncCursor> {
        Ok(self
            .cursors
            .lock()
            .get(&client_id)
            .cloned()
            .unwrap_or_else(|| SyncCursor::new(client_id)))
    }

    fn save_cursor(&self, cursor: &SyncCursor) -> SyncResult<()> {
        self.cursors.lock().insert(cursor.client_id, cursor.clone());
        Ok(())
    }

    fn unsynced_attachments(&self) -> SyncResult<Vec<AttachmentLink>> {
        Ok(self.links.lock().iter().filter(|l| !l.synced).cloned().collect())
    }

    fn synced_attachments(&self) -> SyncResult<Vec<AttachmentLink>> {
        Ok(self.links.lock().iter().filter(|l| l.synced).cloned().collect())
    }

    fn read_attachment(&self, path: &str) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.files.lock().get(path).cloned())
    }

    fn write_attachment(&self, path: &str, bytes: &[u8]) -> SyncResult<()> {
        self.files.lock().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn attachment_exists(&self, path: &str) -> SyncResult<bool> {
        Ok(self.files.lock().contains_key(path))
    }

    fn mark_attachment_synced(&self, path: &str) -> SyncResult<bool> {
        let mut links = self.links.lock();
        for link in links.iter_mut() {
            if link.path == path {
                link.synced = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset(&self) -> SyncResult<()> {
        self.outbox.lock().clear();
        self.applied.lock().clear();
        self.snapshots.lock().clear();
        self.cursors.lock().clear();
        self.links.lock().clear();
        self.files.lock().clear();
        Ok(())
    }
}

//! The event outbox: a durable, ordered log of pending local mutations.

use crate::error::{StoreError, StoreResult};
use crate::transform::ValueTransform;
use chrono::{DateTime, Utc};
use fieldsync_protocol::{EventRecord, EventStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Repository over the `outbox_events` table.
///
/// Rows are returned in insertion order: causally later edits for the same
/// entity must never be transmitted before earlier ones.
pub struct OutboxRepository<'a> {
    conn: &'a Connection,
    transform: &'a dyn ValueTransform,
}

impl<'a> OutboxRepository<'a> {
    /// Creates a repository over the given connection.
    pub fn new(conn: &'a Connection, transform: &'a dyn ValueTransform) -> Self {
        Self { conn, transform }
    }

    /// Appends an event to the outbox.
    ///
    /// Assigns `event_id` if nil, forces `status` to Idle and stamps
    /// `emitted_at`/`saved_at`. The caller's record is updated in place so
    /// it reflects what was persisted.
    pub fn append(&self, event: &mut EventRecord) -> StoreResult<()> {
        if event.event_id.is_nil() {
            event.event_id = Uuid::new_v4();
        }
        event.status = EventStatus::Idle;
        let now = Utc::now();
        event.emitted_at = now;
        event.saved_at = now;

        let payload = self.transform.seal(&event.payload)?;
        let conflict_payload = event
            .conflict_payload
            .as_deref()
            .map(|p| self.transform.seal(p))
            .transpose()?;

        self.conn.execute(
            "INSERT INTO outbox_events (
                event_id, mobile_event_id, element_id, event_type, data_type,
                status, emitted_at, saved_at, payload, conflict_payload, metadata
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                event.event_id.to_string(),
                event.mobile_event_id.to_string(),
                event.element_id.to_string(),
                event.event_type,
                event.data_type,
                event.status.to_code(),
                event.emitted_at.to_rfc3339(),
                event.saved_at.to_rfc3339(),
                payload,
                conflict_payload,
                event.metadata,
            ],
        )?;

        tracing::debug!(event_id = %event.event_id, event_type = %event.event_type, "outbox append");
        Ok(())
    }

    /// Returns all pending events in insertion order.
    pub fn list_all(&self) -> StoreResult<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, mobile_event_id, element_id, event_type, data_type,
                    status, emitted_at, saved_at, payload, conflict_payload, metadata
             FROM outbox_events
             ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map([], Self::raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|raw| self.into_event(raw))
            .collect::<StoreResult<Vec<_>>>()
    }

    /// Looks up a single pending event.
    pub fn get(&self, event_id: Uuid) -> StoreResult<Option<EventRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT event_id, mobile_event_id, element_id, event_type, data_type,
                        status, emitted_at, saved_at, payload, conflict_payload, metadata
                 FROM outbox_events
                 WHERE event_id = ?1",
                params![event_id.to_string()],
                Self::raw_row,
            )
            .optional()?;

        raw.map(|raw| self.into_event(raw)).transpose()
    }

    /// Deletes a row. Returns `false` for a missing row; never errors on
    /// absence.
    pub fn remove(&self, event_id: Uuid) -> StoreResult<bool> {
        let affected = self.conn.execute(
            "DELETE FROM outbox_events WHERE event_id = ?1",
            params![event_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Number of pending events.
    pub fn count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM outbox_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Rewrites target identifiers from `old` to `new` on pending rows.
    ///
    /// Part of the identifier-remap cascade: zero affected rows on a
    /// repeated run.
    pub fn retarget(&self, old: Uuid, new: Uuid) -> StoreResult<usize> {
        let old = old.to_string();
        let new = new.to_string();
        let mut affected = self.conn.execute(
            "UPDATE outbox_events SET mobile_event_id = ?1 WHERE mobile_event_id = ?2",
            params![new, old],
        )?;
        affected += self.conn.execute(
            "UPDATE outbox_events SET element_id = ?1 WHERE element_id = ?2",
            params![new, old],
        )?;
        Ok(affected)
    }

    fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
        Ok(RawEvent {
            event_id: row.get(0)?,
            mobile_event_id: row.get(1)?,
            element_id: row.get(2)?,
            event_type: row.get(3)?,
            data_type: row.get(4)?,
            status: row.get(5)?,
            emitted_at: row.get(6)?,
            saved_at: row.get(7)?,
            payload: row.get(8)?,
            conflict_payload: row.get(9)?,
            metadata: row.get(10)?,
        })
    }

    fn into_event(&self, raw: RawEvent) -> StoreResult<EventRecord> {
        let payload = self.transform.open(&raw.payload)?;
        let conflict_payload = raw
            .conflict_payload
            .as_deref()
            .map(|p| self.transform.open(p))
            .transpose()?;

        Ok(EventRecord {
            event_id: parse_uuid(&raw.event_id)?,
            mobile_event_id: parse_uuid(&raw.mobile_event_id)?,
            element_id: parse_uuid(&raw.element_id)?,
            event_type: raw.event_type,
            data_type: raw.data_type,
            status: EventStatus::from_code(raw.status)
                .ok_or_else(|| StoreError::corrupt_row(format!("status code {}", raw.status)))?,
            emitted_at: parse_time(&raw.emitted_at)?,
            saved_at: parse_time(&raw.saved_at)?,
            payload,
            conflict_payload,
            metadata: raw.metadata,
            last_sync_event: None,
        })
    }
}

struct RawEvent {
    event_id: String,
    mobile_event_id: String,
    element_id: String,
    event_type: String,
    data_type: Option<String>,
    status: u8,
    emitted_at: String,
    saved_at: String,
    payload: String,
    conflict_payload: Option<String>,
    metadata: Option<String>,
}

pub(crate) fn parse_uuid(text: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(text).map_err(|_| StoreError::corrupt_row(format!("uuid '{text}'")))
}

pub(crate) fn parse_time(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::corrupt_row(format!("timestamp '{text}'")))
}

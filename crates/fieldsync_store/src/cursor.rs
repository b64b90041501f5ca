//! Per-client sync cursor persistence.

use crate::error::StoreResult;
use crate::models::SyncCursor;
use crate::outbox::parse_uuid;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Repository over the `sync_cursors` table.
pub struct CursorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> CursorRepository<'a> {
    /// Creates a repository over the given connection.
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Loads the cursor for a client, defaulting to an uninitialized one.
    pub fn load(&self, client_id: Uuid) -> StoreResult<SyncCursor> {
        let raw = self
            .conn
            .query_row(
                "SELECT last_event_synced, initialized FROM sync_cursors WHERE client_id = ?1",
                params![client_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, i32>(1)? != 0,
                    ))
                },
            )
            .optional()?;

        match raw {
            Some((last, initialized)) => Ok(SyncCursor {
                client_id,
                last_event_synced: last.as_deref().map(parse_uuid).transpose()?,
                initialized,
            }),
            None => Ok(SyncCursor::new(client_id)),
        }
    }

    /// All known cursors.
    pub fn list(&self) -> StoreResult<Vec<SyncCursor>> {
        let mut stmt = self.conn.prepare(
            "SELECT client_id, last_event_synced, initialized FROM sync_cursors ORDER BY client_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i32>(2)? != 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(client, last, initialized)| {
                Ok(SyncCursor {
                    client_id: parse_uuid(&client)?,
                    last_event_synced: last.as_deref().map(parse_uuid).transpose()?,
                    initialized,
                })
            })
            .collect()
    }

    /// Persists the cursor, inserting the row on first save.
    pub fn save(&self, cursor: &SyncCursor) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO sync_cursors (client_id, last_event_synced, initialized)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(client_id) DO UPDATE SET
                last_event_synced = excluded.last_event_synced,
                initialized = excluded.initialized",
            params![
                cursor.client_id.to_string(),
                cursor.last_event_synced.map(|id| id.to_string()),
                i32::from(cursor.initialized),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn load_defaults_to_uninitialized() {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        let repo = CursorRepository::new(&conn);

        let client = Uuid::new_v4();
        let cursor = repo.load(client).unwrap();
        assert_eq!(cursor.client_id, client);
        assert!(cursor.last_event_synced.is_none());
        assert!(!cursor.initialized);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        let repo = CursorRepository::new(&conn);

        let mut cursor = SyncCursor::new(Uuid::new_v4());
        cursor.last_event_synced = Some(Uuid::new_v4());
        cursor.initialized = true;
        repo.save(&cursor).unwrap();

        let loaded = repo.load(cursor.client_id).unwrap();
        assert_eq!(loaded, cursor);

        cursor.last_event_synced = Some(Uuid::new_v4());
        repo.save(&cursor).unwrap();
        assert_eq!(repo.load(cursor.client_id).unwrap(), cursor);
    }
}

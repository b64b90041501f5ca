//! Schema initialization.

use crate::error::StoreResult;
use rusqlite::Connection;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS outbox_events (
        event_id TEXT NOT NULL PRIMARY KEY,
        mobile_event_id TEXT NOT NULL,
        element_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        data_type TEXT,
        status INTEGER NOT NULL,
        emitted_at TEXT NOT NULL,
        saved_at TEXT NOT NULL,
        payload TEXT NOT NULL,
        conflict_payload TEXT,
        metadata TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_outbox_mobile_event_id
        ON outbox_events(mobile_event_id);
    CREATE INDEX IF NOT EXISTS idx_outbox_element_id
        ON outbox_events(element_id);
    CREATE INDEX IF NOT EXISTS idx_outbox_event_type
        ON outbox_events(event_type);

    CREATE TABLE IF NOT EXISTS sync_cursors (
        client_id TEXT NOT NULL PRIMARY KEY,
        last_event_synced TEXT,
        initialized INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS consignments (
        id TEXT NOT NULL PRIMARY KEY,
        reference TEXT NOT NULL,
        weight_kg REAL NOT NULL,
        volume_m3 REAL NOT NULL,
        tare_kg REAL NOT NULL,
        conflict_of TEXT,
        modified_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_consignments_conflict_of
        ON consignments(conflict_of);

    CREATE TABLE IF NOT EXISTS attachments (
        path TEXT NOT NULL PRIMARY KEY,
        consignment_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (consignment_id) REFERENCES consignments(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_attachments_consignment_id
        ON attachments(consignment_id);
    CREATE INDEX IF NOT EXISTS idx_attachments_synced
        ON attachments(synced);
";

/// Applies pragmas and creates all tables and indexes if absent.
pub fn initialize(conn: &Connection) -> StoreResult<()> {
    // journal_mode answers with the resulting mode.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Deletes every row from every table, including cursors.
///
/// The next sync cycle after a reset behaves as first-time initialization.
pub fn clear_all(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "DELETE FROM attachments;
         DELETE FROM consignments;
         DELETE FROM outbox_events;
         DELETE FROM sync_cursors;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('outbox_events', 'sync_cursors', 'consignments', 'attachments')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn clear_all_empties_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO sync_cursors (client_id, last_event_synced, initialized)
             VALUES ('c', NULL, 1)",
            [],
        )
        .unwrap();

        clear_all(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_cursors", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

//! Consignment projection repository.

use crate::error::StoreResult;
use crate::models::Consignment;
use crate::outbox::{parse_time, parse_uuid};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Repository over the `consignments` table.
pub struct ConsignmentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ConsignmentRepository<'a> {
    /// Creates a repository over the given connection.
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts or replaces a consignment row.
    pub fn upsert(&self, consignment: &Consignment) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO consignments (id, reference, weight_kg, volume_m3, tare_kg, conflict_of, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                reference = excluded.reference,
                weight_kg = excluded.weight_kg,
                volume_m3 = excluded.volume_m3,
                tare_kg = excluded.tare_kg,
                conflict_of = excluded.conflict_of,
                modified_at = excluded.modified_at",
            params![
                consignment.id.to_string(),
                consignment.reference,
                consignment.weight_kg,
                consignment.volume_m3,
                consignment.tare_kg,
                consignment.conflict_of.map(|id| id.to_string()),
                consignment.modified_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Looks up a consignment by identifier.
    pub fn get(&self, id: Uuid) -> StoreResult<Option<Consignment>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, reference, weight_kg, volume_m3, tare_kg, conflict_of, modified_at
                 FROM consignments WHERE id = ?1",
                params![id.to_string()],
                Self::raw_row,
            )
            .optional()?;
        raw.map(Self::into_consignment).transpose()
    }

    /// Returns all consignments, most recently modified first.
    pub fn list(&self) -> StoreResult<Vec<Consignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reference, weight_kg, volume_m3, tare_kg, conflict_of, modified_at
             FROM consignments ORDER BY modified_at DESC",
        )?;
        let rows = stmt
            .query_map([], Self::raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::into_consignment).collect()
    }

    /// Deletes a consignment; attachment links cascade.
    pub fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let affected = self.conn.execute(
            "DELETE FROM consignments WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Number of live consignments.
    pub fn count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM consignments", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Rewrites the primary identifier in place (update, not
    /// delete-and-insert, so foreign keys stay intact) and cascades to
    /// `conflict_of` back-references. Zero affected rows on a repeated run.
    pub fn remap_id(&self, old: Uuid, new: Uuid) -> StoreResult<usize> {
        let old = old.to_string();
        let new = new.to_string();
        let mut affected = self.conn.execute(
            "UPDATE consignments SET id = ?1 WHERE id = ?2",
            params![new, old],
        )?;
        affected += self.conn.execute(
            "UPDATE consignments SET conflict_of = ?1 WHERE conflict_of = ?2",
            params![new, old],
        )?;
        Ok(affected)
    }

    fn raw_row(
        row: &Row<'_>,
    ) -> rusqlite::Result<(String, String, f64, f64, f64, Option<String>, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn into_consignment(
        raw: (String, String, f64, f64, f64, Option<String>, String),
    ) -> StoreResult<Consignment> {
        let (id, reference, weight_kg, volume_m3, tare_kg, conflict_of, modified_at) = raw;
        Ok(Consignment {
            id: parse_uuid(&id)?,
            reference,
            weight_kg,
            volume_m3,
            tare_kg,
            conflict_of: conflict_of.as_deref().map(parse_uuid).transpose()?,
            modified_at: parse_time(&modified_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn upsert_then_get() {
        let conn = setup();
        let repo = ConsignmentRepository::new(&conn);

        let mut consignment = Consignment::new("CN-1");
        consignment.weight_kg = 12.0;
        repo.upsert(&consignment).unwrap();

        let fetched = repo.get(consignment.id).unwrap().unwrap();
        assert_eq!(fetched, consignment);

        consignment.weight_kg = 14.5;
        repo.upsert(&consignment).unwrap();
        let fetched = repo.get(consignment.id).unwrap().unwrap();
        assert_eq!(fetched.weight_kg, 14.5);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn delete_cascades_attachments() {
        let conn = setup();
        let repo = ConsignmentRepository::new(&conn);

        let consignment = Consignment::new("CN-2");
        repo.upsert(&consignment).unwrap();
        conn.execute(
            "INSERT INTO attachments (path, consignment_id, file_name, synced)
             VALUES ('a/b.jpg', ?1, 'b.jpg', 0)",
            params![consignment.id.to_string()],
        )
        .unwrap();

        assert!(repo.delete(consignment.id).unwrap());

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM attachments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn remap_id_updates_row_and_back_references() {
        let conn = setup();
        let repo = ConsignmentRepository::new(&conn);

        let original = Consignment::new("CN-3");
        repo.upsert(&original).unwrap();

        let mut sibling = Consignment::new("CN-3 (conflict)");
        sibling.conflict_of = Some(original.id);
        repo.upsert(&sibling).unwrap();

        let confirmed = Uuid::new_v4();
        let affected = repo.remap_id(original.id, confirmed).unwrap();
        assert_eq!(affected, 2);

        assert!(repo.get(original.id).unwrap().is_none());
        assert!(repo.get(confirmed).unwrap().is_some());
        let sibling = repo.get(sibling.id).unwrap().unwrap();
        assert_eq!(sibling.conflict_of, Some(confirmed));

        // Re-running the cascade touches nothing.
        assert_eq!(repo.remap_id(original.id, confirmed).unwrap(), 0);
    }
}

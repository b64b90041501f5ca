//! Attachment link index.

use crate::error::StoreResult;
use crate::models::AttachmentLink;
use crate::outbox::parse_uuid;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Repository over the `attachments` table.
///
/// A link associates a consignment with a file stored under the attachment
/// root by relative path. The `synced` flag records whether the file content
/// is consistent with the authority; the transfer pipeline is restartable
/// from these flags alone.
pub struct AttachmentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> AttachmentRepository<'a> {
    /// Creates a repository over the given connection.
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts a link, or updates its sync flag if the path is already
    /// linked.
    pub fn link(&self, link: &AttachmentLink) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO attachments (path, consignment_id, file_name, synced)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                consignment_id = excluded.consignment_id,
                file_name = excluded.file_name,
                synced = excluded.synced",
            params![
                link.path,
                link.consignment_id.to_string(),
                link.file_name,
                i32::from(link.synced),
            ],
        )?;
        Ok(())
    }

    /// Removes a link by path.
    pub fn unlink(&self, path: &str) -> StoreResult<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM attachments WHERE path = ?1", params![path])?;
        Ok(affected > 0)
    }

    /// Links awaiting upload, in path order.
    pub fn list_unsynced(&self) -> StoreResult<Vec<AttachmentLink>> {
        self.query(
            "SELECT path, consignment_id, file_name, synced
             FROM attachments WHERE synced = 0 ORDER BY path",
        )
    }

    /// Links whose content the authority already holds, in path order.
    pub fn list_synced(&self) -> StoreResult<Vec<AttachmentLink>> {
        self.query(
            "SELECT path, consignment_id, file_name, synced
             FROM attachments WHERE synced = 1 ORDER BY path",
        )
    }

    /// All links for one consignment.
    pub fn list_for(&self, consignment_id: Uuid) -> StoreResult<Vec<AttachmentLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, consignment_id, file_name, synced
             FROM attachments WHERE consignment_id = ?1 ORDER BY path",
        )?;
        let rows = stmt
            .query_map(params![consignment_id.to_string()], Self::raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::into_link).collect()
    }

    /// Flips the sync flag after a completed transfer. Returns `false` for
    /// an unknown path.
    pub fn mark_synced(&self, path: &str) -> StoreResult<bool> {
        let affected = self.conn.execute(
            "UPDATE attachments SET synced = 1 WHERE path = ?1",
            params![path],
        )?;
        Ok(affected > 0)
    }

    /// Number of links awaiting upload.
    pub fn unsynced_count(&self) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attachments WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Rewrites owner identifiers from `old` to `new`. Zero affected rows
    /// on a repeated run.
    pub fn retarget(&self, old: Uuid, new: Uuid) -> StoreResult<usize> {
        let affected = self.conn.execute(
            "UPDATE attachments SET consignment_id = ?1 WHERE consignment_id = ?2",
            params![new.to_string(), old.to_string()],
        )?;
        Ok(affected)
    }

    fn query(&self, sql: &str) -> StoreResult<Vec<AttachmentLink>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], Self::raw_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::into_link).collect()
    }

    fn raw_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, i32)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn into_link(raw: (String, String, String, i32)) -> StoreResult<AttachmentLink> {
        let (path, consignment_id, file_name, synced) = raw;
        Ok(AttachmentLink {
            path,
            consignment_id: parse_uuid(&consignment_id)?,
            file_name,
            synced: synced != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consignments::ConsignmentRepository;
    use crate::models::Consignment;
    use crate::schema;

    fn setup() -> (Connection, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        let consignment = Consignment::new("CN-1");
        ConsignmentRepository::new(&conn)
            .upsert(&consignment)
            .unwrap();
        let id = consignment.id;
        (conn, id)
    }

    fn make_link(owner: Uuid, path: &str, synced: bool) -> AttachmentLink {
        AttachmentLink {
            path: path.into(),
            consignment_id: owner,
            file_name: path.rsplit('/').next().unwrap_or(path).into(),
            synced,
        }
    }

    #[test]
    fn link_and_partition_by_flag() {
        let (conn, owner) = setup();
        let repo = AttachmentRepository::new(&conn);

        repo.link(&make_link(owner, "cn1/a.jpg", false)).unwrap();
        repo.link(&make_link(owner, "cn1/b.jpg", true)).unwrap();

        assert_eq!(repo.list_unsynced().unwrap().len(), 1);
        assert_eq!(repo.list_synced().unwrap().len(), 1);
        assert_eq!(repo.unsynced_count().unwrap(), 1);
        assert_eq!(repo.list_for(owner).unwrap().len(), 2);
    }

    #[test]
    fn mark_synced_moves_link_across() {
        let (conn, owner) = setup();
        let repo = AttachmentRepository::new(&conn);

        repo.link(&make_link(owner, "cn1/a.jpg", false)).unwrap();
        assert!(repo.mark_synced("cn1/a.jpg").unwrap());
        assert!(!repo.mark_synced("cn1/missing.jpg").unwrap());

        assert!(repo.list_unsynced().unwrap().is_empty());
        assert_eq!(repo.list_synced().unwrap().len(), 1);
    }

    #[test]
    fn retarget_rewrites_owner() {
        let (conn, owner) = setup();
        let repo = AttachmentRepository::new(&conn);
        repo.link(&make_link(owner, "cn1/a.jpg", false)).unwrap();

        let confirmed = Uuid::new_v4();
        ConsignmentRepository::new(&conn)
            .upsert(&Consignment {
                id: confirmed,
                ..Consignment::new("CN-1")
            })
            .unwrap();

        assert_eq!(repo.retarget(owner, confirmed).unwrap(), 1);
        assert_eq!(repo.retarget(owner, confirmed).unwrap(), 0);
        assert_eq!(repo.list_for(confirmed).unwrap().len(), 1);
    }
}

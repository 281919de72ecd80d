use super::models::{FileBasicInfo, FileDetailInfo, ImageFile, TableData, Visibility};
use super::Catalog;
use crate::error::{AppError, AppResult};
use chrono::Utc;

impl Catalog {
    pub fn add_file(
        &self,
        kb_id: i64,
        owner_id: i64,
        visibility: Visibility,
        source: &str,
        size_bytes: i64,
    ) -> AppResult<i64> {
        // A file's parent KB must exist; an orphaned file would leave
        // deletion invariants unsatisfiable.
        self.get_knowledge_base(kb_id)?;
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO file_basic_info (kb_id, owner_id, visibility, source, size_bytes, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![kb_id, owner_id, visibility.as_str(), source, size_bytes, now],
        )?;
        let file_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO file_detail_info (file_id) VALUES (?1)",
            [file_id],
        )?;
        Ok(file_id)
    }

    pub fn get_file(&self, file_id: i64) -> AppResult<FileBasicInfo> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, kb_id, owner_id, visibility, source, size_bytes, uploaded_at
             FROM file_basic_info WHERE id = ?1",
            [file_id],
            |row| {
                let visibility: String = row.get(3)?;
                Ok(FileBasicInfo {
                    id: row.get(0)?,
                    kb_id: row.get(1)?,
                    owner_id: row.get(2)?,
                    visibility: Visibility::parse(&visibility),
                    source: row.get(4)?,
                    size_bytes: row.get(5)?,
                    uploaded_at: row.get(6)?,
                })
            },
        )
        .map_err(|_| AppError::not_found(format!("file {file_id} not found")))
    }

    pub fn update_file_detail(&self, detail: &FileDetailInfo) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE file_detail_info
             SET title = ?2, summary = ?3, authors = ?4, category = ?5, table_of_contents = ?6
             WHERE file_id = ?1",
            rusqlite::params![
                detail.file_id,
                detail.title,
                detail.summary,
                detail.authors,
                detail.category,
                detail.table_of_contents,
            ],
        )?;
        Ok(())
    }

    pub fn list_files_for_kb(&self, kb_id: i64) -> AppResult<Vec<FileBasicInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kb_id, owner_id, visibility, source, size_bytes, uploaded_at
             FROM file_basic_info WHERE kb_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([kb_id], |row| {
                let visibility: String = row.get(3)?;
                Ok(FileBasicInfo {
                    id: row.get(0)?,
                    kb_id: row.get(1)?,
                    owner_id: row.get(2)?,
                    visibility: Visibility::parse(&visibility),
                    source: row.get(4)?,
                    size_bytes: row.get(5)?,
                    uploaded_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn list_file_ids_for_kb(&self, kb_id: i64) -> AppResult<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM file_basic_info WHERE kb_id = ?1")?;
        let ids = stmt.query_map([kb_id], |row| row.get(0))?.collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Deletes the catalog-side rows for a file: basic info, detail info,
    /// and its image/table-data side-tables. Callers are responsible for
    /// cascading into the vector/inverted/graph stores — the catalog
    /// cannot see those stores' internal partitioning.
    pub(crate) fn delete_file_catalog_rows(&self, file_id: i64) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM image_file WHERE file_id = ?1", [file_id])?;
        conn.execute("DELETE FROM table_data WHERE file_id = ?1", [file_id])?;
        conn.execute("DELETE FROM file_detail_info WHERE file_id = ?1", [file_id])?;
        conn.execute("DELETE FROM file_basic_info WHERE id = ?1", [file_id])?;
        Ok(())
    }

    pub fn delete_file(&self, owner_id: i64, file_id: i64) -> AppResult<()> {
        let file = self.get_file(file_id)?;
        if file.owner_id != owner_id {
            return Err(AppError::authorization("caller does not own this file"));
        }
        self.delete_file_catalog_rows(file_id)
    }

    pub fn add_image(&self, file_id: i64, path: &str, caption: Option<&str>) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO image_file (file_id, path, caption) VALUES (?1, ?2, ?3)",
            rusqlite::params![file_id, path, caption],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_images(&self, file_id: i64) -> AppResult<Vec<ImageFile>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, file_id, path, caption FROM image_file WHERE file_id = ?1")?;
        let rows = stmt
            .query_map([file_id], |row| {
                Ok(ImageFile {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    path: row.get(2)?,
                    caption: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn add_table_data(&self, file_id: i64, sheet_name: &str, csv_snapshot: &str) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO table_data (file_id, sheet_name, csv_snapshot) VALUES (?1, ?2, ?3)",
            rusqlite::params![file_id, sheet_name, csv_snapshot],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_table_data(&self, file_id: i64) -> AppResult<Vec<TableData>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_id, sheet_name, csv_snapshot FROM table_data WHERE file_id = ?1",
        )?;
        let rows = stmt
            .query_map([file_id], |row| {
                Ok(TableData {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    sheet_name: row.get(2)?,
                    csv_snapshot: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_files_by_kb_and_visibility(
        &self,
        kb_id: i64,
        visibility: Visibility,
    ) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM file_basic_info WHERE kb_id = ?1 AND visibility = ?2",
            rusqlite::params![kb_id, visibility.as_str()],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Catalog, i64, i64) {
        let catalog = Catalog::open_in_memory().unwrap();
        let uid = catalog.register_user("alice", "pw").unwrap();
        let kb_id = catalog.create_knowledge_base(uid, "docs", None).unwrap();
        (catalog, uid, kb_id)
    }

    #[test]
    fn add_and_get_file() {
        let (catalog, uid, kb_id) = setup();
        let file_id = catalog
            .add_file(kb_id, uid, Visibility::Private, "intro.txt", 128)
            .unwrap();
        let file = catalog.get_file(file_id).unwrap();
        assert_eq!(file.kb_id, kb_id);
        assert_eq!(file.visibility, Visibility::Private);
    }

    #[test]
    fn delete_file_requires_ownership() {
        let (catalog, uid, kb_id) = setup();
        let bob = catalog.register_user("bob", "pw").unwrap();
        let file_id = catalog.add_file(kb_id, uid, Visibility::Public, "f.txt", 1).unwrap();
        assert!(catalog.delete_file(bob, file_id).is_err());
        assert!(catalog.delete_file(uid, file_id).is_ok());
        assert!(catalog.get_file(file_id).is_err());
    }

    #[test]
    fn delete_knowledge_base_cascades_files() {
        let (catalog, uid, kb_id) = setup();
        let file_id = catalog.add_file(kb_id, uid, Visibility::Public, "f.txt", 1).unwrap();
        let deleted = catalog.delete_knowledge_base(uid, kb_id).unwrap();
        assert_eq!(deleted, vec![file_id]);
        assert!(catalog.get_file(file_id).is_err());
    }

    #[test]
    fn visibility_counts() {
        let (catalog, uid, kb_id) = setup();
        catalog.add_file(kb_id, uid, Visibility::Public, "a.txt", 1).unwrap();
        catalog.add_file(kb_id, uid, Visibility::Private, "b.txt", 1).unwrap();
        assert_eq!(catalog.count_files_by_kb_and_visibility(kb_id, Visibility::Public).unwrap(), 1);
        assert_eq!(catalog.count_files_by_kb_and_visibility(kb_id, Visibility::Private).unwrap(), 1);
    }
}

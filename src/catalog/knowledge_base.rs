use super::models::KnowledgeBase;
use super::Catalog;
use crate::error::{AppError, AppResult};
use chrono::Utc;

impl Catalog {
    pub fn create_knowledge_base(
        &self,
        owner_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO knowledge_base (owner_id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![owner_id, name, description, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_knowledge_base(&self, kb_id: i64) -> AppResult<KnowledgeBase> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, owner_id, name, description, created_at, updated_at
             FROM knowledge_base WHERE id = ?1",
            [kb_id],
            |row| {
                Ok(KnowledgeBase {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .map_err(|_| AppError::not_found(format!("knowledge base {kb_id} not found")))
    }

    pub fn list_knowledge_bases_for_user(&self, owner_id: i64) -> AppResult<Vec<KnowledgeBase>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, description, created_at, updated_at
             FROM knowledge_base WHERE owner_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([owner_id], |row| {
                Ok(KnowledgeBase {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns the file ids owned by the knowledge base so the caller can
    /// cascade into non-catalog stores before (or after) this catalog-side
    /// delete. The catalog delete itself removes the KB row, every file's
    /// basic/detail rows, and its images/table-data side-tables.
    pub fn delete_knowledge_base(&self, owner_id: i64, kb_id: i64) -> AppResult<Vec<i64>> {
        let kb = self.get_knowledge_base(kb_id)?;
        if kb.owner_id != owner_id {
            return Err(AppError::authorization("caller does not own this knowledge base"));
        }
        let file_ids = self.list_file_ids_for_kb(kb_id)?;
        for file_id in &file_ids {
            self.delete_file_catalog_rows(*file_id)?;
        }
        let conn = self.conn()?;
        conn.execute("DELETE FROM knowledge_base WHERE id = ?1", [kb_id])?;
        Ok(file_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_knowledge_base() {
        let catalog = Catalog::open_in_memory().unwrap();
        let uid = catalog.register_user("alice", "pw").unwrap();
        let kb_id = catalog.create_knowledge_base(uid, "docs", Some("my docs")).unwrap();
        let kb = catalog.get_knowledge_base(kb_id).unwrap();
        assert_eq!(kb.name, "docs");
        assert_eq!(kb.owner_id, uid);
    }

    #[test]
    fn delete_knowledge_base_requires_ownership() {
        let catalog = Catalog::open_in_memory().unwrap();
        let alice = catalog.register_user("alice", "pw").unwrap();
        let bob = catalog.register_user("bob", "pw").unwrap();
        let kb_id = catalog.create_knowledge_base(alice, "docs", None).unwrap();
        assert!(catalog.delete_knowledge_base(bob, kb_id).is_err());
        assert!(catalog.delete_knowledge_base(alice, kb_id).is_ok());
        assert!(catalog.get_knowledge_base(kb_id).is_err());
    }
}

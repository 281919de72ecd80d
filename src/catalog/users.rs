use super::models::User;
use super::Catalog;
use crate::auth::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use chrono::Utc;

impl Catalog {
    pub fn register_user(&self, user_name: &str, password: &str) -> AppResult<i64> {
        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM user_info WHERE user_name = ?1",
                [user_name],
                |row| row.get(0),
            )
            .ok();
        if existing.is_some() {
            return Err(AppError::validation(format!("user '{user_name}' already exists")));
        }
        let hash = hash_password(password);
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO user_info (user_name, password_hash, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_name, hash, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Direct equality check against the stored credential. No session
    /// token is minted; every subsequent request re-authenticates.
    pub fn login(&self, user_name: &str, password: &str) -> AppResult<User> {
        let user = self.get_user_by_name(user_name)?;
        if verify_password(password, &user.password_hash) {
            Ok(user)
        } else {
            Err(AppError::authorization("invalid username or password"))
        }
    }

    pub fn get_user_by_name(&self, user_name: &str) -> AppResult<User> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, user_name, password_hash, created_at FROM user_info WHERE user_name = ?1",
            [user_name],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    user_name: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .map_err(|_| AppError::not_found(format!("user '{user_name}' not found")))
    }

    /// Deletes the user along with every knowledge base, SQL-database
    /// record, and session they own. Returns the ids of
    /// the knowledge bases that were deleted so the caller can cascade
    /// into the non-catalog stores (vector/inverted/graph) for each.
    pub fn delete_user(&self, user_id: i64) -> AppResult<Vec<i64>> {
        let kb_ids = self.list_kb_ids_for_owner(user_id)?;
        let conn = self.conn()?;
        conn.execute("DELETE FROM base_sql WHERE owner_id = ?1", [user_id])?;
        conn.execute("DELETE FROM session WHERE owner_id = ?1", [user_id])?;
        conn.execute("DELETE FROM knowledge_base WHERE owner_id = ?1", [user_id])?;
        conn.execute("DELETE FROM user_info WHERE id = ?1", [user_id])?;
        Ok(kb_ids)
    }

    fn list_kb_ids_for_owner(&self, owner_id: i64) -> AppResult<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM knowledge_base WHERE owner_id = ?1")?;
        let ids = stmt
            .query_map([owner_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_login_round_trip() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.register_user("alice", "pw").unwrap();
        let user = catalog.login("alice", "pw").unwrap();
        assert_eq!(user.user_name, "alice");
        assert!(catalog.login("alice", "wrong").is_err());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.register_user("alice", "pw").unwrap();
        assert!(catalog.register_user("alice", "pw2").is_err());
    }

    #[test]
    fn delete_user_cascades_to_owned_knowledge_bases() {
        let catalog = Catalog::open_in_memory().unwrap();
        let uid = catalog.register_user("alice", "pw").unwrap();
        let kb_id = catalog.create_knowledge_base(uid, "docs", None).unwrap();
        let deleted_kbs = catalog.delete_user(uid).unwrap();
        assert_eq!(deleted_kbs, vec![kb_id]);
        assert!(catalog.get_knowledge_base(kb_id).is_err());
        assert!(catalog.get_user_by_name("alice").is_err());
    }
}

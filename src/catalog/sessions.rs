use super::models::{DiscussionStatus, DiscussionTaskRecord, SessionRecord};
use super::Catalog;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use uuid::Uuid;

impl Catalog {
    pub fn create_session(&self, owner_id: i64, name: &str, kb_name: Option<&str>) -> AppResult<String> {
        let conn = self.conn()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO session (id, owner_id, name, kb_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![id, owner_id, name, kb_name, now],
        )?;
        Ok(id)
    }

    pub fn get_session(&self, session_id: &str) -> AppResult<SessionRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, owner_id, name, kb_name, created_at, updated_at FROM session WHERE id = ?1",
            [session_id],
            |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    name: row.get(2)?,
                    kb_name: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .map_err(|_| AppError::not_found(format!("session '{session_id}' not found")))
    }

    pub fn list_sessions_for_user(&self, owner_id: i64) -> AppResult<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, kb_name, created_at, updated_at
             FROM session WHERE owner_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map([owner_id], |row| {
                Ok(SessionRecord {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    name: row.get(2)?,
                    kb_name: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn touch_session(&self, session_id: &str) -> AppResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE session SET updated_at = ?2 WHERE id = ?1",
            rusqlite::params![session_id, now],
        )?;
        Ok(())
    }

    /// Deletes a session and every discussion task recorded under it.
    /// Conversation turns themselves live outside the catalog (held by the
    /// conversation service in memory / the streaming transcript store) and
    /// are the caller's responsibility to drop alongside this call.
    pub fn delete_session(&self, owner_id: i64, session_id: &str) -> AppResult<()> {
        let session = self.get_session(session_id)?;
        if session.owner_id != owner_id {
            return Err(AppError::authorization("caller does not own this session"));
        }
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM discussion_task_record WHERE session_id = ?1",
            [session_id],
        )?;
        conn.execute("DELETE FROM session WHERE id = ?1", [session_id])?;
        Ok(())
    }

    pub fn create_discussion_task(&self, session_id: &str) -> AppResult<String> {
        self.get_session(session_id)?;
        let conn = self.conn()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO discussion_task_record (id, session_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![id, session_id, DiscussionStatus::Active.as_str(), now],
        )?;
        Ok(id)
    }

    pub fn set_discussion_task_status(&self, task_id: &str, status: DiscussionStatus) -> AppResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE discussion_task_record SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![task_id, status.as_str(), now],
        )?;
        if changed == 0 {
            return Err(AppError::not_found(format!("discussion task '{task_id}' not found")));
        }
        Ok(())
    }

    pub fn delete_discussion_task(&self, task_id: &str) -> AppResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM discussion_task_record WHERE id = ?1", [task_id])?;
        if changed == 0 {
            return Err(AppError::not_found(format!("discussion task '{task_id}' not found")));
        }
        Ok(())
    }

    pub fn list_discussion_tasks(&self, session_id: &str) -> AppResult<Vec<DiscussionTaskRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, status, created_at, updated_at
             FROM discussion_task_record WHERE session_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([session_id], |row| {
                let status: String = row.get(2)?;
                let status = if status == "completed" {
                    DiscussionStatus::Completed
                } else {
                    DiscussionStatus::Active
                };
                Ok(DiscussionTaskRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    status,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Catalog, i64) {
        let catalog = Catalog::open_in_memory().unwrap();
        let uid = catalog.register_user("alice", "pw").unwrap();
        (catalog, uid)
    }

    #[test]
    fn create_and_list_sessions() {
        let (catalog, uid) = setup();
        let sid = catalog.create_session(uid, "first chat", Some("docs")).unwrap();
        let sessions = catalog.list_sessions_for_user(uid).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, sid);
    }

    #[test]
    fn delete_session_requires_ownership() {
        let (catalog, uid) = setup();
        let bob = catalog.register_user("bob", "pw").unwrap();
        let sid = catalog.create_session(uid, "first chat", None).unwrap();
        assert!(catalog.delete_session(bob, &sid).is_err());
        assert!(catalog.delete_session(uid, &sid).is_ok());
        assert!(catalog.get_session(&sid).is_err());
    }

    #[test]
    fn discussion_task_lifecycle() {
        let (catalog, uid) = setup();
        let sid = catalog.create_session(uid, "chat", None).unwrap();
        let task_id = catalog.create_discussion_task(&sid).unwrap();
        let tasks = catalog.list_discussion_tasks(&sid).unwrap();
        assert_eq!(tasks[0].status, DiscussionStatus::Active);
        catalog.set_discussion_task_status(&task_id, DiscussionStatus::Completed).unwrap();
        let tasks = catalog.list_discussion_tasks(&sid).unwrap();
        assert_eq!(tasks[0].status, DiscussionStatus::Completed);
    }

    #[test]
    fn delete_discussion_task_removes_single_task() {
        let (catalog, uid) = setup();
        let sid = catalog.create_session(uid, "chat", None).unwrap();
        let task_id = catalog.create_discussion_task(&sid).unwrap();
        catalog.delete_discussion_task(&task_id).unwrap();
        assert!(catalog.list_discussion_tasks(&sid).unwrap().is_empty());
        assert!(catalog.delete_discussion_task(&task_id).is_err());
    }

    #[test]
    fn delete_session_cascades_discussion_tasks() {
        let (catalog, uid) = setup();
        let sid = catalog.create_session(uid, "chat", None).unwrap();
        catalog.create_discussion_task(&sid).unwrap();
        catalog.delete_session(uid, &sid).unwrap();
        assert!(catalog.list_discussion_tasks(&sid).unwrap().is_empty());
    }
}

//! Conversation service (C10).
//!
//! Sessions and discussion tasks are structured metadata owned by C1. The
//! ordered message list per session is deliberately kept outside SQLite —
//! it is the one piece of state the streaming transport rewrites on every
//! chunk, written only after the chunk has been emitted to the sink, so it
//! lives in an in-process key-value map instead of round-tripping through a
//! row update per token.

use crate::catalog::models::{DiscussionStatus, DiscussionTaskRecord, SessionRecord};
use crate::catalog::Catalog;
use crate::error::{AppError, AppResult};
use crate::streaming::AccumulatedTurn;
use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub assistant: AccumulatedTurn,
    pub created_at: String,
}

pub struct ConversationService {
    catalog: Arc<Catalog>,
    messages: DashMap<String, Vec<Turn>>,
    discussion_dir: PathBuf,
}

impl ConversationService {
    pub fn new(catalog: Arc<Catalog>, discussion_dir: PathBuf) -> Self {
        ConversationService { catalog, messages: DashMap::new(), discussion_dir }
    }

    pub fn create_session(&self, owner_id: i64, name: &str, kb_name: Option<&str>) -> AppResult<String> {
        let session_id = self.catalog.create_session(owner_id, name, kb_name)?;
        self.messages.insert(session_id.clone(), Vec::new());
        Ok(session_id)
    }

    pub fn list_sessions(&self, owner_id: i64) -> AppResult<Vec<SessionRecord>> {
        self.catalog.list_sessions_for_user(owner_id)
    }

    pub fn get_messages(&self, session_id: &str) -> AppResult<Vec<Turn>> {
        self.catalog.get_session(session_id)?;
        Ok(self.messages.get(session_id).map(|turns| turns.clone()).unwrap_or_default())
    }

    /// Appends a new turn with the user's text and an empty assistant
    /// reply, returning the turn's index for later rewrites. Called once
    /// before the first pipeline chunk is emitted.
    pub fn start_turn(&self, session_id: &str, user_text: &str) -> AppResult<usize> {
        self.catalog.get_session(session_id)?;
        self.catalog.touch_session(session_id)?;
        let mut turns = self.messages.entry(session_id.to_string()).or_default();
        turns.push(Turn {
            user_text: user_text.to_string(),
            assistant: AccumulatedTurn::default(),
            created_at: Utc::now().to_rfc3339(),
        });
        Ok(turns.len() - 1)
    }

    /// Rewrites the assistant content of `turn_index` in place. Called
    /// after every chunk and once more at stream end.
    pub fn update_turn(&self, session_id: &str, turn_index: usize, assistant: AccumulatedTurn) -> AppResult<()> {
        let mut turns = self
            .messages
            .get_mut(session_id)
            .ok_or_else(|| AppError::not_found(format!("session '{session_id}' has no message list")))?;
        let turn = turns
            .get_mut(turn_index)
            .ok_or_else(|| AppError::not_found(format!("turn {turn_index} does not exist")))?;
        turn.assistant = assistant;
        Ok(())
    }

    pub fn clear_history(&self, session_id: &str) -> AppResult<()> {
        self.catalog.get_session(session_id)?;
        self.messages.insert(session_id.to_string(), Vec::new());
        Ok(())
    }

    /// Deletes the session (cascading its discussion tasks in C1) and drops
    /// its message list and on-disk discussion-task folders.
    pub fn delete_session(&self, owner_id: i64, session_id: &str) -> AppResult<()> {
        let tasks = self.catalog.list_discussion_tasks(session_id)?;
        self.catalog.delete_session(owner_id, session_id)?;
        self.messages.remove(session_id);
        for task in tasks {
            let dir = self.discussion_dir.join(&task.id);
            let _ = std::fs::remove_dir_all(dir);
        }
        Ok(())
    }

    pub fn register_discussion_task(&self, session_id: &str) -> AppResult<String> {
        let task_id = self.catalog.create_discussion_task(session_id)?;
        let dir = self.discussion_dir.join(&task_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| AppError::pipeline_fatal(format!("failed to create discussion task dir: {e}")))?;
        Ok(task_id)
    }

    pub fn update_discussion_task(&self, task_id: &str, status: DiscussionStatus) -> AppResult<()> {
        self.catalog.set_discussion_task_status(task_id, status)
    }

    pub fn list_discussion_tasks(&self, session_id: &str) -> AppResult<Vec<DiscussionTaskRecord>> {
        self.catalog.list_discussion_tasks(session_id)
    }

    pub fn delete_discussion_task(&self, task_id: &str) -> AppResult<()> {
        self.catalog.delete_discussion_task(task_id)?;
        let dir = self.discussion_dir.join(task_id);
        let _ = std::fs::remove_dir_all(dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{AccumulatedItem, Delta, DeltaType};

    fn service() -> (ConversationService, i64, tempfile::TempDir) {
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let uid = catalog.register_user("alice", "pw").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let service = ConversationService::new(catalog, dir.path().to_path_buf());
        (service, uid, dir)
    }

    #[test]
    fn start_and_update_turn_round_trips() {
        let (service, uid, _dir) = service();
        let sid = service.create_session(uid, "chat", None).unwrap();
        let idx = service.start_turn(&sid, "hello").unwrap();
        let mut assistant = AccumulatedTurn::default();
        assistant.push(&Delta { content: "hi there".into(), delta_type: DeltaType::Text });
        service.update_turn(&sid, idx, assistant).unwrap();

        let messages = service.get_messages(&sid).unwrap();
        assert_eq!(messages[0].user_text, "hello");
        match &messages[0].assistant.items[0] {
            AccumulatedItem::Text { content } => assert_eq!(content, "hi there"),
            other => panic!("expected text item, got {other:?}"),
        }
    }

    #[test]
    fn delete_session_removes_messages_and_task_folder() {
        let (service, uid, dir) = service();
        let sid = service.create_session(uid, "chat", None).unwrap();
        service.start_turn(&sid, "hi").unwrap();
        let task_id = service.register_discussion_task(&sid).unwrap();
        assert!(dir.path().join(&task_id).exists());

        service.delete_session(uid, &sid).unwrap();
        assert!(service.get_messages(&sid).is_err());
        assert!(!dir.path().join(&task_id).exists());
    }

    #[test]
    fn clear_history_empties_messages_but_keeps_session() {
        let (service, uid, _dir) = service();
        let sid = service.create_session(uid, "chat", None).unwrap();
        service.start_turn(&sid, "hi").unwrap();
        service.clear_history(&sid).unwrap();
        assert!(service.get_messages(&sid).unwrap().is_empty());
    }

    #[test]
    fn delete_discussion_task_removes_its_folder() {
        let (service, uid, dir) = service();
        let sid = service.create_session(uid, "chat", None).unwrap();
        let task_id = service.register_discussion_task(&sid).unwrap();
        service.delete_discussion_task(&task_id).unwrap();
        assert!(!dir.path().join(&task_id).exists());
        assert!(service.list_discussion_tasks(&sid).unwrap().is_empty());
    }
}

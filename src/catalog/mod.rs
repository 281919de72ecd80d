//! Metadata catalog (C1)
//!
//! Single-writer relational store backing every other component. SQLite is
//! the only persistence format here — the ancillary indexes (vector,
//! inverted, graph) live in their own stores and are not referenced by
//! foreign keys from this schema: cascading deletes across stores are
//! explicit application-level sequences (see `delete_file`/`delete_knowledge_base`
//! in [`crate::conversation`] callers), not database foreign-key actions,
//! because this catalog cannot see the other stores' internal state.
//!
//! All timestamps are stored as ISO-8601 strings. All statements are
//! parametrised; nothing here ever formats user input into SQL text.

pub mod models;
mod users;
mod knowledge_base;
mod files;
mod sessions;
mod sql_meta;
mod schema_analysis;

use crate::error::{AppError, AppResult};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type Conn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Handle to the metadata catalog. Cheap to clone (wraps a connection pool);
/// the composition root hands one clone to every component that needs C1.
#[derive(Clone)]
pub struct Catalog {
    pool: Pool,
}

impl Catalog {
    /// Open (creating if absent) the SQLite file at `path` and run schema
    /// migrations. `conf/sqlite/knowledge_base.sqlite` is the default
    /// location per the persistent state layout.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::pipeline_fatal(format!("cannot create catalog directory: {e}"))
            })?;
        }
        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
        });
        let pool = r2d2::Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| AppError::pipeline_fatal(format!("cannot open catalog pool: {e}")))?;
        let catalog = Catalog { pool };
        catalog.migrate()?;
        Ok(catalog)
    }

    /// In-memory catalog, used by tests and by the demo CLI.
    pub fn open_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::pipeline_fatal(format!("cannot open in-memory catalog: {e}")))?;
        let catalog = Catalog { pool };
        catalog.migrate()?;
        Ok(catalog)
    }

    pub(crate) fn conn(&self) -> AppResult<Conn> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS user_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS knowledge_base (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_basic_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kb_id INTEGER NOT NULL,
    owner_id INTEGER NOT NULL,
    visibility TEXT NOT NULL,
    source TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    uploaded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_kb ON file_basic_info(kb_id);

CREATE TABLE IF NOT EXISTS file_detail_info (
    file_id INTEGER PRIMARY KEY,
    title TEXT,
    summary TEXT,
    authors TEXT,
    category TEXT,
    table_of_contents TEXT
);

CREATE TABLE IF NOT EXISTS image_file (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    caption TEXT
);
CREATE INDEX IF NOT EXISTS idx_image_file ON image_file(file_id);

CREATE TABLE IF NOT EXISTS table_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    sheet_name TEXT NOT NULL,
    csv_snapshot TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_table_data_file ON table_data(file_id);

CREATE TABLE IF NOT EXISTS session (
    id TEXT PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    kb_name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_session_owner ON session(owner_id);

CREATE TABLE IF NOT EXISTS discussion_task_record (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_discussion_session ON discussion_task_record(session_id);

CREATE TABLE IF NOT EXISTS base_sql (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    dialect TEXT NOT NULL,
    database_name TEXT NOT NULL,
    credentials TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS table_sql (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sql_id INTEGER NOT NULL,
    table_name TEXT NOT NULL,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_table_sql_sqlid ON table_sql(sql_id);

CREATE TABLE IF NOT EXISTS col_sql (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_id INTEGER NOT NULL,
    column_name TEXT NOT NULL,
    column_type TEXT NOT NULL,
    comment TEXT,
    ana_type TEXT NOT NULL DEFAULT 'attribute'
);
CREATE INDEX IF NOT EXISTS idx_col_sql_table ON col_sql(table_id);

CREATE TABLE IF NOT EXISTS rel_sql (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sql_id INTEGER NOT NULL,
    from_table TEXT NOT NULL,
    from_column TEXT NOT NULL,
    to_table TEXT NOT NULL,
    to_column TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rel_sql_sqlid ON rel_sql(sql_id);

CREATE TABLE IF NOT EXISTS sql_des (
    sql_id INTEGER NOT NULL,
    table_id INTEGER NOT NULL,
    elements_json TEXT NOT NULL,
    PRIMARY KEY (sql_id, table_id)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.migrate().unwrap();
        catalog.migrate().unwrap();
    }
}

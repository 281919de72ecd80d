//! Orchestration pipelines: agentic SQL (C7) and table-file analysis (C8).

pub mod sql;
pub mod table_file;

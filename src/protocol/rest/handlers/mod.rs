//! REST API handlers, organized by domain.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod files;
pub mod knowledge_base;
pub mod retrieval;
pub mod sessions;
pub mod sql;

//! Row types for the metadata catalog (C1).
//!
//! Every query returns one of these instead of an untyped map — the
//! "dynamic JSON everywhere" pattern the source fell into is deliberately
//! not reproduced here (see DESIGN.md).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("public") {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub user_name: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBasicInfo {
    pub id: i64,
    pub kb_id: i64,
    pub owner_id: i64,
    pub visibility: Visibility,
    pub source: String,
    pub size_bytes: i64,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDetailInfo {
    pub file_id: i64,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub authors: Option<String>,
    pub category: Option<String>,
    pub table_of_contents: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFile {
    pub id: i64,
    pub file_id: i64,
    pub path: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableData {
    pub id: i64,
    pub file_id: i64,
    pub sheet_name: String,
    pub csv_snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub owner_id: i64,
    pub name: String,
    pub kb_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionStatus {
    Active,
    Completed,
}

impl DiscussionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscussionStatus::Active => "active",
            DiscussionStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionTaskRecord {
    pub id: String,
    pub session_id: String,
    pub status: DiscussionStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseSql {
    pub id: i64,
    pub owner_id: i64,
    pub host: String,
    pub port: i64,
    pub dialect: String,
    pub database_name: String,
    pub credentials: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSql {
    pub id: i64,
    pub sql_id: i64,
    pub table_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnaType {
    Numeric,
    Attribute,
    Datetime,
}

impl AnaType {
    pub fn parse(s: &str) -> Self {
        match s {
            "numeric" => AnaType::Numeric,
            "datetime" => AnaType::Datetime,
            _ => AnaType::Attribute,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnaType::Numeric => "numeric",
            AnaType::Attribute => "attribute",
            AnaType::Datetime => "datetime",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColSql {
    pub id: i64,
    pub table_id: i64,
    pub column_name: String,
    pub column_type: String,
    pub comment: Option<String>,
    pub ana_type: AnaType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelSql {
    pub id: i64,
    pub sql_id: i64,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// One semantic role discovered for a table/column during schema analysis.
/// Tagged explicitly instead of stringly typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchemaElement {
    Entity { name: String, description: String },
    Attribute { name: String, description: String, column: String },
    UniqueIdentifier { name: String, description: String, column: String },
    Metric { name: String, description: String, column: String },
    ForeignKey { from_column: String, to_table: String, to_column: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAnalysisResult {
    pub sql_id: i64,
    pub table_id: i64,
    pub elements: Vec<SchemaElement>,
}

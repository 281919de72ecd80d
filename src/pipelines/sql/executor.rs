//! Target SQL database connectivity.
//!
//! One `SqlExecutor` per `BaseSql` record. The real implementation goes
//! through `sqlx`'s dialect-agnostic `Any` driver so the same trait covers
//! every `dialect` a [`crate::catalog::models::BaseSql`] row can name.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Column, Row, TypeInfo};

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn run(&self, sql: &str) -> Result<QueryOutcome, String>;
}

pub struct SqlxExecutor {
    pool: sqlx::AnyPool,
}

impl SqlxExecutor {
    pub async fn connect(connection_string: &str) -> Result<Self, String> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(4)
            .connect(connection_string)
            .await
            .map_err(|e| e.to_string())?;
        Ok(SqlxExecutor { pool })
    }

    fn row_to_values(row: &AnyRow) -> Vec<Value> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(i, col)| match col.type_info().name() {
                "INTEGER" | "BIGINT" | "INT" | "INT4" | "INT8" => row
                    .try_get::<i64, _>(i)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" | "FLOAT4" | "FLOAT8" => row
                    .try_get::<f64, _>(i)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                "BOOLEAN" | "BOOL" => {
                    row.try_get::<bool, _>(i).map(Value::from).unwrap_or(Value::Null)
                }
                _ => row.try_get::<String, _>(i).map(Value::from).unwrap_or(Value::Null),
            })
            .collect()
    }
}

#[async_trait]
impl SqlExecutor for SqlxExecutor {
    async fn run(&self, sql: &str) -> Result<QueryOutcome, String> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await.map_err(|e| e.to_string())?;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().map(Self::row_to_values).collect();
        Ok(QueryOutcome { columns, rows })
    }
}

/// Deterministic stand-in for tests: returns a canned outcome, or an error
/// if the SQL contains `"BADSQL"`.
pub struct MockSqlExecutor {
    pub outcome: QueryOutcome,
}

impl MockSqlExecutor {
    pub fn new(columns: Vec<&str>, rows: Vec<Vec<Value>>) -> Self {
        MockSqlExecutor {
            outcome: QueryOutcome { columns: columns.into_iter().map(String::from).collect(), rows },
        }
    }
}

#[async_trait]
impl SqlExecutor for MockSqlExecutor {
    async fn run(&self, sql: &str) -> Result<QueryOutcome, String> {
        if sql.contains("BADSQL") {
            return Err("syntax error near BADSQL".to_string());
        }
        Ok(self.outcome.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_executor_returns_canned_rows() {
        let executor = MockSqlExecutor::new(vec!["id"], vec![vec![Value::from(1)]]);
        let outcome = executor.run("SELECT id FROM t").await.unwrap();
        assert_eq!(outcome.columns, vec!["id"]);
    }

    #[tokio::test]
    async fn mock_executor_fails_on_marker() {
        let executor = MockSqlExecutor::new(vec![], vec![]);
        assert!(executor.run("SELECT BADSQL").await.is_err());
    }
}

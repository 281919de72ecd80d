use super::models::{SchemaAnalysisResult, SchemaElement};
use super::Catalog;
use crate::error::AppResult;

impl Catalog {
    /// Upserts the schema analysis result for a (sql_id, table_id) pair.
    /// Re-running analysis on the same table replaces its prior elements
    /// rather than appending duplicates.
    pub fn upsert_schema_analysis(
        &self,
        sql_id: i64,
        table_id: i64,
        elements: &[SchemaElement],
    ) -> AppResult<()> {
        let conn = self.conn()?;
        let elements_json = serde_json::to_string(elements)
            .map_err(|e| crate::error::AppError::pipeline_fatal(format!("schema element serialization failed: {e}")))?;
        conn.execute(
            "INSERT INTO sql_des (sql_id, table_id, elements_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(sql_id, table_id) DO UPDATE SET elements_json = excluded.elements_json",
            rusqlite::params![sql_id, table_id, elements_json],
        )?;
        Ok(())
    }

    pub fn get_schema_analysis(&self, sql_id: i64, table_id: i64) -> AppResult<Option<SchemaAnalysisResult>> {
        let conn = self.conn()?;
        let elements_json: Option<String> = conn
            .query_row(
                "SELECT elements_json FROM sql_des WHERE sql_id = ?1 AND table_id = ?2",
                rusqlite::params![sql_id, table_id],
                |row| row.get(0),
            )
            .ok();
        let Some(elements_json) = elements_json else {
            return Ok(None);
        };
        let elements: Vec<SchemaElement> = serde_json::from_str(&elements_json)
            .map_err(|e| crate::error::AppError::pipeline_fatal(format!("schema element deserialization failed: {e}")))?;
        Ok(Some(SchemaAnalysisResult { sql_id, table_id, elements }))
    }

    pub fn list_schema_analyses(&self, sql_id: i64) -> AppResult<Vec<SchemaAnalysisResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT table_id, elements_json FROM sql_des WHERE sql_id = ?1 ORDER BY table_id",
        )?;
        let rows = stmt
            .query_map([sql_id], |row| {
                let table_id: i64 = row.get(0)?;
                let elements_json: String = row.get(1)?;
                Ok((table_id, elements_json))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut results = Vec::with_capacity(rows.len());
        for (table_id, elements_json) in rows {
            let elements: Vec<SchemaElement> = serde_json::from_str(&elements_json).map_err(|e| {
                crate::error::AppError::pipeline_fatal(format!("schema element deserialization failed: {e}"))
            })?;
            results.push(SchemaAnalysisResult { sql_id, table_id, elements });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_prior_elements() {
        let catalog = Catalog::open_in_memory().unwrap();
        let uid = catalog.register_user("alice", "pw").unwrap();
        let sql_id = catalog
            .insert_sql_info(uid, "localhost", 5432, "postgres", "sales", "user:pass", None)
            .unwrap();
        let table_id = catalog.insert_table_sql(sql_id, "orders", None).unwrap();

        catalog
            .upsert_schema_analysis(
                sql_id,
                table_id,
                &[SchemaElement::Entity { name: "order".into(), description: "an order".into() }],
            )
            .unwrap();
        let first = catalog.get_schema_analysis(sql_id, table_id).unwrap().unwrap();
        assert_eq!(first.elements.len(), 1);

        catalog
            .upsert_schema_analysis(
                sql_id,
                table_id,
                &[
                    SchemaElement::Entity { name: "order".into(), description: "an order".into() },
                    SchemaElement::Metric {
                        name: "revenue".into(),
                        description: "total revenue".into(),
                        column: "revenue".into(),
                    },
                ],
            )
            .unwrap();
        let second = catalog.get_schema_analysis(sql_id, table_id).unwrap().unwrap();
        assert_eq!(second.elements.len(), 2);
    }

    #[test]
    fn missing_analysis_returns_none() {
        let catalog = Catalog::open_in_memory().unwrap();
        let uid = catalog.register_user("alice", "pw").unwrap();
        let sql_id = catalog
            .insert_sql_info(uid, "localhost", 5432, "postgres", "sales", "user:pass", None)
            .unwrap();
        assert!(catalog.get_schema_analysis(sql_id, 999).unwrap().is_none());
    }
}

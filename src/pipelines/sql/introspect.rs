//! Live-schema introspection for newly registered SQL connections.
//!
//! Runs dialect-specific catalog queries through the same [`SqlExecutor`]
//! used for user queries, so registering a connection needs no second pool.
//! Results feed both `table_sql`/`col_sql` (C1) and the per-column
//! schema-analysis roles that [`crate::graph::build_schema_graph`] turns
//! into graph nodes.

use crate::catalog::models::{AnaType, SchemaElement};
use crate::pipelines::sql::executor::{QueryOutcome, SqlExecutor};
use serde_json::Value;
use std::collections::HashSet;

pub struct IntrospectedColumn {
    pub name: String,
    pub data_type: String,
    pub is_primary_key: bool,
}

pub struct IntrospectedTable {
    pub name: String,
    pub columns: Vec<IntrospectedColumn>,
}

/// Lists every user table and its columns for `dialect`, skipping system
/// catalogs (`sqlite_%`, `information_schema`, `pg_catalog`).
pub async fn introspect_schema(executor: &dyn SqlExecutor, dialect: &str) -> Result<Vec<IntrospectedTable>, String> {
    match dialect.to_lowercase().as_str() {
        "sqlite" => introspect_sqlite(executor).await,
        _ => introspect_information_schema(executor).await,
    }
}

async fn introspect_sqlite(executor: &dyn SqlExecutor) -> Result<Vec<IntrospectedTable>, String> {
    let tables = executor.run("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'").await?;
    let mut result = Vec::with_capacity(tables.rows.len());
    for row in &tables.rows {
        let Some(table_name) = row.first().and_then(Value::as_str) else { continue };
        let info = executor.run(&format!("PRAGMA table_info({table_name})")).await?;
        let columns = info
            .rows
            .iter()
            .filter_map(|r| {
                let name = r.get(1)?.as_str()?.to_string();
                let data_type = r.get(2).and_then(Value::as_str).unwrap_or("text").to_string();
                let is_primary_key = r.get(5).and_then(Value::as_i64).unwrap_or(0) > 0;
                Some(IntrospectedColumn { name, data_type, is_primary_key })
            })
            .collect();
        result.push(IntrospectedTable { name: table_name.to_string(), columns });
    }
    Ok(result)
}

async fn introspect_information_schema(executor: &dyn SqlExecutor) -> Result<Vec<IntrospectedTable>, String> {
    let pk_rows = executor
        .run(
            "SELECT tc.table_name, kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY'",
        )
        .await
        .unwrap_or(QueryOutcome { columns: vec![], rows: vec![] });
    let primary_keys: HashSet<(String, String)> = pk_rows
        .rows
        .iter()
        .filter_map(|r| Some((r.first()?.as_str()?.to_string(), r.get(1)?.as_str()?.to_string())))
        .collect();

    let columns = executor
        .run(
            "SELECT table_name, column_name, data_type FROM information_schema.columns \
             WHERE table_schema NOT IN ('information_schema', 'pg_catalog') \
             ORDER BY table_name, ordinal_position",
        )
        .await?;

    let mut tables: Vec<IntrospectedTable> = Vec::new();
    for row in &columns.rows {
        let Some(table_name) = row.first().and_then(Value::as_str) else { continue };
        let Some(column_name) = row.get(1).and_then(Value::as_str) else { continue };
        let data_type = row.get(2).and_then(Value::as_str).unwrap_or("text").to_string();
        let is_primary_key = primary_keys.contains(&(table_name.to_string(), column_name.to_string()));
        let table = match tables.iter().position(|t| t.name == table_name) {
            Some(idx) => &mut tables[idx],
            None => {
                tables.push(IntrospectedTable { name: table_name.to_string(), columns: Vec::new() });
                tables.last_mut().unwrap()
            }
        };
        table.columns.push(IntrospectedColumn { name: column_name.to_string(), data_type, is_primary_key });
    }
    Ok(tables)
}

/// Classifies a column into an `ana_type` from its introspected SQL type —
/// the same three-way split `col_sql.ana_type` stores.
pub fn classify_ana_type(data_type: &str) -> AnaType {
    let lowered = data_type.to_lowercase();
    if lowered.contains("date") || lowered.contains("time") {
        AnaType::Datetime
    } else if lowered.contains("int")
        || lowered.contains("numeric")
        || lowered.contains("float")
        || lowered.contains("double")
        || lowered.contains("decimal")
        || lowered.contains("real")
    {
        AnaType::Numeric
    } else {
        AnaType::Attribute
    }
}

/// Assigns each introspected column a semantic role: the table's own
/// primary key becomes a `UniqueIdentifier`, numeric non-key columns
/// become a `Metric`, everything else stays an `Attribute`.
pub fn analyze_table(table_name: &str, columns: &[IntrospectedColumn]) -> Vec<SchemaElement> {
    let mut elements = vec![SchemaElement::Entity {
        name: table_name.to_string(),
        description: format!("the {table_name} entity"),
    }];
    for column in columns {
        let element = if column.is_primary_key {
            SchemaElement::UniqueIdentifier {
                name: column.name.clone(),
                description: format!("unique identifier of {table_name}"),
                column: column.name.clone(),
            }
        } else if classify_ana_type(&column.data_type) == AnaType::Numeric {
            SchemaElement::Metric {
                name: column.name.clone(),
                description: format!("{} of {table_name}", column.name),
                column: column.name.clone(),
            }
        } else {
            SchemaElement::Attribute {
                name: column.name.clone(),
                description: format!("{} of {table_name}", column.name),
                column: column.name.clone(),
            }
        };
        elements.push(element);
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_ana_type_splits_numeric_datetime_attribute() {
        assert_eq!(classify_ana_type("INTEGER"), AnaType::Numeric);
        assert_eq!(classify_ana_type("TIMESTAMP"), AnaType::Datetime);
        assert_eq!(classify_ana_type("VARCHAR(255)"), AnaType::Attribute);
    }

    #[test]
    fn analyze_table_marks_primary_key_as_identifier() {
        let columns = vec![
            IntrospectedColumn { name: "id".into(), data_type: "INTEGER".into(), is_primary_key: true },
            IntrospectedColumn { name: "revenue".into(), data_type: "NUMERIC".into(), is_primary_key: false },
            IntrospectedColumn { name: "name".into(), data_type: "TEXT".into(), is_primary_key: false },
        ];
        let elements = analyze_table("orders", &columns);
        assert!(matches!(elements[0], SchemaElement::Entity { .. }));
        assert!(elements.iter().any(|e| matches!(e, SchemaElement::UniqueIdentifier { column, .. } if column == "id")));
        assert!(elements.iter().any(|e| matches!(e, SchemaElement::Metric { column, .. } if column == "revenue")));
        assert!(elements.iter().any(|e| matches!(e, SchemaElement::Attribute { column, .. } if column == "name")));
    }
}

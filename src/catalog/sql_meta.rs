use super::models::{AnaType, BaseSql, ColSql, RelSql, TableSql};
use super::Catalog;
use crate::error::{AppError, AppResult};

impl Catalog {
    pub fn insert_sql_info(
        &self,
        owner_id: i64,
        host: &str,
        port: i64,
        dialect: &str,
        database_name: &str,
        credentials: &str,
        description: Option<&str>,
    ) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO base_sql (owner_id, host, port, dialect, database_name, credentials, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![owner_id, host, port, dialect, database_name, credentials, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_sql_info(
        &self,
        sql_id: i64,
        host: &str,
        port: i64,
        dialect: &str,
        database_name: &str,
        credentials: &str,
        description: Option<&str>,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE base_sql SET host = ?2, port = ?3, dialect = ?4, database_name = ?5,
             credentials = ?6, description = ?7 WHERE id = ?1",
            rusqlite::params![sql_id, host, port, dialect, database_name, credentials, description],
        )?;
        if changed == 0 {
            return Err(AppError::not_found(format!("sql connection {sql_id} not found")));
        }
        Ok(())
    }

    pub fn delete_sql_info(&self, owner_id: i64, sql_id: i64) -> AppResult<()> {
        let sql = self.get_sql_info(sql_id)?;
        if sql.owner_id != owner_id {
            return Err(AppError::authorization("caller does not own this sql connection"));
        }
        let conn = self.conn()?;
        let table_ids: Vec<i64> = {
            let mut stmt = conn.prepare("SELECT id FROM table_sql WHERE sql_id = ?1")?;
            stmt.query_map([sql_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        for table_id in &table_ids {
            conn.execute("DELETE FROM col_sql WHERE table_id = ?1", [table_id])?;
            conn.execute("DELETE FROM sql_des WHERE table_id = ?1", [table_id])?;
        }
        conn.execute("DELETE FROM table_sql WHERE sql_id = ?1", [sql_id])?;
        conn.execute("DELETE FROM rel_sql WHERE sql_id = ?1", [sql_id])?;
        conn.execute("DELETE FROM base_sql WHERE id = ?1", [sql_id])?;
        Ok(())
    }

    pub fn get_sql_info(&self, sql_id: i64) -> AppResult<BaseSql> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, owner_id, host, port, dialect, database_name, credentials, description
             FROM base_sql WHERE id = ?1",
            [sql_id],
            |row| {
                Ok(BaseSql {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    host: row.get(2)?,
                    port: row.get(3)?,
                    dialect: row.get(4)?,
                    database_name: row.get(5)?,
                    credentials: row.get(6)?,
                    description: row.get(7)?,
                })
            },
        )
        .map_err(|_| AppError::not_found(format!("sql connection {sql_id} not found")))
    }

    pub fn get_sql_info_list(&self, owner_id: i64) -> AppResult<Vec<BaseSql>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, host, port, dialect, database_name, credentials, description
             FROM base_sql WHERE owner_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([owner_id], |row| {
                Ok(BaseSql {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    host: row.get(2)?,
                    port: row.get(3)?,
                    dialect: row.get(4)?,
                    database_name: row.get(5)?,
                    credentials: row.get(6)?,
                    description: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_table_sql(&self, sql_id: i64, table_name: &str, description: Option<&str>) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO table_sql (sql_id, table_name, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![sql_id, table_name, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_col_sql(
        &self,
        table_id: i64,
        column_name: &str,
        column_type: &str,
        comment: Option<&str>,
        ana_type: AnaType,
    ) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO col_sql (table_id, column_name, column_type, comment, ana_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![table_id, column_name, column_type, comment, ana_type.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_sql_rel(
        &self,
        sql_id: i64,
        from_table: &str,
        from_column: &str,
        to_table: &str,
        to_column: &str,
    ) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO rel_sql (sql_id, from_table, from_column, to_table, to_column)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![sql_id, from_table, from_column, to_table, to_column],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_sql_rel(&self, rel_id: i64) -> AppResult<RelSql> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, sql_id, from_table, from_column, to_table, to_column FROM rel_sql WHERE id = ?1",
            [rel_id],
            |row| {
                Ok(RelSql {
                    id: row.get(0)?,
                    sql_id: row.get(1)?,
                    from_table: row.get(2)?,
                    from_column: row.get(3)?,
                    to_table: row.get(4)?,
                    to_column: row.get(5)?,
                })
            },
        )
        .map_err(|_| AppError::not_found(format!("sql relation {rel_id} not found")))
    }

    pub fn delete_sql_rel(&self, rel_id: i64) -> AppResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM rel_sql WHERE id = ?1", [rel_id])?;
        if changed == 0 {
            return Err(AppError::not_found(format!("sql relation {rel_id} not found")));
        }
        Ok(())
    }

    pub fn list_sql_rels(&self, sql_id: i64) -> AppResult<Vec<RelSql>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, sql_id, from_table, from_column, to_table, to_column
             FROM rel_sql WHERE sql_id = ?1",
        )?;
        let rows = stmt
            .query_map([sql_id], |row| {
                Ok(RelSql {
                    id: row.get(0)?,
                    sql_id: row.get(1)?,
                    from_table: row.get(2)?,
                    from_column: row.get(3)?,
                    to_table: row.get(4)?,
                    to_column: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns every table under `sql_id` plus its columns, used by the SQL
    /// pipeline to build the working schema context for a query.
    pub fn get_table_info(&self, sql_id: i64) -> AppResult<Vec<(TableSql, Vec<ColSql>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, sql_id, table_name, description FROM table_sql WHERE sql_id = ?1 ORDER BY id",
        )?;
        let tables = stmt
            .query_map([sql_id], |row| {
                Ok(TableSql {
                    id: row.get(0)?,
                    sql_id: row.get(1)?,
                    table_name: row.get(2)?,
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut result = Vec::with_capacity(tables.len());
        for table in tables {
            let mut col_stmt = conn.prepare(
                "SELECT id, table_id, column_name, column_type, comment, ana_type
                 FROM col_sql WHERE table_id = ?1 ORDER BY id",
            )?;
            let cols = col_stmt
                .query_map([table.id], |row| {
                    let ana: String = row.get(4)?;
                    Ok(ColSql {
                        id: row.get(0)?,
                        table_id: row.get(1)?,
                        column_name: row.get(2)?,
                        column_type: row.get(3)?,
                        comment: row.get(4).ok(),
                        ana_type: AnaType::parse(&ana),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            result.push((table, cols));
        }
        Ok(result)
    }

    /// Tables whose description mentions `term` (case-insensitive substring).
    /// Used by the entity-resolution stage of the SQL pipeline to narrow the
    /// schema before a query is drafted.
    pub fn find_tables_by_description(&self, sql_id: i64, term: &str) -> AppResult<Vec<TableSql>> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", term.replace('%', "").replace('_', ""));
        let mut stmt = conn.prepare(
            "SELECT id, sql_id, table_name, description FROM table_sql
             WHERE sql_id = ?1 AND description LIKE ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![sql_id, pattern], |row| {
                Ok(TableSql {
                    id: row.get(0)?,
                    sql_id: row.get(1)?,
                    table_name: row.get(2)?,
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Columns under `table_id` whose comment mentions `term`. Used to
    /// locate candidate metric/attribute columns by natural-language name.
    pub fn find_columns_by_comment(&self, table_id: i64, term: &str) -> AppResult<Vec<ColSql>> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", term.replace('%', "").replace('_', ""));
        let mut stmt = conn.prepare(
            "SELECT id, table_id, column_name, column_type, comment, ana_type
             FROM col_sql WHERE table_id = ?1 AND comment LIKE ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![table_id, pattern], |row| {
                let ana: String = row.get(4)?;
                Ok(ColSql {
                    id: row.get(0)?,
                    table_id: row.get(1)?,
                    column_name: row.get(2)?,
                    column_type: row.get(3)?,
                    comment: row.get(4).ok(),
                    ana_type: AnaType::parse(&ana),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Catalog, i64, i64) {
        let catalog = Catalog::open_in_memory().unwrap();
        let uid = catalog.register_user("alice", "pw").unwrap();
        let sql_id = catalog
            .insert_sql_info(uid, "localhost", 5432, "postgres", "sales", "user:pass", Some("sales db"))
            .unwrap();
        (catalog, uid, sql_id)
    }

    #[test]
    fn insert_and_get_sql_info() {
        let (catalog, uid, sql_id) = setup();
        let info = catalog.get_sql_info(sql_id).unwrap();
        assert_eq!(info.owner_id, uid);
        assert_eq!(info.database_name, "sales");
    }

    #[test]
    fn delete_sql_info_requires_ownership_and_cascades() {
        let (catalog, uid, sql_id) = setup();
        let bob = catalog.register_user("bob", "pw").unwrap();
        let table_id = catalog.insert_table_sql(sql_id, "orders", Some("order records")).unwrap();
        catalog
            .insert_col_sql(table_id, "revenue", "float", Some("total revenue"), AnaType::Numeric)
            .unwrap();
        assert!(catalog.delete_sql_info(bob, sql_id).is_err());
        catalog.delete_sql_info(uid, sql_id).unwrap();
        assert!(catalog.get_sql_info(sql_id).is_err());
        assert!(catalog.get_table_info(sql_id).unwrap().is_empty());
    }

    #[test]
    fn table_info_includes_columns() {
        let (catalog, _uid, sql_id) = setup();
        let table_id = catalog.insert_table_sql(sql_id, "orders", None).unwrap();
        catalog
            .insert_col_sql(table_id, "id", "integer", None, AnaType::Attribute)
            .unwrap();
        let info = catalog.get_table_info(sql_id).unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].1.len(), 1);
    }

    #[test]
    fn find_tables_by_description_matches_substring() {
        let (catalog, _uid, sql_id) = setup();
        catalog.insert_table_sql(sql_id, "orders", Some("customer order history")).unwrap();
        catalog.insert_table_sql(sql_id, "products", Some("product catalog")).unwrap();
        let found = catalog.find_tables_by_description(sql_id, "order").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].table_name, "orders");
    }

    #[test]
    fn sql_rel_insert_and_delete() {
        let (catalog, _uid, sql_id) = setup();
        let rel_id = catalog.insert_sql_rel(sql_id, "orders", "customer_id", "customers", "id").unwrap();
        assert_eq!(catalog.list_sql_rels(sql_id).unwrap().len(), 1);
        catalog.delete_sql_rel(rel_id).unwrap();
        assert!(catalog.list_sql_rels(sql_id).unwrap().is_empty());
    }
}

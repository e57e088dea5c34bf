//! Row store adapter: translates a table name plus a column → value
//! mapping into SQLite statements, and table snapshots into exported
//! files.
//!
//! Opening a store runs the schema bootstrap: every registered table is
//! created if absent, and recreated (dropping its rows) if its live
//! column set no longer matches the declared schema. The engine owns
//! ACID, uniqueness, and referential integrity; constraint rejections
//! surface as [`DormDbError::Constraint`] carrying the offending row.

use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::error::{DormDbError, Result};
use crate::export::{self, ExportFormat};
use crate::record::{display_row, Row, Value};
use crate::schema::{schema_for, Table, TableSchema};

pub struct RowStore {
    conn: Connection,
}

impl RowStore {
    /// Open or create the database at the given path and bootstrap the
    /// registered tables.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = RowStore { conn };
        store.bootstrap()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = RowStore { conn };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        for table in Table::ALL {
            let schema = table.schema();
            match self.live_columns(schema.name())? {
                None => {
                    self.conn.execute_batch(&create_table_sql(schema))?;
                }
                Some(live) if live != declared_columns(schema) => {
                    log::warn!(
                        "Table '{}' does not match its declared columns; recreating (existing rows dropped)",
                        schema.name()
                    );
                    self.conn
                        .execute_batch(&format!("DROP TABLE {}", schema.name()))?;
                    self.conn.execute_batch(&create_table_sql(schema))?;
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Live (name, type) column list of a table, or None if the table
    /// does not exist.
    fn live_columns(&self, table: &str) -> Result<Option<Vec<(String, String)>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({table})"))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        if columns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(columns))
        }
    }

    /// Insert one row. Every declared column is named; the engine's
    /// constraints (primary key, foreign keys) decide acceptance.
    pub fn create(&self, table: &str, row: &Row) -> Result<()> {
        let schema = schema_for(table)?;
        check_keys(schema, row)?;

        let columns: Vec<&str> = schema.fields.iter().map(|f| f.name).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.name(),
            columns.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<Value> = schema
            .fields
            .iter()
            .map(|f| row.get(f.name).cloned().unwrap_or(Value::Null))
            .collect();

        self.conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| wrap_constraint(e, schema, row))?;
        Ok(())
    }

    /// All rows matching the conjunction of filter equalities. An empty
    /// filter reads the whole table. Each call is a fresh query.
    pub fn read(&self, table: &str, filter: &Row) -> Result<Vec<Row>> {
        let schema = schema_for(table)?;
        check_keys(schema, filter)?;

        let columns: Vec<&str> = schema.fields.iter().map(|f| f.name).collect();
        let (where_sql, params) = where_clause(filter, 0);
        let sql = format!(
            "SELECT {} FROM {}{}",
            columns.join(", "),
            schema.name(),
            where_sql
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mapped = stmt.query_map(params_from_iter(params.iter()), |sql_row| {
            read_row(schema, sql_row)
        })?;

        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Apply `changes` to every matching row; returns the affected-row
    /// count (0 when nothing matched).
    pub fn update(&self, table: &str, filter: &Row, changes: &Row) -> Result<usize> {
        let schema = schema_for(table)?;
        check_keys(schema, filter)?;
        check_keys(schema, changes)?;
        if changes.is_empty() {
            return Ok(0);
        }

        let mut params: Vec<&Value> = Vec::new();
        let mut sets = Vec::new();
        for (key, value) in changes {
            params.push(value);
            sets.push(format!("{} = ?{}", key, params.len()));
        }
        let (where_sql, where_params) = where_clause(filter, params.len());
        params.extend(where_params);

        let sql = format!(
            "UPDATE {} SET {}{}",
            schema.name(),
            sets.join(", "),
            where_sql
        );
        let count = self
            .conn
            .execute(&sql, params_from_iter(params.iter()))
            .map_err(|e| wrap_constraint(e, schema, changes))?;
        Ok(count)
    }

    /// Remove every matching row; returns the removed-row count.
    pub fn delete(&self, table: &str, filter: &Row) -> Result<usize> {
        let schema = schema_for(table)?;
        check_keys(schema, filter)?;

        let (where_sql, params) = where_clause(filter, 0);
        let sql = format!("DELETE FROM {}{}", schema.name(), where_sql);
        let count = self.conn.execute(&sql, params_from_iter(params.iter()))?;
        Ok(count)
    }

    /// True iff at least one row matches; the statement is limited to a
    /// single result row.
    pub fn exists(&self, table: &str, filter: &Row) -> Result<bool> {
        let schema = schema_for(table)?;
        check_keys(schema, filter)?;

        let (where_sql, params) = where_clause(filter, 0);
        let sql = format!("SELECT 1 FROM {}{} LIMIT 1", schema.name(), where_sql);
        let found = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Total row count, used for identifier generation.
    pub fn count(&self, table: &str) -> Result<i64> {
        let schema = schema_for(table)?;
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Materialize the full current contents of a table as a file named
    /// `<table>.<ext>` in `dir`, creating the directory if absent.
    pub fn export_snapshot(
        &self,
        table: &str,
        format: ExportFormat,
        dir: &Path,
    ) -> Result<PathBuf> {
        let schema = schema_for(table)?;
        let rows = self.read(table, &Row::new())?;
        export::write_snapshot(schema, &rows, format, dir)
    }
}

/// Reject any key that is not a declared field before building SQL.
fn check_keys(schema: &TableSchema, row: &Row) -> Result<()> {
    for key in row.keys() {
        if !schema.has_field(key) {
            return Err(DormDbError::UnknownField {
                table: schema.name().to_string(),
                field: key.clone(),
            });
        }
    }
    Ok(())
}

fn where_clause(filter: &Row, param_offset: usize) -> (String, Vec<&Value>) {
    if filter.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (key, value) in filter {
        params.push(value);
        clauses.push(format!("{} = ?{}", key, param_offset + params.len()));
    }
    (format!(" WHERE {}", clauses.join(" AND ")), params)
}

fn read_row(schema: &TableSchema, sql_row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    use crate::schema::FieldKind;

    let mut row = Row::new();
    for (i, def) in schema.fields.iter().enumerate() {
        let value = match def.kind {
            FieldKind::Integer => sql_row
                .get::<_, Option<i64>>(i)?
                .map(Value::Int)
                .unwrap_or(Value::Null),
            FieldKind::Text => sql_row
                .get::<_, Option<String>>(i)?
                .map(Value::Text)
                .unwrap_or(Value::Null),
            FieldKind::Timestamp => match sql_row.get::<_, Option<String>>(i)? {
                None => Value::Null,
                Some(text) => {
                    let ts = chrono::DateTime::parse_from_rfc3339(&text).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            i,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Value::Timestamp(ts.with_timezone(&chrono::Utc))
                }
            },
        };
        row.insert(def.name.to_string(), value);
    }
    Ok(row)
}

fn create_table_sql(schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .fields
        .iter()
        .map(|f| {
            if f.name == "id" {
                "id INTEGER PRIMARY KEY".to_string()
            } else if let Some(target) = f.references {
                format!("{} {} REFERENCES {}(id)", f.name, f.kind.sql_type(), target)
            } else {
                format!("{} {}", f.name, f.kind.sql_type())
            }
        })
        .collect();
    format!(
        "CREATE TABLE {} (\n    {}\n);",
        schema.name(),
        columns.join(",\n    ")
    )
}

fn declared_columns(schema: &TableSchema) -> Vec<(String, String)> {
    schema
        .fields
        .iter()
        .map(|f| (f.name.to_string(), f.kind.sql_type().to_string()))
        .collect()
}

fn wrap_constraint(err: rusqlite::Error, schema: &TableSchema, row: &Row) -> DormDbError {
    let is_constraint = matches!(
        &err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    );
    if is_constraint {
        DormDbError::Constraint {
            table: schema.name().to_string(),
            row: display_row(row),
            source: err,
        }
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn row(entries: &[(&str, Value)]) -> Row {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn room_row(id: i64, number: &str, capacity: i64) -> Row {
        row(&[
            ("id", Value::Int(id)),
            ("room_number", Value::Text(number.to_string())),
            ("capacity", Value::Int(capacity)),
            ("occupants", Value::Int(0)),
        ])
    }

    #[test]
    fn test_bootstrap_creates_registered_tables() {
        let store = RowStore::open_in_memory().unwrap();
        for table in Table::ALL {
            assert_eq!(store.count(table.as_str()).unwrap(), 0);
        }
    }

    #[test]
    fn test_unknown_table_fails_every_operation() {
        let store = RowStore::open_in_memory().unwrap();
        let empty = Row::new();

        assert!(matches!(
            store.read("teachers", &empty),
            Err(DormDbError::UnknownTable(_))
        ));
        assert!(matches!(
            store.create("teachers", &empty),
            Err(DormDbError::UnknownTable(_))
        ));
        assert!(matches!(
            store.update("teachers", &empty, &empty),
            Err(DormDbError::UnknownTable(_))
        ));
        assert!(matches!(
            store.delete("teachers", &empty),
            Err(DormDbError::UnknownTable(_))
        ));
        assert!(matches!(
            store.exists("teachers", &empty),
            Err(DormDbError::UnknownTable(_))
        ));
        assert!(matches!(
            store.count("teachers"),
            Err(DormDbError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_create_and_read_round_trip() {
        let store = RowStore::open_in_memory().unwrap();
        let created = room_row(10000, "471", 2);
        store.create("rooms", &created).unwrap();

        let rows = store
            .read(
                "rooms",
                &row(&[("room_number", Value::Text("471".to_string()))]),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], created);
    }

    #[test]
    fn test_read_with_empty_filter_returns_all_rows() {
        let store = RowStore::open_in_memory().unwrap();
        store.create("rooms", &room_row(10000, "101", 2)).unwrap();
        store.create("rooms", &room_row(10001, "102", 4)).unwrap();

        let rows = store.read("rooms", &Row::new()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_update_returns_affected_count() {
        let store = RowStore::open_in_memory().unwrap();
        store.create("rooms", &room_row(10000, "101", 2)).unwrap();
        store.create("rooms", &room_row(10001, "102", 2)).unwrap();

        let count = store
            .update(
                "rooms",
                &row(&[("capacity", Value::Int(2))]),
                &row(&[("capacity", Value::Int(3))]),
            )
            .unwrap();
        assert_eq!(count, 2);

        // Nothing matches any more: 0 is a valid, non-error result
        let count = store
            .update(
                "rooms",
                &row(&[("capacity", Value::Int(2))]),
                &row(&[("capacity", Value::Int(3))]),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_delete_returns_removed_count() {
        let store = RowStore::open_in_memory().unwrap();
        store.create("rooms", &room_row(10000, "101", 2)).unwrap();
        store.create("rooms", &room_row(10001, "102", 4)).unwrap();

        let count = store
            .delete("rooms", &row(&[("capacity", Value::Int(4))]))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.count("rooms").unwrap(), 1);
    }

    #[test]
    fn test_exists_short_circuits() {
        let store = RowStore::open_in_memory().unwrap();
        store.create("rooms", &room_row(10000, "101", 2)).unwrap();

        assert!(store
            .exists("rooms", &row(&[("room_number", Value::Text("101".to_string()))]))
            .unwrap());
        assert!(!store
            .exists("rooms", &row(&[("room_number", Value::Text("999".to_string()))]))
            .unwrap());
    }

    #[test]
    fn test_duplicate_id_is_a_constraint_violation() {
        let store = RowStore::open_in_memory().unwrap();
        store.create("rooms", &room_row(10000, "101", 2)).unwrap();

        let err = store
            .create("rooms", &room_row(10000, "102", 4))
            .unwrap_err();
        match err {
            DormDbError::Constraint { table, row, .. } => {
                assert_eq!(table, "rooms");
                assert!(row.contains("10000"));
            }
            other => panic!("expected Constraint, got {other:?}"),
        }
        // The first row is untouched
        let rows = store.read("rooms", &Row::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["room_number"], Value::Text("101".to_string()));
    }

    #[test]
    fn test_foreign_key_violation_is_a_constraint_violation() {
        let store = RowStore::open_in_memory().unwrap();
        let orphan = row(&[
            ("id", Value::Int(1)),
            ("student_id", Value::Int(12345)),
            ("room_id", Value::Null),
            ("assigned_date", Value::Null),
        ]);

        let err = store.create("assignments", &orphan).unwrap_err();
        assert!(matches!(err, DormDbError::Constraint { .. }));
    }

    #[test]
    fn test_null_foreign_keys_are_accepted() {
        let store = RowStore::open_in_memory().unwrap();
        let unassigned = row(&[
            ("id", Value::Int(1)),
            ("student_id", Value::Null),
            ("room_id", Value::Null),
            ("assigned_date", Value::Null),
        ]);
        store.create("assignments", &unassigned).unwrap();
        assert_eq!(store.count("assignments").unwrap(), 1);
    }

    #[test]
    fn test_unknown_filter_key_is_rejected_before_sql() {
        let store = RowStore::open_in_memory().unwrap();
        let err = store
            .read("rooms", &row(&[("floor", Value::Int(4))]))
            .unwrap_err();
        assert!(matches!(err, DormDbError::UnknownField { field, .. } if field == "floor"));
    }

    #[test]
    fn test_bootstrap_recreates_mismatched_table() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dorm.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE rooms (id INTEGER PRIMARY KEY, label TEXT);
                 INSERT INTO rooms (id, label) VALUES (1, 'legacy');",
            )
            .unwrap();
        }

        let store = RowStore::open(&path).unwrap();
        // Mismatched table was dropped and recreated with the declared shape
        assert_eq!(store.count("rooms").unwrap(), 0);
        store.create("rooms", &room_row(10000, "101", 2)).unwrap();
    }

    #[test]
    fn test_bootstrap_keeps_matching_table() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dorm.db");

        {
            let store = RowStore::open(&path).unwrap();
            store.create("rooms", &room_row(10000, "101", 2)).unwrap();
        }

        let store = RowStore::open(&path).unwrap();
        assert_eq!(store.count("rooms").unwrap(), 1);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let store = RowStore::open_in_memory().unwrap();
        let ts = crate::record::parse_timestamp("2024-09-01 08:30:00").unwrap();
        let assigned = row(&[
            ("id", Value::Int(1)),
            ("student_id", Value::Null),
            ("room_id", Value::Null),
            ("assigned_date", Value::Timestamp(ts)),
        ]);
        store.create("assignments", &assigned).unwrap();

        let rows = store.read("assignments", &Row::new()).unwrap();
        assert_eq!(rows[0]["assigned_date"], Value::Timestamp(ts));
    }
}

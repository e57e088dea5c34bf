//! Typed records and the dynamic value boundary.
//!
//! Front ends hand the controller untyped field/value text; storage hands
//! back column/value rows. Both meet here: [`Value`] and [`Row`] carry the
//! dynamic side, the four record structs and the [`Record`] variant carry
//! the typed side, and [`clean_row`] normalizes a row before it is written.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::error::{DormDbError, Result};
use crate::schema::{FieldDef, FieldKind, Table, TableSchema};

/// A dynamically-typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Int(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(ts.to_rfc3339()))
            }
        })
    }
}

/// One row as a column → value mapping.
pub type Row = BTreeMap<String, Value>;

/// Render a row as `{key: value, ...}` for error messages and logs.
pub fn display_row(row: &Row) -> String {
    let parts: Vec<String> = row.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    format!("{{{}}}", parts.join(", "))
}

/// Render a row as a JSON object with the storage value encodings.
pub fn row_to_json(row: &Row) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for (key, value) in row {
        obj.insert(key.clone(), value.to_json());
    }
    serde_json::Value::Object(obj)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Option<i64>,
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub room_id: Option<i64>,
    pub enrolled_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Option<i64>,
    pub room_number: String,
    pub capacity: i64,
    pub occupants: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub room_id: Option<i64>,
    pub assigned_date: Option<DateTime<Utc>>,
}

/// One record, tagged by its table shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Student(Student),
    Room(Room),
    Admin(Admin),
    Assignment(Assignment),
}

impl Record {
    /// The table this record's shape belongs to.
    pub fn table(&self) -> Table {
        match self {
            Record::Student(_) => Table::Students,
            Record::Room(_) => Table::Rooms,
            Record::Admin(_) => Table::Admins,
            Record::Assignment(_) => Table::Assignments,
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Record::Student(r) => r.id,
            Record::Room(r) => r.id,
            Record::Admin(r) => r.id,
            Record::Assignment(r) => r.id,
        }
    }

    pub fn set_id(&mut self, id: i64) {
        match self {
            Record::Student(r) => r.id = Some(id),
            Record::Room(r) => r.id = Some(id),
            Record::Admin(r) => r.id = Some(id),
            Record::Assignment(r) => r.id = Some(id),
        }
    }

    /// Build a record from textual key=value pairs, parsing each value
    /// according to its declared field kind.
    pub fn from_fields(table: Table, fields: &[(String, String)]) -> Result<Record> {
        let row = row_from_fields(table.schema(), fields)?;
        Ok(Record::from_row(table, &row))
    }

    /// Build a record from a row mapping. Absent or mismatched values fall
    /// back to the field's zero value; validated paths never produce them.
    pub fn from_row(table: Table, row: &Row) -> Record {
        match table {
            Table::Students => Record::Student(Student {
                id: int_field(row, "id"),
                name: text_field(row, "name"),
                age: int_field(row, "age").unwrap_or(0),
                gender: text_field(row, "gender"),
                room_id: int_field(row, "room_id"),
                enrolled_date: timestamp_field(row, "enrolled_date"),
            }),
            Table::Rooms => Record::Room(Room {
                id: int_field(row, "id"),
                room_number: text_field(row, "room_number"),
                capacity: int_field(row, "capacity").unwrap_or(0),
                occupants: int_field(row, "occupants").unwrap_or(0),
            }),
            Table::Admins => Record::Admin(Admin {
                id: int_field(row, "id"),
                name: text_field(row, "name"),
                email: text_field(row, "email"),
                password: text_field(row, "password"),
            }),
            Table::Assignments => Record::Assignment(Assignment {
                id: int_field(row, "id"),
                student_id: int_field(row, "student_id"),
                room_id: int_field(row, "room_id"),
                assigned_date: timestamp_field(row, "assigned_date"),
            }),
        }
    }

    /// Flatten the record into a row mapping over its declared fields.
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        match self {
            Record::Student(r) => {
                insert_int(&mut row, "id", r.id);
                insert_text(&mut row, "name", &r.name);
                row.insert("age".to_string(), Value::Int(r.age));
                insert_text(&mut row, "gender", &r.gender);
                insert_int(&mut row, "room_id", r.room_id);
                insert_timestamp(&mut row, "enrolled_date", r.enrolled_date);
            }
            Record::Room(r) => {
                insert_int(&mut row, "id", r.id);
                insert_text(&mut row, "room_number", &r.room_number);
                row.insert("capacity".to_string(), Value::Int(r.capacity));
                row.insert("occupants".to_string(), Value::Int(r.occupants));
            }
            Record::Admin(r) => {
                insert_int(&mut row, "id", r.id);
                insert_text(&mut row, "name", &r.name);
                insert_text(&mut row, "email", &r.email);
                insert_text(&mut row, "password", &r.password);
            }
            Record::Assignment(r) => {
                insert_int(&mut row, "id", r.id);
                insert_int(&mut row, "student_id", r.student_id);
                insert_int(&mut row, "room_id", r.room_id);
                insert_timestamp(&mut row, "assigned_date", r.assigned_date);
            }
        }
        row
    }
}

fn int_field(row: &Row, name: &str) -> Option<i64> {
    row.get(name).and_then(Value::as_int)
}

fn text_field(row: &Row, name: &str) -> String {
    match row.get(name) {
        Some(Value::Text(s)) => s.clone(),
        Some(Value::Int(i)) => i.to_string(),
        _ => String::new(),
    }
}

fn timestamp_field(row: &Row, name: &str) -> Option<DateTime<Utc>> {
    match row.get(name) {
        Some(Value::Timestamp(ts)) => Some(*ts),
        _ => None,
    }
}

fn insert_int(row: &mut Row, name: &str, value: Option<i64>) {
    row.insert(
        name.to_string(),
        value.map(Value::Int).unwrap_or(Value::Null),
    );
}

fn insert_text(row: &mut Row, name: &str, value: &str) {
    row.insert(name.to_string(), Value::Text(value.to_string()));
}

fn insert_timestamp(row: &mut Row, name: &str, value: Option<DateTime<Utc>>) {
    row.insert(
        name.to_string(),
        value.map(Value::Timestamp).unwrap_or(Value::Null),
    );
}

/// Parse textual key=value pairs into a typed row against a schema.
/// The first key not declared by the schema is rejected.
pub fn row_from_fields(schema: &TableSchema, fields: &[(String, String)]) -> Result<Row> {
    let mut row = Row::new();
    for (key, raw) in fields {
        let def = schema
            .field(key)
            .ok_or_else(|| DormDbError::UnknownField {
                table: schema.name().to_string(),
                field: key.clone(),
            })?;
        row.insert(def.name.to_string(), parse_field_text(def, raw)?);
    }
    Ok(row)
}

fn parse_field_text(def: &FieldDef, text: &str) -> Result<Value> {
    let trimmed = text.trim();
    match def.kind {
        FieldKind::Integer => {
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            trimmed
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| DormDbError::InvalidValue {
                    field: def.name.to_string(),
                    value: text.to_string(),
                })
        }
        FieldKind::Text => Ok(Value::Text(text.to_string())),
        FieldKind::Timestamp => {
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            parse_timestamp(trimmed)
                .map(Value::Timestamp)
                .ok_or_else(|| DormDbError::InvalidValue {
                    field: def.name.to_string(),
                    value: text.to_string(),
                })
        }
    }
}

/// Parse a timestamp from its accepted textual forms: RFC 3339,
/// `YYYY-MM-DD HH:MM:SS`, or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    None
}

/// Normalize a row before writing. Every declared field ends up present:
/// absent text becomes an empty string, absent plain integers become zero,
/// absent timestamps become now, absent foreign keys stay NULL. Text given
/// for a timestamp field is parsed; unparsable text is an error.
pub fn clean_row(schema: &TableSchema, row: &Row) -> Result<Row> {
    let mut cleaned = Row::new();
    for def in schema.fields {
        let value = row.get(def.name).cloned().unwrap_or(Value::Null);
        cleaned.insert(def.name.to_string(), clean_value(def, value)?);
    }
    Ok(cleaned)
}

fn clean_value(def: &FieldDef, value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(default_for(def)),
        Value::Int(i) => match def.kind {
            FieldKind::Integer => Ok(Value::Int(i)),
            FieldKind::Text => Ok(Value::Text(i.to_string())),
            FieldKind::Timestamp => Err(DormDbError::InvalidValue {
                field: def.name.to_string(),
                value: i.to_string(),
            }),
        },
        Value::Text(text) => match def.kind {
            FieldKind::Text => Ok(Value::Text(text)),
            FieldKind::Integer => {
                if text.trim().is_empty() {
                    return Ok(default_for(def));
                }
                match text.trim().parse::<i64>() {
                    Ok(i) => Ok(Value::Int(i)),
                    Err(_) => Err(DormDbError::InvalidValue {
                        field: def.name.to_string(),
                        value: text,
                    }),
                }
            }
            FieldKind::Timestamp => {
                if text.trim().is_empty() {
                    return Ok(default_for(def));
                }
                match parse_timestamp(text.trim()) {
                    Some(ts) => Ok(Value::Timestamp(ts)),
                    None => Err(DormDbError::InvalidValue {
                        field: def.name.to_string(),
                        value: text,
                    }),
                }
            }
        },
        Value::Timestamp(ts) => match def.kind {
            FieldKind::Timestamp => Ok(Value::Timestamp(ts)),
            _ => Err(DormDbError::InvalidValue {
                field: def.name.to_string(),
                value: ts.to_rfc3339(),
            }),
        },
    }
}

fn default_for(def: &FieldDef) -> Value {
    if def.references.is_some() {
        return Value::Null;
    }
    match def.kind {
        FieldKind::Integer => Value::Int(0),
        FieldKind::Text => Value::Text(String::new()),
        FieldKind::Timestamp => Value::Timestamp(Utc::now()),
    }
}

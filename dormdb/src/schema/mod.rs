//! Static schema registry: the closed set of tables, their ordered field
//! descriptors, and per-table starting-id offsets.
//!
//! The registry is compile-time data shared read-only by every controller
//! and store. Adding a table means adding a descriptor here plus a record
//! variant in [`crate::record`]; controller logic stays untouched.

use std::fmt;
use std::str::FromStr;

use crate::error::{DormDbError, Result};

/// The closed set of table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Students,
    Rooms,
    Admins,
    Assignments,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Students,
        Table::Rooms,
        Table::Admins,
        Table::Assignments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Students => "students",
            Table::Rooms => "rooms",
            Table::Admins => "admins",
            Table::Assignments => "assignments",
        }
    }

    /// The schema descriptor for this table.
    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Table::Students => &STUDENTS,
            Table::Rooms => &ROOMS,
            Table::Admins => &ADMINS,
            Table::Assignments => &ASSIGNMENTS,
        }
    }
}

impl FromStr for Table {
    type Err = DormDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "students" => Ok(Table::Students),
            "rooms" => Ok(Table::Rooms),
            "admins" => Ok(Table::Admins),
            "assignments" => Ok(Table::Assignments),
            other => Err(DormDbError::UnknownTable(other.to_string())),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic kind of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    Timestamp,
}

impl FieldKind {
    /// Declared SQLite column type. Timestamps are stored as RFC 3339 text.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Integer => "INTEGER",
            FieldKind::Text => "TEXT",
            FieldKind::Timestamp => "TEXT",
        }
    }
}

/// One declared field of a table.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Foreign-key target; FK fields are nullable and default to NULL
    /// rather than zero during cleaning.
    pub references: Option<Table>,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef {
        name,
        kind,
        references: None,
    }
}

const fn fk(name: &'static str, target: Table) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Integer,
        references: Some(target),
    }
}

/// Descriptor for one table: ordered fields and the id-generation offset.
#[derive(Debug)]
pub struct TableSchema {
    pub table: Table,
    pub fields: &'static [FieldDef],
    pub starting_offset: i64,
}

impl TableSchema {
    pub fn name(&self) -> &'static str {
        self.table.as_str()
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Declared field names in schema order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }
}

pub static STUDENTS: TableSchema = TableSchema {
    table: Table::Students,
    fields: &[
        field("id", FieldKind::Integer),
        field("name", FieldKind::Text),
        field("age", FieldKind::Integer),
        field("gender", FieldKind::Text),
        fk("room_id", Table::Rooms),
        field("enrolled_date", FieldKind::Timestamp),
    ],
    starting_offset: 10000,
};

pub static ROOMS: TableSchema = TableSchema {
    table: Table::Rooms,
    fields: &[
        field("id", FieldKind::Integer),
        field("room_number", FieldKind::Text),
        field("capacity", FieldKind::Integer),
        field("occupants", FieldKind::Integer),
    ],
    starting_offset: 10000,
};

pub static ADMINS: TableSchema = TableSchema {
    table: Table::Admins,
    fields: &[
        field("id", FieldKind::Integer),
        field("name", FieldKind::Text),
        field("email", FieldKind::Text),
        field("password", FieldKind::Text),
    ],
    starting_offset: 0,
};

pub static ASSIGNMENTS: TableSchema = TableSchema {
    table: Table::Assignments,
    fields: &[
        field("id", FieldKind::Integer),
        fk("student_id", Table::Students),
        fk("room_id", Table::Rooms),
        field("assigned_date", FieldKind::Timestamp),
    ],
    starting_offset: 0,
};

/// Look up a table's schema by name.
pub fn schema_for(name: &str) -> Result<&'static TableSchema> {
    Ok(name.parse::<Table>()?.schema())
}

pub fn is_known_table(name: &str) -> bool {
    name.parse::<Table>().is_ok()
}

/// Base value for generated identifiers in the given table.
pub fn starting_offset(name: &str) -> Result<i64> {
    Ok(schema_for(name)?.starting_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tables() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
    }

    #[test]
    fn test_parse_unknown_table() {
        let err = "teachers".parse::<Table>().unwrap_err();
        assert!(matches!(err, DormDbError::UnknownTable(name) if name == "teachers"));
    }

    #[test]
    fn test_schema_for_unknown_table() {
        assert!(schema_for("no_such_table").is_err());
        assert!(!is_known_table("no_such_table"));
        assert!(is_known_table("rooms"));
    }

    #[test]
    fn test_field_lookup() {
        let schema = schema_for("students").unwrap();
        assert!(schema.has_field("enrolled_date"));
        assert!(!schema.has_field("grade"));

        let room_id = schema.field("room_id").unwrap();
        assert_eq!(room_id.kind, FieldKind::Integer);
        assert_eq!(room_id.references, Some(Table::Rooms));
    }

    #[test]
    fn test_field_order_is_declared_order() {
        let schema = schema_for("rooms").unwrap();
        assert_eq!(
            schema.field_names(),
            vec!["id", "room_number", "capacity", "occupants"]
        );
    }

    #[test]
    fn test_starting_offsets() {
        assert_eq!(starting_offset("students").unwrap(), 10000);
        assert_eq!(starting_offset("rooms").unwrap(), 10000);
        assert_eq!(starting_offset("admins").unwrap(), 0);
        assert_eq!(starting_offset("assignments").unwrap(), 0);
    }

    #[test]
    fn test_every_table_declares_id_first() {
        for table in Table::ALL {
            assert_eq!(table.schema().fields[0].name, "id");
        }
    }
}

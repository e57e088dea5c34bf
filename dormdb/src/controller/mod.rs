//! Per-table record controller.
//!
//! A controller is bound to one table, validates every field name that
//! crosses it against the schema registry, cleans values before writes,
//! assigns identifiers, and delegates the literal storage work to the
//! row store. It also keeps an in-memory list of the records it has
//! added during its lifetime: an observability aid for front ends; the
//! database remains the system of record.

use std::path::PathBuf;

use crate::config::ExportConfig;
use crate::error::{DormDbError, Result};
use crate::record::{clean_row, display_row, Record, Row};
use crate::schema::{Table, TableSchema};
use crate::store::RowStore;

pub struct Controller {
    store: RowStore,
    table: Option<Table>,
    added: Vec<Record>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("table", &self.table)
            .field("added", &self.added)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Bind a controller to a table. The name is validated against the
    /// registry before anything else happens.
    pub fn bind(store: RowStore, table_name: &str) -> Result<Self> {
        let table = table_name.parse::<Table>()?;
        Ok(Controller {
            store,
            table: Some(table),
            added: Vec::new(),
        })
    }

    /// Rebind to another table. On failure the controller is left
    /// unbound (it does not fall back to its previous table) and every
    /// subsequent operation fails until a rebind succeeds.
    pub fn rebind(&mut self, table_name: &str) -> Result<()> {
        match table_name.parse::<Table>() {
            Ok(table) => {
                self.table = Some(table);
                Ok(())
            }
            Err(e) => {
                log::warn!("Rebind to '{table_name}' failed; controller left unbound");
                self.table = None;
                Err(e)
            }
        }
    }

    /// The currently bound table, if any.
    pub fn table(&self) -> Option<Table> {
        self.table
    }

    fn bound(&self) -> Result<&'static TableSchema> {
        match self.table {
            Some(table) => Ok(table.schema()),
            None => Err(DormDbError::Unbound),
        }
    }

    /// Records successfully added through this controller instance.
    pub fn added(&self) -> &[Record] {
        &self.added
    }

    /// Declared field names of the bound table, in schema order.
    pub fn schema_fields(&self) -> Result<Vec<&'static str>> {
        Ok(self.bound()?.field_names())
    }

    /// Every row of the bound table, as typed records.
    pub fn all_rows(&self) -> Result<Vec<Record>> {
        self.search(&Row::new())
    }

    /// Current row count of the bound table.
    pub fn row_count(&self) -> Result<i64> {
        let schema = self.bound()?;
        self.store.count(schema.name())
    }

    /// Next identifier for the bound table: starting offset plus current
    /// row count.
    ///
    /// Safe only under a single writer: a concurrent add can compute the
    /// same value, and deletions can make the count collide with a
    /// surviving row. Either way the engine's primary key rejects the
    /// insert with a constraint violation rather than overwriting.
    fn generate_id(&self, schema: &TableSchema) -> Result<i64> {
        Ok(schema.starting_offset + self.store.count(schema.name())?)
    }

    /// Add one record. The record's shape must match the bound table;
    /// the identifier is assigned here, values are cleaned, and the
    /// insert is delegated to the store. Returns the record as stored.
    pub fn add(&mut self, mut record: Record) -> Result<Record> {
        let schema = self.bound()?;
        if record.table() != schema.table {
            let fields: Vec<String> = record
                .table()
                .schema()
                .fields
                .iter()
                .filter(|f| !schema.has_field(f.name))
                .map(|f| f.name.to_string())
                .collect();
            log::warn!(
                "Rejected {} record for '{}' controller",
                record.table(),
                schema.name()
            );
            return Err(DormDbError::UnknownFields {
                table: schema.name().to_string(),
                fields,
            });
        }

        if schema.has_field("id") {
            record.set_id(self.generate_id(schema)?);
        }

        let row = clean_row(schema, &record.to_row())?;
        if let Err(e) = self.store.create(schema.name(), &row) {
            log::warn!("{} add failed: {e}", schema.name());
            return Err(e);
        }

        let stored = Record::from_row(schema.table, &row);
        log::info!(
            "{} add: id {}",
            schema.name(),
            stored.id().map_or_else(|| "none".to_string(), |id| id.to_string())
        );
        self.added.push(stored.clone());
        Ok(stored)
    }

    /// All rows matching the filter, as typed records. Every filter key
    /// must be a declared field; the first unknown key is reported.
    pub fn search(&self, filter: &Row) -> Result<Vec<Record>> {
        let schema = self.bound()?;
        self.check_filter(schema, filter)?;

        let rows = self.store.read(schema.name(), filter)?;
        Ok(rows
            .iter()
            .map(|row| Record::from_row(schema.table, row))
            .collect())
    }

    /// Remove all rows matching the filter; returns the removed count.
    pub fn delete(&self, filter: &Row) -> Result<usize> {
        let schema = self.bound()?;
        self.check_filter(schema, filter)?;

        let count = self.store.delete(schema.name(), filter)?;
        log::info!(
            "{} remove: {} row(s) matching {}",
            schema.name(),
            count,
            display_row(filter)
        );
        Ok(count)
    }

    /// Apply `changes` to every row matching `filter`.
    ///
    /// The filter must reference only declared fields and must currently
    /// match at least one row. Change keys are partitioned into declared
    /// and undeclared: declared changes are applied, and undeclared keys
    /// then fail the call. An error from this method therefore does NOT
    /// imply that nothing was written: accepted changes stay committed,
    /// and callers treating errors as fail-clean must re-read.
    pub fn update(&self, filter: &Row, changes: &Row) -> Result<usize> {
        let schema = self.bound()?;
        self.check_filter(schema, filter)?;

        if !self.store.exists(schema.name(), filter)? {
            log::warn!(
                "{} update: nothing matches {}",
                schema.name(),
                display_row(filter)
            );
            return Err(DormDbError::NoMatch {
                table: schema.name().to_string(),
                filter: display_row(filter),
            });
        }

        let mut accepted = Row::new();
        let mut rejected: Vec<String> = Vec::new();
        for (key, value) in changes {
            if schema.has_field(key) {
                accepted.insert(key.clone(), value.clone());
            } else {
                rejected.push(key.clone());
            }
        }

        let count = if accepted.is_empty() {
            0
        } else {
            self.store.update(schema.name(), filter, &accepted)?
        };

        if !rejected.is_empty() {
            log::warn!(
                "{} update: rejected field(s) [{}]; {} accepted change(s) already applied",
                schema.name(),
                rejected.join(", "),
                accepted.len()
            );
            return Err(DormDbError::UnknownFields {
                table: schema.name().to_string(),
                fields: rejected,
            });
        }

        log::info!(
            "{} update: {} row(s) matching {}",
            schema.name(),
            count,
            display_row(filter)
        );
        Ok(count)
    }

    /// Normalize a record the way `add` would, without writing it.
    pub fn clean_record(&self, record: &Record) -> Result<Record> {
        let schema = self.bound()?;
        let row = clean_row(schema, &record.to_row())?;
        Ok(Record::from_row(schema.table, &row))
    }

    /// Export the bound table's full contents using the given
    /// configuration; returns the written file path.
    pub fn export(&self, config: &ExportConfig) -> Result<PathBuf> {
        let schema = self.bound()?;
        self.store
            .export_snapshot(schema.name(), config.format, &config.dir)
    }

    fn check_filter(&self, schema: &TableSchema, filter: &Row) -> Result<()> {
        for key in filter.keys() {
            if !schema.has_field(key) {
                log::warn!("{}: unknown field '{}' in filter", schema.name(), key);
                return Err(DormDbError::UnknownField {
                    table: schema.name().to_string(),
                    field: key.clone(),
                });
            }
        }
        Ok(())
    }
}

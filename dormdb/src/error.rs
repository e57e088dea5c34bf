use thiserror::Error;

#[derive(Error, Debug)]
pub enum DormDbError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown field '{field}' in table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("Unknown fields [{}] in table '{table}'", .fields.join(", "))]
    UnknownFields { table: String, fields: Vec<String> },

    #[error("No row in '{table}' matches {filter}")]
    NoMatch { table: String, filter: String },

    #[error("Invalid value for field '{field}': '{value}'")]
    InvalidValue { field: String, value: String },

    #[error("Constraint violation on '{table}' for row {row}: {source}")]
    Constraint {
        table: String,
        row: String,
        source: rusqlite::Error,
    },

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Controller is not bound to a table")]
    Unbound,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

pub type Result<T> = std::result::Result<T, DormDbError>;

pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod record;
pub mod schema;
pub mod store;

pub use config::{Config, ExportConfig};
pub use controller::Controller;
pub use error::{DormDbError, Result};
pub use export::ExportFormat;
pub use record::{Record, Row, Value};
pub use schema::{Table, TableSchema};
pub use store::RowStore;

use clap::{Parser, Subcommand, ValueEnum};
use dormdb::record::{row_from_fields, row_to_json, Record, Row};
use dormdb::schema::schema_for;
use dormdb::{Config, Controller, RowStore, Table};
use std::path::PathBuf;
use std::process;

/// dormdb CLI for managing dormitory records
#[derive(Parser)]
#[command(name = "dormdb", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "dormdb.yaml")]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Add a record
    Add {
        /// Table name
        table: String,
        /// Field values (e.g. --field room_number=471)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Search rows matching an equality filter
    Search {
        /// Table name
        table: String,
        /// Filter entries (e.g. --filter capacity=2)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// List all rows of a table
    List {
        /// Table name
        table: String,
    },

    /// Update rows matching a filter
    Update {
        /// Table name
        table: String,
        /// Filter entries (e.g. --filter id=10002)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        /// Changes to apply (e.g. --set capacity=3)
        #[arg(long = "set", value_parser = parse_key_value)]
        sets: Vec<(String, String)>,
    },

    /// Delete rows matching a filter
    Delete {
        /// Table name
        table: String,
        /// Filter entries (e.g. --filter id=10002)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// Export table snapshots using the configured format and directory
    Export {
        /// Table name; exports every table when omitted
        table: Option<String>,
    },

    /// Show a table's declared fields
    Fields {
        /// Table name
        table: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Add { table, fields } => {
            let bound: Table = table.parse()?;
            let record = Record::from_fields(bound, &fields)?;
            let mut controller = controller_for(&config, &table)?;
            let stored = controller.add(record)?;
            print_output(
                &serde_json::json!({ "ok": true, "record": row_to_json(&stored.to_row()) }),
                &cli.format,
            );
        }

        Command::Search { table, filters } => {
            let filter = parse_filter(&table, &filters)?;
            let controller = controller_for(&config, &table)?;
            let records = controller.search(&filter)?;
            print_records(&records, &cli.format);
        }

        Command::List { table } => {
            let controller = controller_for(&config, &table)?;
            let records = controller.all_rows()?;
            print_records(&records, &cli.format);
        }

        Command::Update {
            table,
            filters,
            sets,
        } => {
            let filter = parse_filter(&table, &filters)?;
            let changes = parse_filter(&table, &sets)?;
            let controller = controller_for(&config, &table)?;
            let count = controller.update(&filter, &changes)?;
            print_output(
                &serde_json::json!({ "ok": true, "updated": count }),
                &cli.format,
            );
        }

        Command::Delete { table, filters } => {
            let filter = parse_filter(&table, &filters)?;
            let controller = controller_for(&config, &table)?;
            let count = controller.delete(&filter)?;
            print_output(
                &serde_json::json!({ "ok": true, "deleted": count }),
                &cli.format,
            );
        }

        Command::Export { table } => {
            let mut written = Vec::new();
            match table {
                Some(name) => {
                    let controller = controller_for(&config, &name)?;
                    written.push(controller.export(&config.export)?);
                }
                None => {
                    let store = RowStore::open(&config.database)?;
                    for table in Table::ALL {
                        written.push(store.export_snapshot(
                            table.as_str(),
                            config.export.format,
                            &config.export.dir,
                        )?);
                    }
                }
            }
            let files: Vec<String> = written
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            print_output(
                &serde_json::json!({ "ok": true, "files": files }),
                &cli.format,
            );
        }

        Command::Fields { table } => {
            let controller = controller_for(&config, &table)?;
            print_output(
                &serde_json::json!({ "table": table, "fields": controller.schema_fields()? }),
                &cli.format,
            );
        }
    }

    Ok(())
}

fn controller_for(config: &Config, table: &str) -> Result<Controller, dormdb::DormDbError> {
    let store = RowStore::open(&config.database)?;
    Controller::bind(store, table)
}

fn parse_filter(table: &str, pairs: &[(String, String)]) -> Result<Row, dormdb::DormDbError> {
    row_from_fields(schema_for(table)?, pairs)
}

fn print_records(records: &[Record], format: &OutputFormat) {
    let rows: Vec<serde_json::Value> = records
        .iter()
        .map(|r| row_to_json(&r.to_row()))
        .collect();
    print_output(&serde_json::Value::Array(rows), format);
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).unwrap());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value).unwrap());
        }
    }
}

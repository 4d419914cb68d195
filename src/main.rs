//! Purpose: `tabulite` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Query results are emitted as JSON Lines on stdout.
//! Invariants: Errors are emitted as a JSON object on stderr.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
//! Invariants: All table mutations go through `core::registry::TableRegistry`.
use std::error::Error as StdError;
use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tabulite::core::error::{Error, ErrorKind, to_exit_code};
use tabulite::core::record::Record;
use tabulite::core::registry::{AggregateOp, TableRegistry};
use tabulite::core::store::FileStore;
use tabulite::core::table::{Query, Table, TableKind};

mod table_paths;

use table_paths::{TableNameResolveError, default_table_dir, resolve_named_table_path};

#[derive(Parser, Debug)]
#[command(
    name = "tabulite",
    version,
    about = "Flat-file relational tables: insert, select, join, aggregate"
)]
struct Cli {
    /// Table directory (default: ~/.tabulite/tables)
    #[arg(long = "dir", global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new empty table of the given kind
    Create {
        /// Table kind: employee, department, or client
        kind: String,
        /// Table name (also the file stem under the table directory)
        name: String,
    },
    /// Insert one record; values are positional in schema order
    Insert {
        table: String,
        #[arg(required = true, num_args = 1..)]
        values: Vec<String>,
    },
    /// Select records with kind-appropriate criteria
    Select {
        table: String,
        /// employee: MIN-ID MAX-ID; department: NAME; client: MIN-POINTS
        #[arg(allow_negative_numbers = true)]
        criteria: Vec<String>,
    },
    /// Equi-join two tables on one column from each side
    Join {
        left: String,
        right: String,
        left_key: String,
        right_key: String,
    },
    /// Chain equi-joins across several tables, left to right
    MultiJoin {
        #[arg(required = true, num_args = 1..)]
        tables: Vec<String>,
        /// Join condition per step, as LEFT-KEY=RIGHT-KEY
        #[arg(long = "on", value_name = "LEFT=RIGHT")]
        on: Vec<String>,
    },
    /// Aggregate a numeric column: avg, max, min, or count
    Aggregate {
        table: String,
        op: String,
        column: String,
    },
    /// List the tables in the table directory
    List,
    /// Emit shell completions
    Completions { shell: Shell },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let dir = cli.dir.unwrap_or_else(default_table_dir);
    if let Err(err) = run(cli.command, &dir) {
        emit_error(&err);
        std::process::exit(to_exit_code(err.kind()));
    }
}

fn run(command: Command, dir: &Path) -> Result<(), Error> {
    match command {
        Command::Create { kind, name } => {
            let kind = TableKind::from_label(&kind).ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown table kind {kind:?}"))
                    .with_hint("Supported kinds: employee, department, client.")
            })?;
            std::fs::create_dir_all(dir).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to create table directory")
                    .with_path(dir)
                    .with_source(err)
            })?;
            let path = resolve_table_path(&name, dir)?;
            let store = FileStore::create(&path, kind.columns())?;
            debug!(table = %name, kind = kind.label(), "created table");
            print_value(&json!({
                "created": {
                    "table": name,
                    "kind": kind.label(),
                    "path": store.path().display().to_string(),
                }
            }))
        }
        Command::Insert { table, values } => {
            let mut registry = open_registry(dir)?;
            registry.insert_record(&table, &values.join(" "))?;
            let rows = registry.table(&table)?.entries().len();
            print_value(&json!({ "inserted": { "table": table, "rows": rows } }))
        }
        Command::Select { table, criteria } => {
            let registry = open_registry(dir)?;
            let kind = registry.table(&table)?.kind();
            let query = parse_criteria(kind, &criteria)?;
            print_records(&registry.select_records(&table, &query)?)
        }
        Command::Join {
            left,
            right,
            left_key,
            right_key,
        } => {
            let registry = open_registry(dir)?;
            print_records(&registry.join_tables(&left, &right, &left_key, &right_key)?)
        }
        Command::MultiJoin { tables, on } => {
            let registry = open_registry(dir)?;
            let names: Vec<&str> = tables.iter().map(String::as_str).collect();
            let conditions = parse_conditions(&on)?;
            let conditions: Vec<(&str, &str)> = conditions
                .iter()
                .map(|(left, right)| (left.as_str(), right.as_str()))
                .collect();
            print_records(&registry.multi_join(&names, &conditions)?)
        }
        Command::Aggregate { table, op, column } => {
            let registry = open_registry(dir)?;
            let op: AggregateOp = op.parse()?;
            let value = registry.aggregate(&table, op, &column)?;
            let value_json = match op {
                AggregateOp::Count => Value::from(value as u64),
                _ => Value::from(value),
            };
            print_value(&json!({
                "table": table,
                "op": op.as_str(),
                "column": column,
                "value": value_json,
            }))
        }
        Command::List => {
            let registry = open_registry(dir)?;
            for name in registry.table_names() {
                let table = registry.table(name)?;
                print_value(&json!({
                    "table": name,
                    "kind": table.kind().label(),
                    "rows": table.entries().len(),
                }))?;
            }
            Ok(())
        }
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "tabulite", &mut io::stdout());
            Ok(())
        }
    }
}

/// Opens every table file in the directory and registers it under its file
/// stem. A missing directory yields an empty registry.
fn open_registry(dir: &Path) -> Result<TableRegistry, Error> {
    let mut registry = TableRegistry::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(registry),
        Err(err) => {
            return Err(Error::new(ErrorKind::Io)
                .with_message("failed to read table directory")
                .with_path(dir)
                .with_source(err));
        }
    };

    for entry in entries {
        let entry = entry.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read table directory entry")
                .with_path(dir)
                .with_source(err)
        })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("tbl") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        let store = FileStore::new(&path);
        let Some(columns) = store.columns()? else {
            continue;
        };
        let kind = TableKind::from_columns(&columns).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt)
                .with_message("header does not match any known table kind")
                .with_path(&path)
        })?;
        let table = Table::open(kind, Box::new(store))?;
        registry.register_table(name, table)?;
    }
    Ok(registry)
}

fn resolve_table_path(name: &str, dir: &Path) -> Result<PathBuf, Error> {
    resolve_named_table_path(name, dir).map_err(|err| match err {
        TableNameResolveError::ContainsPathSeparator => Error::new(ErrorKind::Usage)
            .with_message("table name must not contain path separators")
            .with_table(name),
    })
}

fn parse_criteria(kind: TableKind, criteria: &[String]) -> Result<Query, Error> {
    match kind {
        TableKind::Employee => {
            let [min, max] = expect_criteria::<2>(kind, criteria, "MIN-ID MAX-ID")?;
            Ok(Query::IdRange {
                min: parse_bound(min)?,
                max: parse_bound(max)?,
            })
        }
        TableKind::Department => {
            let [name] = expect_criteria::<1>(kind, criteria, "DEPT-NAME")?;
            Ok(Query::DeptName(name.clone()))
        }
        TableKind::Client => {
            let [min] = expect_criteria::<1>(kind, criteria, "MIN-POINTS")?;
            Ok(Query::MinPoints(parse_bound(min)?))
        }
    }
}

fn expect_criteria<'a, const N: usize>(
    kind: TableKind,
    criteria: &'a [String],
    shape: &str,
) -> Result<[&'a String; N], Error> {
    let criteria: [&String; N] = match criteria.iter().collect::<Vec<_>>().try_into() {
        Ok(criteria) => criteria,
        Err(_) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "a {} table takes {N} selection criteria, got {}",
                    kind.label(),
                    criteria.len()
                ))
                .with_hint(format!("Usage: select <table> {shape}")));
        }
    };
    Ok(criteria)
}

fn parse_bound(value: &str) -> Result<i64, Error> {
    value.parse().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("criteria value {value:?} is not an integer"))
            .with_source(err)
    })
}

fn parse_conditions(on: &[String]) -> Result<Vec<(String, String)>, Error> {
    on.iter()
        .map(|condition| {
            condition
                .split_once('=')
                .map(|(left, right)| (left.to_string(), right.to_string()))
                .ok_or_else(|| {
                    Error::new(ErrorKind::Usage)
                        .with_message(format!(
                            "join condition {condition:?} must look like LEFT-KEY=RIGHT-KEY"
                        ))
                        .with_hint("Example: --on dept_id=dept_id")
                })
        })
        .collect()
}

fn print_records(records: &[Record]) -> Result<(), Error> {
    for record in records {
        let line = serde_json::to_string(record).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to serialize record")
                .with_source(err)
        })?;
        println!("{line}");
    }
    Ok(())
}

fn print_value(value: &Value) -> Result<(), Error> {
    println!("{value}");
    Ok(())
}

fn emit_error(err: &Error) {
    eprintln!("{}", error_json(err));
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_message(err: &Error) -> String {
    match err.message() {
        Some(message) => message.to_string(),
        None => format!("{:?}", err.kind()),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::{error_json, parse_conditions, parse_criteria};
    use tabulite::core::error::{Error, ErrorKind};
    use tabulite::core::table::{Query, TableKind};

    #[test]
    fn criteria_parse_per_kind() {
        let query = parse_criteria(
            TableKind::Employee,
            &["2".to_string(), "3".to_string()],
        )
        .expect("employee");
        assert_eq!(query, Query::IdRange { min: 2, max: 3 });

        let query =
            parse_criteria(TableKind::Department, &["HR".to_string()]).expect("department");
        assert_eq!(query, Query::DeptName("HR".to_string()));

        let query = parse_criteria(TableKind::Client, &["50".to_string()]).expect("client");
        assert_eq!(query, Query::MinPoints(50));
    }

    #[test]
    fn criteria_arity_is_usage_error() {
        let err = parse_criteria(TableKind::Employee, &["2".to_string()]).expect_err("arity");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = parse_criteria(TableKind::Client, &["a".to_string()]).expect_err("numeric");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn conditions_require_equals_sign() {
        let parsed = parse_conditions(&["dept_id=dept_id".to_string()]).expect("parse");
        assert_eq!(parsed, [("dept_id".to_string(), "dept_id".to_string())]);

        let err = parse_conditions(&["dept_id".to_string()]).expect_err("parse");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn error_json_has_kind_and_message() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("table is not registered")
            .with_table("employees");
        let value = error_json(&err);
        let obj = value
            .get("error")
            .and_then(|value| value.as_object())
            .expect("error object");
        assert_eq!(obj.get("kind").and_then(|v| v.as_str()), Some("NotFound"));
        assert_eq!(
            obj.get("message").and_then(|v| v.as_str()),
            Some("table is not registered")
        );
        assert_eq!(obj.get("table").and_then(|v| v.as_str()), Some("employees"));
    }
}

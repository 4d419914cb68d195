//! Purpose: Cross-table operations over an explicit registry of named tables.
//! Exports: `TableRegistry`, `AggregateOp`.
//! Role: The engine's public operation surface; one registry per logical database.
//! Invariants: Table names are unique; registration never replaces a table.
//! Invariants: Joins are nested-loop, order-respecting, with right-overlays-left merges.
//! Invariants: No hidden global state; callers own the registry they operate on.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::record::Record;
use crate::core::table::{Query, Table, TableKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateOp {
    Avg,
    Max,
    Min,
    Count,
}

impl AggregateOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateOp::Avg => "avg",
            AggregateOp::Max => "max",
            AggregateOp::Min => "min",
            AggregateOp::Count => "count",
        }
    }
}

impl FromStr for AggregateOp {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Error> {
        match value {
            "avg" => Ok(AggregateOp::Avg),
            "max" => Ok(AggregateOp::Max),
            "min" => Ok(AggregateOp::Min),
            "count" => Ok(AggregateOp::Count),
            other => Err(Error::new(ErrorKind::UnknownOperation)
                .with_message(format!("unknown aggregate operation {other:?}"))
                .with_hint("Supported operations: avg, max, min, count.")),
        }
    }
}

#[derive(Default)]
pub struct TableRegistry {
    tables: HashMap<String, Table>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    pub fn register_table(&mut self, name: impl Into<String>, table: Table) -> Result<(), Error> {
        let name = name.into();
        if self.tables.contains_key(&name) {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message("table is already registered")
                .with_table(name));
        }
        debug!(table = %name, kind = table.kind().label(), "registered table");
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&Table, Error> {
        self.tables.get(name).ok_or_else(|| not_found(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn insert_record(&mut self, name: &str, raw: &str) -> Result<(), Error> {
        let table = self.tables.get_mut(name).ok_or_else(|| not_found(name))?;
        table.add_entry(raw).map_err(|err| err.with_table(name))?;
        debug!(table = name, rows = table.entries().len(), "inserted record");
        Ok(())
    }

    pub fn select_records(&self, name: &str, query: &Query) -> Result<Vec<Record>, Error> {
        self.table(name)?
            .search(query)
            .map_err(|err| err.with_table(name))
    }

    /// Pairwise equi-join in nested-loop order: all matches for the first
    /// left entry, then the next. Output rows are not deduplicated.
    pub fn join_tables(
        &self,
        left: &str,
        right: &str,
        left_key: &str,
        right_key: &str,
    ) -> Result<Vec<Record>, Error> {
        let left_table = self.table(left)?;
        let right_table = self.table(right)?;
        require_column(left_table.kind(), left_key, left)?;
        require_column(right_table.kind(), right_key, right)?;
        Ok(equi_join(
            left_table.entries(),
            right_table.entries(),
            left_key,
            right_key,
        ))
    }

    /// Chains the pairwise join left to right: the accumulator starts as the
    /// first table's entries, and each condition joins it against the next
    /// table. Inner-join semantics apply at every step.
    pub fn multi_join(
        &self,
        names: &[&str],
        conditions: &[(&str, &str)],
    ) -> Result<Vec<Record>, Error> {
        if names.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArity)
                .with_message("multi-join requires at least one table"));
        }
        if conditions.len() != names.len() - 1 {
            return Err(Error::new(ErrorKind::InvalidArity).with_message(format!(
                "expected {} join conditions for {} tables, got {}",
                names.len() - 1,
                names.len(),
                conditions.len()
            )));
        }

        let mut result = self.table(names[0])?.entries().to_vec();
        for (name, (left_key, right_key)) in names[1..].iter().zip(conditions) {
            let table = self.table(name)?;
            require_column(table.kind(), right_key, name)?;
            result = equi_join(&result, table.entries(), left_key, right_key);
        }
        Ok(result)
    }

    /// Aggregates the numeric values of `column` over every entry that
    /// contains it. A present value that fails to parse is an error; entries
    /// missing the column entirely are skipped.
    pub fn aggregate(&self, name: &str, op: AggregateOp, column: &str) -> Result<f64, Error> {
        let table = self.table(name)?;
        let mut values = Vec::new();
        for entry in table.entries() {
            let Some(raw) = entry.get(column) else {
                continue;
            };
            let value: f64 = raw.parse().map_err(|err| {
                Error::new(ErrorKind::Parse)
                    .with_message(format!("value {raw:?} is not numeric"))
                    .with_table(name)
                    .with_column(column)
                    .with_source(err)
            })?;
            values.push(value);
        }

        match op {
            AggregateOp::Count => Ok(values.len() as f64),
            AggregateOp::Avg => {
                if values.is_empty() {
                    return Err(empty_aggregate(op, name, column));
                }
                Ok(values.iter().sum::<f64>() / values.len() as f64)
            }
            AggregateOp::Max => {
                if values.is_empty() {
                    return Err(empty_aggregate(op, name, column));
                }
                Ok(values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            }
            AggregateOp::Min => {
                if values.is_empty() {
                    return Err(empty_aggregate(op, name, column));
                }
                Ok(values.iter().copied().fold(f64::INFINITY, f64::min))
            }
        }
    }
}

fn equi_join(left: &[Record], right: &[Record], left_key: &str, right_key: &str) -> Vec<Record> {
    let mut joined = Vec::new();
    for left_entry in left {
        for right_entry in right {
            match (left_entry.get(left_key), right_entry.get(right_key)) {
                (Some(a), Some(b)) if a == b => joined.push(left_entry.merged(right_entry)),
                _ => {}
            }
        }
    }
    joined
}

fn require_column(kind: TableKind, column: &str, table: &str) -> Result<(), Error> {
    if kind.columns().contains(&column) {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message(format!("column is not in the {} schema", kind.label()))
        .with_table(table)
        .with_column(column))
}

fn not_found(name: &str) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("table is not registered")
        .with_table(name)
}

fn empty_aggregate(op: AggregateOp, name: &str, column: &str) -> Error {
    Error::new(ErrorKind::EmptyAggregate)
        .with_message(format!(
            "cannot compute {} over an empty value set",
            op.as_str()
        ))
        .with_table(name)
        .with_column(column)
}

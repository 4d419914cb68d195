//! Purpose: Table semantics for the closed set of table kinds.
//! Exports: `TableKind`, `Query`, `Table`.
//! Role: Owns one schema's records; enforces shape and primary-key uniqueness.
//! Invariants: No two entries of a table share an equal primary key.
//! Invariants: Entry order is insertion order and is the persistence order.
//! Invariants: Every successful insert is persisted before `add_entry` returns.

use crate::core::error::{Error, ErrorKind};
use crate::core::record::Record;
use crate::core::store::RecordStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableKind {
    Employee,
    Department,
    Client,
}

impl TableKind {
    pub const ALL: &'static [TableKind] =
        &[TableKind::Employee, TableKind::Department, TableKind::Client];

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Employee => &["id", "dept_id", "name", "age", "salary"],
            TableKind::Department => &["dept_id", "dept_name"],
            TableKind::Client => &[
                "client_id",
                "name",
                "email",
                "phone",
                "address",
                "points",
                "emp_id",
            ],
        }
    }

    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Employee => &["id", "dept_id"],
            TableKind::Department => &["dept_id"],
            TableKind::Client => &["client_id"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableKind::Employee => "employee",
            TableKind::Department => "department",
            TableKind::Client => "client",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.label() == label)
    }

    /// Matches a stored header line back to its kind.
    pub fn from_columns(columns: &[String]) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.columns().iter().copied().eq(columns.iter().map(String::as_str)))
    }

    pub fn primary_key(self, record: &Record) -> Vec<String> {
        self.key_columns()
            .iter()
            .map(|column| record.get(column).unwrap_or("").to_string())
            .collect()
    }

    // Client rows may omit `points`; it defaults to zero.
    fn defaultable_column(self) -> Option<(&'static str, &'static str)> {
        match self {
            TableKind::Client => Some(("points", "0")),
            _ => None,
        }
    }

    /// Builds a record from a whitespace-delimited positional value list.
    pub fn record_from_raw(self, raw: &str) -> Result<Record, Error> {
        let columns = self.columns();
        let mut values: Vec<&str> = raw.split_whitespace().collect();
        let supplied = values.len();

        if supplied + 1 == columns.len() {
            if let Some((column, default)) = self.defaultable_column() {
                if let Some(index) = columns.iter().position(|name| *name == column) {
                    values.insert(index, default);
                }
            }
        }
        if values.len() != columns.len() {
            return Err(Error::new(ErrorKind::InvalidShape).with_message(format!(
                "expected {} values for a {} row, got {supplied}",
                columns.len(),
                self.label()
            )));
        }

        Ok(Record::from_pairs(columns.iter().copied().zip(values)))
    }
}

/// Kind-specific search criteria. Range bounds are numeric; the matching
/// column values are parsed at evaluation time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Query {
    /// Employee: numeric `id` within `[min, max]` inclusive.
    IdRange { min: i64, max: i64 },
    /// Department: exact `dept_name` equality.
    DeptName(String),
    /// Client: numeric `points` strictly greater than the bound.
    MinPoints(i64),
}

pub struct Table {
    kind: TableKind,
    store: Box<dyn RecordStore>,
    entries: Vec<Record>,
}

impl Table {
    /// Opens a table over its backing store, loading the full record set.
    pub fn open(kind: TableKind, store: Box<dyn RecordStore>) -> Result<Self, Error> {
        let mut table = Self {
            kind,
            store,
            entries: Vec::new(),
        };
        table.load()?;
        Ok(table)
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn entries(&self) -> &[Record] {
        &self.entries
    }

    pub fn load(&mut self) -> Result<(), Error> {
        self.entries = self.store.load(self.kind.columns())?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), Error> {
        self.store.save(self.kind.columns(), &self.entries)
    }

    /// Appends one record built from positional values, then persists.
    /// The duplicate-key check runs before any mutation.
    pub fn add_entry(&mut self, raw: &str) -> Result<(), Error> {
        let record = self.kind.record_from_raw(raw)?;
        let key = self.kind.primary_key(&record);
        if self
            .entries
            .iter()
            .any(|existing| self.kind.primary_key(existing) == key)
        {
            return Err(Error::new(ErrorKind::DuplicateKey).with_message(format!(
                "record with key ({}) already exists",
                key.join(", ")
            )));
        }
        self.entries.push(record);
        if let Err(err) = self.save() {
            self.entries.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Filters entries by kind-appropriate criteria, preserving entry order.
    /// Entries missing the filtered column are skipped.
    pub fn search(&self, query: &Query) -> Result<Vec<Record>, Error> {
        match (self.kind, query) {
            (TableKind::Employee, Query::IdRange { min, max }) => {
                self.filter_numeric("id", |id| *min <= id && id <= *max)
            }
            (TableKind::Department, Query::DeptName(name)) => Ok(self
                .entries
                .iter()
                .filter(|entry| entry.get("dept_name") == Some(name.as_str()))
                .cloned()
                .collect()),
            (TableKind::Client, Query::MinPoints(min)) => {
                self.filter_numeric("points", |points| points > *min)
            }
            (kind, query) => Err(Error::new(ErrorKind::Usage).with_message(format!(
                "criteria {query:?} do not apply to a {} table",
                kind.label()
            ))),
        }
    }

    fn filter_numeric(&self, column: &str, keep: impl Fn(i64) -> bool) -> Result<Vec<Record>, Error> {
        let mut matches = Vec::new();
        for entry in &self.entries {
            let Some(raw) = entry.get(column) else {
                continue;
            };
            let value: i64 = raw.parse().map_err(|err| {
                Error::new(ErrorKind::Parse)
                    .with_message(format!("value {raw:?} is not an integer"))
                    .with_column(column)
                    .with_source(err)
            })?;
            if keep(value) {
                matches.push(entry.clone());
            }
        }
        Ok(matches)
    }
}

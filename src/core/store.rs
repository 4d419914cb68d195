// Flat-file record storage: header validation, whole-file load, locked rewrite.
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::core::error::{Error, ErrorKind};
use crate::core::record::Record;

const DELIMITER: char = ',';

/// Backing-store collaborator for one table: reads the full record set at
/// construction time and rewrites it in full on demand.
pub trait RecordStore {
    fn load(&self, columns: &[&str]) -> Result<Vec<Record>, Error>;
    fn save(&self, columns: &[&str], entries: &[Record]) -> Result<(), Error>;
}

/// One table per file: a header line naming the columns, then one record per
/// line with fields in column order. A missing file loads as empty.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates a new empty table file (header only). Fails if the path exists.
    pub fn create(path: impl Into<PathBuf>, columns: &[&str]) -> Result<Self, Error> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .map_err(|err| {
                let kind = if err.kind() == io::ErrorKind::AlreadyExists {
                    ErrorKind::AlreadyExists
                } else {
                    ErrorKind::Io
                };
                Error::new(kind)
                    .with_message("failed to create table file")
                    .with_path(&path)
                    .with_source(err)
            })?;
        let mut header = columns.join(&DELIMITER.to_string());
        header.push('\n');
        file.write_all(header.as_bytes())
            .map_err(|err| io_error(err, "failed to write table header", &path))?;
        file.flush()
            .map_err(|err| io_error(err, "failed to flush table header", &path))?;
        Ok(Self { path })
    }

    /// Reads the header line, if the file exists. Used to infer a table's
    /// kind before the table itself is opened.
    pub fn columns(&self) -> Result<Option<Vec<String>>, Error> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(err, "failed to read table file", &self.path)),
        };
        let Some(header) = text.lines().next() else {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("table file has no header line")
                .with_path(&self.path));
        };
        Ok(Some(header.split(DELIMITER).map(str::to_string).collect()))
    }
}

impl RecordStore for FileStore {
    fn load(&self, columns: &[&str]) -> Result<Vec<Record>, Error> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(err, "failed to read table file", &self.path)),
        };

        let mut lines = text.lines();
        let Some(header) = lines.next() else {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("table file has no header line")
                .with_path(&self.path));
        };
        let found: Vec<&str> = header.split(DELIMITER).collect();
        if found != columns {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "header mismatch: expected [{}], found [{}]",
                    columns.join(", "),
                    found.join(", ")
                ))
                .with_path(&self.path));
        }

        let mut entries = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(DELIMITER).collect();
            if fields.len() != columns.len() {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!(
                        "row has {} fields, schema has {} columns",
                        fields.len(),
                        columns.len()
                    ))
                    .with_path(&self.path));
            }
            entries.push(Record::from_pairs(
                columns.iter().copied().zip(fields.iter().copied()),
            ));
        }
        Ok(entries)
    }

    fn save(&self, columns: &[&str], entries: &[Record]) -> Result<(), Error> {
        let mut payload = columns.join(&DELIMITER.to_string());
        payload.push('\n');
        for entry in entries {
            let mut fields = Vec::with_capacity(columns.len());
            for column in columns {
                // Absent columns persist as empty fields.
                let value = entry.get(column).unwrap_or("");
                if value.contains(DELIMITER) || value.contains('\n') || value.contains('\r') {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("value {value:?} contains the field delimiter"))
                        .with_column(*column)
                        .with_path(&self.path));
                }
                fields.push(value);
            }
            payload.push_str(&fields.join(&DELIMITER.to_string()));
            payload.push('\n');
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| io_error(err, "failed to open table file for rewrite", &self.path))?;
        let _lock = RewriteLock::acquire(&file, &self.path)?;
        file.set_len(0)
            .map_err(|err| io_error(err, "failed to truncate table file", &self.path))?;
        (&file)
            .seek(SeekFrom::Start(0))
            .map_err(|err| io_error(err, "failed to rewind table file", &self.path))?;
        (&file)
            .write_all(payload.as_bytes())
            .map_err(|err| io_error(err, "failed to rewrite table file", &self.path))?;
        (&file)
            .flush()
            .map_err(|err| io_error(err, "failed to flush table file", &self.path))?;
        Ok(())
    }
}

struct RewriteLock<'a> {
    file: &'a File,
}

impl<'a> RewriteLock<'a> {
    fn acquire(file: &'a File, path: &Path) -> Result<Self, Error> {
        file.lock_exclusive()
            .map_err(|err| io_error(err, "failed to lock table file", path))?;
        Ok(Self { file })
    }
}

impl<'a> Drop for RewriteLock<'a> {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(self.file);
    }
}

fn io_error(err: io::Error, message: &str, path: &Path) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

// Ledger Manager
//
// Owns the ledger table: mints sequential identifiers, marks older records
// for a reprocessed path as replaced, and persists the result through a
// `LedgerStore`. Nothing is persisted until the full new table is built.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::container::ContainerError;
use crate::codec::{CodecError, Table, TableError};
use crate::config::LedgerConfig;
use crate::export::{self, ReportStyle};
use crate::invariants::{InvariantEngine, InvariantViolation};

pub mod source;
pub mod status;
pub mod store;

pub use source::{SourceMetadata, FOLDER_MARKER};
pub use status::RecordStatus;
pub use store::{ContainerStore, InMemoryLedgerStore, LedgerStore};

pub const STATUS: &str = "Status";
pub const UNIQUE_ID: &str = "Unique ID";
pub const ORIGINAL_FILE_PATH: &str = "Original File Path";
pub const FILENAME: &str = "Filename";
pub const DATA_TAKEN: &str = "Data Taken";
pub const DATE_PLOT: &str = "Date Plot";

/// Ledger columns in storage order.
pub const LEDGER_COLUMNS: [&str; 6] = [
    STATUS,
    UNIQUE_ID,
    ORIGINAL_FILE_PATH,
    FILENAME,
    DATA_TAKEN,
    DATE_PLOT,
];

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf, source: io::Error },

    #[error("source path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("cannot parse unique id `{value}`: {source}")]
    IdentifierParse { value: String, source: uuid::Error },

    #[error("unique id space exhausted")]
    IdentifierOverflow,

    #[error("ledger table has no `{0}` column")]
    MissingColumn(&'static str),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// 128-bit sequential record identifier, shown in UUID form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueId(pub Uuid);

impl UniqueId {
    /// The first identifier ever handed out.
    pub const fn zero() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// The identifier after this one. Fails rather than wrapping.
    pub fn next(&self) -> Result<Self, LedgerError> {
        self.as_u128()
            .checked_add(1)
            .map(Self::from_u128)
            .ok_or(LedgerError::IdentifierOverflow)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for UniqueId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|source| LedgerError::IdentifierParse {
                value: s.to_string(),
                source,
            })
    }
}

/// One parsed ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    #[serde(rename = "Status")]
    pub status: RecordStatus,
    #[serde(rename = "Unique ID")]
    pub unique_id: UniqueId,
    #[serde(rename = "Original File Path")]
    pub original_file_path: String,
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Data Taken")]
    pub data_taken: String,
    #[serde(rename = "Date Plot")]
    pub date_plot: String,
}

/// Positions of the ledger columns inside a loaded table.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    status: usize,
    unique_id: usize,
    path: usize,
    filename: usize,
    data_taken: usize,
    date_plot: usize,
}

impl ColumnMap {
    fn resolve(table: &Table) -> Result<Self, LedgerError> {
        let find = |name: &'static str| {
            table
                .column_index(name)
                .ok_or(LedgerError::MissingColumn(name))
        };
        Ok(Self {
            status: find(STATUS)?,
            unique_id: find(UNIQUE_ID)?,
            path: find(ORIGINAL_FILE_PATH)?,
            filename: find(FILENAME)?,
            data_taken: find(DATA_TAKEN)?,
            date_plot: find(DATE_PLOT)?,
        })
    }

    /// Lay out a new row in the table's column order. Columns the ledger
    /// does not know about are left blank.
    fn row(
        &self,
        width: usize,
        status: RecordStatus,
        id: UniqueId,
        meta: &SourceMetadata,
    ) -> Vec<String> {
        let mut row = vec![String::new(); width];
        row[self.status] = status.to_string();
        row[self.unique_id] = id.to_string();
        row[self.path] = meta.original_path.clone();
        row[self.filename] = meta.filename.clone();
        row[self.data_taken] = meta.data_taken.clone();
        row[self.date_plot] = meta.date_plot.clone();
        row
    }

    fn record(&self, row: &[String]) -> Result<LedgerRecord, LedgerError> {
        Ok(LedgerRecord {
            status: RecordStatus::from(row[self.status].as_str()),
            unique_id: row[self.unique_id].parse()?,
            original_file_path: row[self.path].clone(),
            filename: row[self.filename].clone(),
            data_taken: row[self.data_taken].clone(),
            date_plot: row[self.date_plot].clone(),
        })
    }
}

/// A fresh, empty ledger table.
pub fn empty_ledger() -> Result<Table, TableError> {
    Table::text(LEDGER_COLUMNS.iter().map(|c| c.to_string()).collect())
}

/// Sole issuer of ledger identifiers.
#[derive(Debug)]
pub struct LedgerManager<S: LedgerStore = ContainerStore> {
    store: S,
}

impl LedgerManager<ContainerStore> {
    /// Manager over the container file named by `config`.
    pub fn open(config: &LedgerConfig) -> Self {
        Self::new(ContainerStore::from_config(config))
    }
}

impl<S: LedgerStore> LedgerManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record one ingestion of `source` and return its identifier.
    pub fn record_entry(&mut self, source: impl AsRef<Path>) -> Result<UniqueId, LedgerError> {
        self.record_entry_at(source, Local::now())
    }

    /// As [`record_entry`](Self::record_entry), with an explicit
    /// `Date Plot` time.
    pub fn record_entry_at(
        &mut self,
        source: impl AsRef<Path>,
        now: DateTime<Local>,
    ) -> Result<UniqueId, LedgerError> {
        let meta = SourceMetadata::capture(source.as_ref(), now)?;

        let mut table = self.table()?;
        let columns = ColumnMap::resolve(&table)?;

        let unique_id = match table.rows().last() {
            Some(last) => last[columns.unique_id].parse::<UniqueId>()?.next()?,
            None => UniqueId::zero(),
        };

        let superseded = supersede(&mut table, &columns, &meta.original_path);

        let row = columns.row(table.columns().len(), RecordStatus::New, unique_id, &meta);
        table.push_row(row)?;

        self.store.persist(&table)?;

        if superseded > 0 {
            log::info!(
                "{} earlier record(s) for {} marked {}",
                superseded,
                meta.original_path,
                RecordStatus::Replaced
            );
        }
        log::info!("recorded {} as {}", meta.original_path, unique_id);

        Ok(unique_id)
    }

    /// The persisted ledger, or an empty one when nothing is stored.
    pub fn table(&self) -> Result<Table, LedgerError> {
        match self.store.load()? {
            Some(table) => Ok(table),
            None => Ok(empty_ledger()?),
        }
    }

    /// Every persisted record, in ledger order.
    pub fn records(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let table = self.table()?;
        let columns = ColumnMap::resolve(&table)?;
        table
            .rows()
            .iter()
            .map(|row| columns.record(row))
            .collect()
    }

    /// Check the persisted ledger against `engine`. Returns the number of
    /// records checked.
    pub fn verify(&self, engine: &InvariantEngine) -> Result<usize, LedgerError> {
        let records = self.records()?;
        engine.evaluate(&records)?;
        Ok(records.len())
    }

    /// Write the styled report for the persisted ledger to `out`.
    /// Returns the number of records exported.
    pub fn export_report(&self, out: &Path, style: &ReportStyle) -> Result<usize, LedgerError> {
        let table = self.table()?;
        export::write_report(&table, out, style)?;
        Ok(table.len())
    }
}

/// Mark every row for `path` replaced. Returns how many rows matched.
fn supersede(table: &mut Table, columns: &ColumnMap, path: &str) -> usize {
    let matching: Vec<usize> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| row[columns.path] == path)
        .map(|(i, _)| i)
        .collect();

    for &i in &matching {
        let current = RecordStatus::from(table.rows()[i][columns.status].as_str());
        table.set_cell(i, columns.status, current.supersede().to_string());
    }
    matching.len()
}

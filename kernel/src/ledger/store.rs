// Ledger Storage Abstraction
//
// Where the ledger table lives between calls. The container-backed store
// rewrites the whole file on every persist; other strategies can be
// swapped in behind the same trait.

use std::fs;
use std::path::{Path, PathBuf};

use super::LedgerError;
use crate::codec::{self, container::Container, Table};
use crate::config::LedgerConfig;

/// Storage backend for the ledger table.
///
/// Implementations must return exactly what was last persisted, with row
/// order intact.
pub trait LedgerStore: Send + Sync {
    /// Load the current ledger. `None` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<Table>, LedgerError>;

    /// Replace the stored ledger with `table`.
    fn persist(&mut self, table: &Table) -> Result<(), LedgerError>;
}

/// Ledger kept as one section of a container file.
#[derive(Debug, Clone)]
pub struct ContainerStore {
    path: PathBuf,
    location: String,
}

impl ContainerStore {
    pub fn new(path: impl Into<PathBuf>, location: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            location: location.into(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.container_path.clone(), config.location.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl LedgerStore for ContainerStore {
    fn load(&self) -> Result<Option<Table>, LedgerError> {
        if !self.path.exists() {
            log::debug!("no container at {}", self.path.display());
            return Ok(None);
        }

        let container = Container::open(&self.path)?;
        if !container.contains(&self.location) {
            log::debug!("container has no `{}` section", self.location);
            return Ok(None);
        }

        let read = codec::read(&container, &self.location)?;
        Ok(Some(read.into_table()))
    }

    fn persist(&mut self, table: &Table) -> Result<(), LedgerError> {
        // Other sections already in the file are carried over.
        let mut container = if self.path.exists() {
            Container::open(&self.path)?
        } else {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            Container::new()
        };

        codec::write(&mut container, &self.location, table)?;
        container.save(&self.path)?;

        log::debug!(
            "persisted {} ledger rows to {}",
            table.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Volatile store, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    table: Option<Table>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: Table) -> Self {
        Self { table: Some(table) }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self) -> Result<Option<Table>, LedgerError> {
        Ok(self.table.clone())
    }

    fn persist(&mut self, table: &Table) -> Result<(), LedgerError> {
        self.table = Some(table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::container::{Section, TextArray};

    fn one_row() -> Table {
        let mut table = Table::text(vec!["a".into(), "b".into()]).unwrap();
        table.push_row(vec!["1".into(), "2".into()]).unwrap();
        table
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContainerStore::new(dir.path().join("tag_data.tlc"), "dataset");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn persist_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ContainerStore::new(dir.path().join("nested/tag_data.tlc"), "dataset");

        store.persist(&one_row()).unwrap();
        assert_eq!(store.load().unwrap(), Some(one_row()));
    }

    #[test]
    fn persist_keeps_foreign_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag_data.tlc");

        let mut container = Container::new();
        container.insert_section("notes", Section::new(TextArray::empty(1)));
        container.save(&path).unwrap();

        let mut store = ContainerStore::new(&path, "dataset");
        assert!(store.load().unwrap().is_none());
        store.persist(&one_row()).unwrap();

        let reopened = Container::open(&path).unwrap();
        assert!(reopened.contains("notes"));
        assert!(reopened.contains("dataset"));
    }

    #[test]
    fn in_memory_round_trip() {
        let mut store = InMemoryLedgerStore::new();
        assert!(store.load().unwrap().is_none());
        store.persist(&one_row()).unwrap();
        assert_eq!(store.load().unwrap(), Some(one_row()));
    }
}

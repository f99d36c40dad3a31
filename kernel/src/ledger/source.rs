// Source Metadata
//
// What the ledger records about a source file or folder at the moment it
// is ingested.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use super::LedgerError;
use crate::codec::table::TIMESTAMP_FORMAT;

/// Filename recorded for directory sources.
pub const FOLDER_MARKER: &str = "Folder";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Path exactly as given by the caller. This is the supersession key.
    pub original_path: String,
    pub filename: String,
    pub data_taken: String,
    pub date_plot: String,
}

impl SourceMetadata {
    /// Stat `path` and build its ledger metadata, stamped with `now`.
    ///
    /// Creation time is used when the platform reports it, otherwise the
    /// last modification time. The path must be valid UTF-8 since it is
    /// stored verbatim as the supersession key.
    pub fn capture(path: &Path, now: DateTime<Local>) -> Result<Self, LedgerError> {
        let original_path = path.to_str().ok_or_else(|| LedgerError::NonUtf8Path {
            path: path.to_path_buf(),
        })?;

        let meta = fs::metadata(path).map_err(|source| LedgerError::SourceNotFound {
            path: path.to_path_buf(),
            source,
        })?;

        let taken = meta.created().or_else(|_| meta.modified())?;

        let filename = if meta.is_dir() {
            FOLDER_MARKER.to_string()
        } else {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        };

        Ok(Self {
            original_path: original_path.to_string(),
            filename,
            data_taken: format_time(taken),
            date_plot: now.format(TIMESTAMP_FORMAT).to_string(),
        })
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

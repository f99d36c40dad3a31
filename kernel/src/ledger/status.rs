// Record Status
//
// A ledger record starts `New` and becomes `Replaced` once a later record
// is written for the same source path. There is no way back.

use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    /// Most recent record for its source path.
    New,

    /// Superseded by a later record for the same path.
    Replaced,

    /// Status text this ledger never writes itself, kept as found.
    Other(String),
}

impl RecordStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RecordStatus::New => "New",
            RecordStatus::Replaced => "Replaced",
            RecordStatus::Other(text) => text,
        }
    }

    /// Status after a newer record for the same path is added.
    pub fn supersede(self) -> RecordStatus {
        RecordStatus::Replaced
    }

    pub fn is_current(&self) -> bool {
        matches!(self, RecordStatus::New)
    }
}

impl From<&str> for RecordStatus {
    fn from(text: &str) -> Self {
        match text {
            "New" => RecordStatus::New,
            "Replaced" => RecordStatus::Replaced,
            other => RecordStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RecordStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

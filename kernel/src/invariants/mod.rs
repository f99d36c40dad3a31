// Ledger Invariants
//
// Pure rules over the full record list. A ledger that passes every
// registered invariant is consistent with how the manager writes it.

use std::collections::HashMap;

use crate::ledger::{LedgerRecord, RecordStatus, UniqueId};

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all invariants.
///
/// Invariants must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, records: &[LedgerRecord]) -> InvariantResult;
}

/// Invariant engine that evaluates a set of invariants.
#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    /// Create an engine with nothing registered.
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Engine preloaded with the built-in ledger rules.
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        engine.register(SequentialIdentifiers);
        engine.register(SingleNewPerPath);
        engine
    }

    /// Register an invariant.
    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.invariants.iter().map(|i| i.name()).collect()
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(&self, records: &[LedgerRecord]) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            match invariant.validate(records) {
                InvariantResult::Pass => continue,
                InvariantResult::Fail(reason) => {
                    return Err(InvariantViolation {
                        invariant: invariant.name(),
                        reason,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Returned when an invariant is violated.
#[derive(Debug, thiserror::Error)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

/// Row `i` carries identifier `i`.
pub struct SequentialIdentifiers;

impl Invariant for SequentialIdentifiers {
    fn name(&self) -> &'static str {
        "sequential-identifiers"
    }

    fn validate(&self, records: &[LedgerRecord]) -> InvariantResult {
        for (i, record) in records.iter().enumerate() {
            let expected = UniqueId::from_u128(i as u128);
            if record.unique_id != expected {
                return InvariantResult::Fail(format!(
                    "row {i} has id {}, expected {expected}",
                    record.unique_id
                ));
            }
        }
        InvariantResult::Pass
    }
}

/// Only the latest record for a path is `New`.
pub struct SingleNewPerPath;

impl Invariant for SingleNewPerPath {
    fn name(&self) -> &'static str {
        "single-new-per-path"
    }

    fn validate(&self, records: &[LedgerRecord]) -> InvariantResult {
        let mut last_row: HashMap<&str, usize> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            last_row.insert(record.original_file_path.as_str(), i);
        }

        for (i, record) in records.iter().enumerate() {
            let latest = last_row[record.original_file_path.as_str()] == i;
            let expected = if latest {
                RecordStatus::New
            } else {
                RecordStatus::Replaced
            };
            if record.status != expected {
                return InvariantResult::Fail(format!(
                    "row {i} for {} is {}, expected {expected}",
                    record.original_file_path, record.status
                ));
            }
        }
        InvariantResult::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u128, status: RecordStatus, path: &str) -> LedgerRecord {
        LedgerRecord {
            status,
            unique_id: UniqueId::from_u128(id),
            original_file_path: path.to_string(),
            filename: "run.csv".into(),
            data_taken: "2025-01-15 12:20:24".into(),
            date_plot: "2025-01-15 12:30:00".into(),
        }
    }

    fn valid_ledger() -> Vec<LedgerRecord> {
        vec![
            record(0, RecordStatus::Replaced, "/data/run1.csv"),
            record(1, RecordStatus::New, "/data/run2.csv"),
            record(2, RecordStatus::New, "/data/run1.csv"),
        ]
    }

    #[test]
    fn defaults_pass_on_consistent_ledger() {
        let engine = InvariantEngine::with_defaults();
        engine.evaluate(&valid_ledger()).unwrap();
        engine.evaluate(&[]).unwrap();
    }

    #[test]
    fn gap_in_identifiers_is_caught() {
        let mut records = valid_ledger();
        records[2].unique_id = UniqueId::from_u128(5);

        let err = InvariantEngine::with_defaults().evaluate(&records).unwrap_err();
        assert_eq!(err.invariant, "sequential-identifiers");
    }

    #[test]
    fn stale_new_row_is_caught() {
        let mut records = valid_ledger();
        records[0].status = RecordStatus::New;

        let err = InvariantEngine::with_defaults().evaluate(&records).unwrap_err();
        assert!(err.to_string().contains("single-new-per-path"));
    }

    #[test]
    fn empty_engine_accepts_anything() {
        let mut records = valid_ledger();
        records[1].status = RecordStatus::Replaced;
        InvariantEngine::new().evaluate(&records).unwrap();
    }
}

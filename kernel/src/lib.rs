// Tag Ledger Kernel
//
// Sequential-identifier ledger of analyzed data sources, persisted as a
// typed table inside a binary container.

pub mod codec;
pub mod config;
pub mod export;
pub mod invariants;
pub mod ledger;

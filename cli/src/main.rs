use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use tagledger_kernel::config::LedgerConfig;
use tagledger_kernel::invariants::InvariantEngine;
use tagledger_kernel::ledger::{LedgerError, LedgerManager};

/// Tag Ledger CLI
#[derive(Parser, Debug)]
#[command(name = "tagledger")]
#[command(about = "Sequential-id ledger of analyzed data files", long_about = None)]
struct Cli {
    /// Path to ledger config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Container file (overrides the config)
    #[arg(long, global = true)]
    container: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record one ingestion of a file or folder and print its id
    Record {
        /// Source file or folder
        source: PathBuf,
    },

    /// Print every ledger record as JSON
    List,

    /// Write the styled spreadsheet report
    Export {
        /// Output file (SpreadsheetML .xml)
        #[arg(long, default_value = "tag_id.xml")]
        out: PathBuf,
    },

    /// Check the ledger's built-in invariants
    Verify,
}

#[derive(Debug, Serialize)]
struct RecordOutput {
    unique_id: String,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    path: String,
    records: usize,
}

#[derive(Debug, Serialize)]
struct VerifyOutput {
    ok: bool,
    records: Option<usize>,
    invariants: Vec<&'static str>,
    violation: Option<String>,
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    // ----------------------------
    // Load config
    // ----------------------------
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::from_json_file(path)?,
        None => LedgerConfig::default_config(),
    };
    if let Some(container) = cli.container {
        config.container_path = container;
    }
    log::debug!("ledger container: {}", config.container_path.display());

    let mut ledger = LedgerManager::open(&config);

    // ----------------------------
    // Run command
    // ----------------------------
    match cli.command {
        Command::Record { source } => {
            let unique_id = ledger
                .record_entry(&source)
                .with_context(|| format!("recording {}", source.display()))?;
            print_json(&RecordOutput {
                unique_id: unique_id.to_string(),
            })?;
        }

        Command::List => {
            let records = ledger.records()?;
            print_json(&records)?;
        }

        Command::Export { out } => {
            let records = ledger.export_report(&out, &config.report)?;
            print_json(&ExportOutput {
                path: out.display().to_string(),
                records,
            })?;
        }

        Command::Verify => {
            let engine = InvariantEngine::with_defaults();
            let invariants = engine.names();
            let output = match ledger.verify(&engine) {
                Ok(records) => VerifyOutput {
                    ok: true,
                    records: Some(records),
                    invariants,
                    violation: None,
                },
                Err(LedgerError::Invariant(violation)) => VerifyOutput {
                    ok: false,
                    records: None,
                    invariants,
                    violation: Some(violation.to_string()),
                },
                Err(err) => return Err(err.into()),
            };
            print_json(&output)?;
            if !output.ok {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "tagledger",
            "record",
            "/data/run1.csv",
            "--container",
            "/tmp/tag_data.tlc",
        ])
        .unwrap();

        assert_eq!(cli.container, Some(PathBuf::from("/tmp/tag_data.tlc")));
        assert!(matches!(cli.command, Command::Record { .. }));
    }

    #[test]
    fn export_has_default_output() {
        let cli = Cli::try_parse_from(["tagledger", "export"]).unwrap();
        match cli.command {
            Command::Export { out } => assert_eq!(out, PathBuf::from("tag_id.xml")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

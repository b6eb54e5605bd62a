//! CLI argument parsing and one-shot subcommands.

mod args;

pub use args::{Cli, CliCommand};

use anyhow::Result;

use crate::db::{now_rfc3339, Database};
use crate::retention::sweep_once;

/// Run one retention sweep pass and report what happened.
pub fn handle_sweep_command() -> Result<()> {
    let db = Database::from_global()?;
    let outcome = sweep_once(&db, &now_rfc3339())?;
    println!(
        "Retention sweep: {} audio payload(s) cleared, {} failed",
        outcome.cleared, outcome.failed
    );
    Ok(())
}

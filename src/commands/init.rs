use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::db::Database;

/// Creates the `.datafix` workspace: the ticket database plus the
/// attachment store directory.
pub fn run(path: &Path) -> Result<()> {
    let datafix_dir = path.join(".datafix");

    if datafix_dir.exists() {
        bail!(
            "Already initialized: {} exists. Nothing to do.",
            datafix_dir.display()
        );
    }

    fs::create_dir_all(datafix_dir.join("attachments"))
        .with_context(|| format!("Failed to create {}", datafix_dir.display()))?;

    let db_path = datafix_dir.join("tickets.db");
    Database::open(&db_path).context("Failed to initialize database")?;

    println!("Initialized datafix workspace in {}", datafix_dir.display());
    println!("Next steps:");
    println!("  datafix users add \"Your Name\" you@example.com");
    println!("  datafix branch add <name>    # at least one branch is required");
    println!("  datafix login you@example.com");
    Ok(())
}

use anyhow::{bail, Result};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

use crate::db::Database;
use crate::session::{Action, CurrentUser};

pub fn run(
    db: &Database,
    attach_root: &Path,
    user: &CurrentUser,
    id: i64,
    force: bool,
) -> Result<()> {
    user.require(Action::DeleteTickets)?;

    // Check the ticket exists before prompting.
    let detail = match db.get_ticket(id)? {
        Some(d) => d,
        None => bail!("Ticket #{} not found", id),
    };

    if !force {
        print!(
            "Delete ticket #{} ({})? [y/N] ",
            id,
            crate::models::truncate(&detail.row.ticket.description, 40)
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if db.delete_ticket(id)? {
        // The database rows are gone; stored screenshot files are removed
        // best-effort so a missing file never fails the delete.
        for att in &detail.attachments {
            let path = attach_root.join(&att.file_path);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove attachment file");
            }
        }
        println!("Deleted ticket #{}", id);
    } else {
        bail!("Failed to delete ticket #{}", id);
    }

    Ok(())
}

/// Internal function for testing without stdin interaction
#[cfg(test)]
pub fn run_force(db: &Database, attach_root: &Path, user: &CurrentUser, id: i64) -> Result<()> {
    run(db, attach_root, user, id, true)
}

use anyhow::{bail, Result};

use crate::db::{Database, TicketUpdate};
use crate::session::{Action, CurrentUser};

pub fn run(db: &Database, user: &CurrentUser, id: i64, upd: &TicketUpdate) -> Result<()> {
    user.require(Action::TriageTickets)?;

    if upd.is_empty() {
        bail!("Nothing to update. Use --status, --fix, --priority, --assign, or --unassign");
    }

    match db.update_ticket(id, upd, Some(user.profile.id))? {
        Some(ticket) => {
            println!("Updated ticket #{}", ticket.id);
            if let Some(status) = upd.status {
                println!("Status is now: {}", status.label());
            }
            Ok(())
        }
        None => bail!("Ticket #{} not found", id),
    }
}

use anyhow::Result;

use crate::db::{Database, TicketFilters};
use crate::models::{truncate, Priority, TicketStatus};
use crate::view::{ListState, PAGE_SIZE};

pub fn run(
    db: &Database,
    filters: &TicketFilters,
    search: Option<String>,
    status: Option<TicketStatus>,
    priority: Option<Priority>,
    page: usize,
) -> Result<()> {
    let mut state = ListState::load(db, filters)?;
    state.search = search;
    state.status = status;
    state.priority = priority;

    let matched = state.filtered().len();
    if matched == 0 {
        println!("No tickets found.");
        return Ok(());
    }

    let pages = matched.div_ceil(PAGE_SIZE);
    let page = page.clamp(1, pages);

    println!(
        "{:<5} {:<12} {:<10} {:<8} {:<20} {:<30} {:<18} {}",
        "ID", "STATUS", "DATE", "PRIO", "FEATURE", "DESCRIPTION", "REPORTER", "ASSIGNEE"
    );
    for row in state.page(page) {
        println!(
            "#{:<4} {:<12} {:<10} {:<8} {:<20} {:<30} {:<18} {}",
            row.ticket.id,
            row.ticket.status.label(),
            row.ticket.wrong_input_date.format("%Y-%m-%d"),
            row.ticket.priority.label(),
            truncate(row.feature_label(), 20),
            truncate(&row.ticket.description, 30),
            truncate(row.reporter_label(), 18),
            row.assignee_full_name.as_deref().unwrap_or("-"),
        );
    }

    println!();
    println!("Page {}/{} ({} ticket(s))", page, pages, matched);
    Ok(())
}

use anyhow::Result;
use chrono::Utc;

use crate::db::{Database, TicketFilters};
use crate::models::truncate;
use crate::report::{feature_distribution, monthly_trend};
use crate::session::{Action, CurrentUser};

const RECENT_COUNT: usize = 5;

pub fn run(db: &Database, user: &CurrentUser) -> Result<()> {
    let stats = db.ticket_stats()?;

    println!("Data correction tickets");
    println!();
    println!("  Total:       {}", stats.total);
    println!("  Open:        {}", stats.open);
    println!("  In progress: {}", stats.in_progress);
    println!("  Resolved:    {}", stats.resolved);
    println!("  Rejected:    {}", stats.rejected);
    println!("  Active:      {}", stats.active());
    println!("  Success:     {:.0}%", stats.success_rate());

    let tickets = db.list_tickets(&TicketFilters::default())?;

    if !tickets.is_empty() {
        println!("\nRecent tickets:");
        for row in tickets.iter().take(RECENT_COUNT) {
            println!(
                "  #{:<4} {:<12} {:<20} {}",
                row.ticket.id,
                row.ticket.status.label(),
                truncate(row.feature_label(), 20),
                truncate(&row.ticket.description, 40),
            );
        }
    }

    // Trend and distribution sections belong to the admin report view.
    if user.capabilities.allows(Action::ViewAdminReports) {
        let today = Utc::now().date_naive();

        println!("\nLast three months:");
        for entry in monthly_trend(&tickets, today) {
            println!(
                "  {:<9} submitted {:>3}  completed {:>3}",
                entry.label(),
                entry.submitted,
                entry.completed
            );
        }

        let distribution = feature_distribution(&tickets);
        if !distribution.is_empty() {
            println!("\nTickets by feature:");
            for entry in &distribution {
                println!("  {:<24} {}", truncate(&entry.name, 24), entry.count);
            }
        }
    }

    Ok(())
}

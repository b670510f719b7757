use anyhow::{bail, Result};

use crate::db::Database;
use crate::models::Side;
use crate::session::{Action, CurrentUser};

pub fn run(db: &Database, user: &CurrentUser, id: i64) -> Result<()> {
    let detail = match db.get_ticket(id)? {
        Some(d) => d,
        None => bail!("Ticket #{} not found", id),
    };
    let ticket = &detail.row.ticket;

    println!("Ticket #{}", ticket.id);
    println!("Status: {}", ticket.status.label());
    println!("Priority: {}", ticket.priority.label());
    println!("Issue type: {}", ticket.issue_type);
    println!("Wrong input date: {}", ticket.wrong_input_date.format("%Y-%m-%d"));
    println!(
        "Branch: {}",
        detail.row.branch_name.as_deref().unwrap_or("-")
    );
    println!("Feature: {}", detail.row.feature_label());
    println!("Reporter: {}", detail.row.reporter_label());
    if let Some(inputter) = &ticket.inputter_name {
        println!("Inputter: {}", inputter);
    }
    println!(
        "Assignee: {}",
        detail.row.assignee_full_name.as_deref().unwrap_or("(unassigned)")
    );
    println!("Created: {}", ticket.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", ticket.updated_at.format("%Y-%m-%d %H:%M:%S"));

    println!("\nDescription:");
    for line in ticket.description.lines() {
        println!("  {}", line);
    }

    if let Some(fix) = &ticket.fix_description {
        if !fix.is_empty() {
            println!("\nFix description:");
            for line in fix.lines() {
                println!("  {}", line);
            }
        }
    }

    // Wrong and expected values, side by side per item.
    if !detail.detail_lines.is_empty() {
        println!("\nDetail lines:");
        for line in &detail.detail_lines {
            let marker = match line.side {
                Side::Wrong => "wrong   ",
                Side::Expected => "expected",
            };
            println!(
                "  [{}] {} = {}",
                marker,
                line.item_name,
                line.value.as_deref().unwrap_or("-")
            );
        }
    }

    if !detail.attachments.is_empty() {
        println!("\nScreenshots:");
        for att in &detail.attachments {
            println!(
                "  {} ({}, {})",
                att.file_name.as_deref().unwrap_or("(unnamed)"),
                att.mime_type.as_deref().unwrap_or("unknown"),
                att.file_path
            );
        }
    }

    if !detail.history.is_empty() {
        println!("\nStatus history:");
        for entry in &detail.history {
            let changed_by = entry
                .changed_by
                .and_then(|id| db.get_profile(id).ok().flatten())
                .map(|p| format!(" by {}", p.full_name))
                .unwrap_or_default();
            println!(
                "  [{}] {} -> {}{}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry
                    .from_status
                    .map(|s| s.label().to_string())
                    .unwrap_or_else(|| "(new)".to_string()),
                entry.to_status.label(),
                changed_by,
            );
        }
    }

    // Requesters get a read-only view; only admins see the triage surface.
    if user.capabilities.allows(Action::TriageTickets) {
        println!("\nTriage:");
        println!("  datafix update {} --status <status> [--fix <text>]", id);
        println!("  datafix assign {} <profile-id>", id);
        println!("  datafix delete {}", id);
    }

    Ok(())
}

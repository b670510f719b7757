use anyhow::{bail, Result};

use crate::db::{Database, TicketFilters};
use crate::session::{Action, CurrentUser};
use crate::view::ListState;

/// Assigns a ticket from the list view. The list applies the change
/// locally first and falls back to a reload when the write fails.
pub fn run(db: &Database, user: &CurrentUser, ticket_id: i64, assignee_id: i64) -> Result<()> {
    user.require(Action::TriageTickets)?;

    let Some(assignee) = db.get_profile(assignee_id)? else {
        bail!("No profile with id {}", assignee_id);
    };

    let filters = TicketFilters::default();
    let mut state = ListState::load(db, &filters)?;
    let applied = state.reassign(
        db,
        &filters,
        ticket_id,
        Some(assignee.id),
        Some(assignee.full_name.clone()),
    )?;

    if applied {
        println!("Assigned ticket #{} to {}", ticket_id, assignee.full_name);
    } else {
        bail!("Ticket #{} not found", ticket_id);
    }
    Ok(())
}

pub fn unassign(db: &Database, user: &CurrentUser, ticket_id: i64) -> Result<()> {
    user.require(Action::TriageTickets)?;

    let filters = TicketFilters::default();
    let mut state = ListState::load(db, &filters)?;
    if state.reassign(db, &filters, ticket_id, None, None)? {
        println!("Unassigned ticket #{}", ticket_id);
        Ok(())
    } else {
        bail!("Ticket #{} not found", ticket_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewTicket;
    use crate::models::{Priority, UserRole};
    use crate::session::SessionManager;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir, CurrentUser, i64) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.create_profile("Ana", "ana@example.com", UserRole::Admin, None)
            .unwrap();
        let admin = SessionManager::new(&db).sign_in("ana@example.com").unwrap();
        let branch_id = db.add_branch("Jakarta").unwrap();
        let ticket = db
            .create_ticket(&NewTicket {
                reporter_id: Some(admin.profile.id),
                reporter_name: None,
                wrong_input_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                issue_type: "system_bug".to_string(),
                branch_id,
                feature_id: None,
                feature_other: Some("Reports".to_string()),
                inputter_name: None,
                description: "Totals do not add up".to_string(),
                priority: Priority::Low,
            })
            .unwrap();
        (db, dir, admin, ticket.id)
    }

    #[test]
    fn test_assign_persists() {
        let (db, _dir, admin, ticket_id) = setup_test_db();

        run(&db, &admin, ticket_id, admin.profile.id).unwrap();

        let detail = db.get_ticket(ticket_id).unwrap().unwrap();
        assert_eq!(detail.row.ticket.assigned_to, Some(admin.profile.id));
        assert_eq!(detail.row.assignee_full_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_assign_unknown_profile_fails() {
        let (db, _dir, admin, ticket_id) = setup_test_db();

        let result = run(&db, &admin, ticket_id, 4242);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("No profile"));
    }

    #[test]
    fn test_assign_unknown_ticket_fails() {
        let (db, _dir, admin, _ticket_id) = setup_test_db();

        let result = run(&db, &admin, 99999, admin.profile.id);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_unassign_clears_assignee() {
        let (db, _dir, admin, ticket_id) = setup_test_db();
        run(&db, &admin, ticket_id, admin.profile.id).unwrap();

        unassign(&db, &admin, ticket_id).unwrap();

        let detail = db.get_ticket(ticket_id).unwrap().unwrap();
        assert_eq!(detail.row.ticket.assigned_to, None);
    }
}

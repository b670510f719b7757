//! In-memory state behind the ticket list: search, status and priority
//! filters applied client-side, fixed-size pages, and the one optimistic
//! write in the system (reassignment).

use anyhow::Result;

use crate::db::{Database, TicketFilters, TicketUpdate};
use crate::models::{Priority, TicketRow, TicketStatus};

pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Default)]
pub struct ListState {
    tickets: Vec<TicketRow>,
    pub search: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
}

impl ListState {
    pub fn load(db: &Database, filters: &TicketFilters) -> Result<Self> {
        Ok(ListState {
            tickets: db.list_tickets(filters)?,
            ..Default::default()
        })
    }

    pub fn reload(&mut self, db: &Database, filters: &TicketFilters) -> Result<()> {
        self.tickets = db.list_tickets(filters)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn tickets(&self) -> &[TicketRow] {
        &self.tickets
    }

    /// Client-side filtering: case-insensitive search over id, feature
    /// label and description, then exact status/priority matches.
    pub fn filtered(&self) -> Vec<&TicketRow> {
        self.tickets
            .iter()
            .filter(|row| {
                if let Some(query) = &self.search {
                    let q = query.to_lowercase();
                    let matches = row.ticket.id.to_string().contains(&q)
                        || row.feature_label().to_lowercase().contains(&q)
                        || row
                            .ticket
                            .feature_other
                            .as_deref()
                            .is_some_and(|f| f.to_lowercase().contains(&q))
                        || row.ticket.description.to_lowercase().contains(&q);
                    if !matches {
                        return false;
                    }
                }
                if let Some(status) = self.status {
                    if row.ticket.status != status {
                        return false;
                    }
                }
                if let Some(priority) = self.priority {
                    if row.ticket.priority != priority {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    /// One page of the filtered list; pages are 1-based.
    pub fn page(&self, page: usize) -> Vec<&TicketRow> {
        let page = page.max(1);
        self.filtered()
            .into_iter()
            .skip((page - 1) * PAGE_SIZE)
            .take(PAGE_SIZE)
            .collect()
    }

    /// Optimistic reassignment: the local row changes first, then the store
    /// write runs. A failed or unmatched write reloads the whole list so
    /// the state snaps back to whatever the store holds. Returns whether
    /// the write stuck.
    pub fn reassign(
        &mut self,
        db: &Database,
        filters: &TicketFilters,
        ticket_id: i64,
        assignee: Option<i64>,
        assignee_name: Option<String>,
    ) -> Result<bool> {
        if let Some(row) = self
            .tickets
            .iter_mut()
            .find(|r| r.ticket.id == ticket_id)
        {
            row.ticket.assigned_to = assignee;
            row.assignee_full_name = assignee_name;
        }

        let upd = TicketUpdate {
            assigned_to: Some(assignee),
            ..Default::default()
        };
        match db.update_ticket(ticket_id, &upd, None) {
            Ok(Some(_)) => Ok(true),
            Ok(None) => {
                self.reload(db, filters)?;
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(ticket_id, error = %e, "reassignment write failed; reloading list");
                self.reload(db, filters)?;
                Ok(false)
            }
        }
    }
}

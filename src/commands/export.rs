use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

use crate::db::{Database, TicketFilters, TicketDetail};

#[derive(Serialize, Deserialize)]
pub struct ExportedTicket {
    pub id: i64,
    pub status: String,
    pub priority: u8,
    pub issue_type: String,
    pub wrong_input_date: String,
    pub branch: Option<String>,
    pub feature: Option<String>,
    pub feature_other: Option<String>,
    pub reporter: Option<String>,
    pub inputter_name: Option<String>,
    pub assignee: Option<String>,
    pub description: String,
    pub fix_description: Option<String>,
    pub detail_lines: Vec<ExportedLine>,
    pub attachments: Vec<ExportedAttachment>,
    pub history: Vec<ExportedHistory>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct ExportedLine {
    pub side: String,
    pub item_name: String,
    pub value: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ExportedAttachment {
    pub file_path: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ExportedHistory {
    pub from_status: Option<String>,
    pub to_status: String,
    pub changed_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct ExportData {
    pub version: i32,
    pub exported_at: String,
    pub tickets: Vec<ExportedTicket>,
}

fn export_ticket(detail: &TicketDetail) -> ExportedTicket {
    let ticket = &detail.row.ticket;
    ExportedTicket {
        id: ticket.id,
        status: ticket.status.as_str().to_string(),
        priority: ticket.priority.as_i64() as u8,
        issue_type: ticket.issue_type.clone(),
        wrong_input_date: ticket.wrong_input_date.format("%Y-%m-%d").to_string(),
        branch: detail.row.branch_name.clone(),
        feature: detail.row.feature_name.clone(),
        feature_other: ticket.feature_other.clone(),
        reporter: detail.row.reporter_full_name.clone(),
        inputter_name: ticket.inputter_name.clone(),
        assignee: detail.row.assignee_full_name.clone(),
        description: ticket.description.clone(),
        fix_description: ticket.fix_description.clone(),
        detail_lines: detail
            .detail_lines
            .iter()
            .map(|l| ExportedLine {
                side: l.side.as_str().to_string(),
                item_name: l.item_name.clone(),
                value: l.value.clone(),
            })
            .collect(),
        attachments: detail
            .attachments
            .iter()
            .map(|a| ExportedAttachment {
                file_path: a.file_path.clone(),
                file_name: a.file_name.clone(),
                mime_type: a.mime_type.clone(),
            })
            .collect(),
        history: detail
            .history
            .iter()
            .map(|h| ExportedHistory {
                from_status: h.from_status.map(|s| s.as_str().to_string()),
                to_status: h.to_status.as_str().to_string(),
                changed_at: h.created_at.to_rfc3339(),
            })
            .collect(),
        created_at: ticket.created_at.to_rfc3339(),
        updated_at: ticket.updated_at.to_rfc3339(),
    }
}

pub fn run(db: &Database, output_path: Option<&str>) -> Result<()> {
    let rows = db.list_tickets(&TicketFilters::default())?;

    let mut tickets = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(detail) = db.get_ticket(row.ticket.id)? {
            tickets.push(export_ticket(&detail));
        }
    }

    let data = ExportData {
        version: 1,
        exported_at: chrono::Utc::now().to_rfc3339(),
        tickets,
    };

    let json = serde_json::to_string_pretty(&data)?;

    match output_path {
        Some(path) => {
            fs::write(path, json).context("Failed to write export file")?;
            eprintln!("Exported {} ticket(s) to {}", data.tickets.len(), path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

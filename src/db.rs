use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{
    Attachment, Branch, DetailLine, DetailLineDraft, Feature, Priority, Profile, ProfileRow,
    SignInSession, StatusHistory, Ticket, TicketRow, TicketStats, TicketStatus, UserRole,
};

const SCHEMA_VERSION: i32 = 1;

/// Fields required to create a ticket. Status is not part of this shape:
/// every new ticket starts out `open`.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub reporter_id: Option<i64>,
    pub reporter_name: Option<String>,
    pub wrong_input_date: NaiveDate,
    pub issue_type: String,
    pub branch_id: i64,
    pub feature_id: Option<i64>,
    pub feature_other: Option<String>,
    pub inputter_name: Option<String>,
    pub description: String,
    pub priority: Priority,
}

/// Server-side equality filters for the ticket list.
#[derive(Debug, Clone, Default)]
pub struct TicketFilters {
    pub status: Option<TicketStatus>,
    pub branch_id: Option<i64>,
    pub assigned_to: Option<i64>,
}

/// Partial update applied during triage. `assigned_to` distinguishes
/// "leave alone" (None) from "clear the assignee" (Some(None)).
#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub fix_description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Option<i64>>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.fix_description.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub branch_id: Option<Option<i64>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.role.is_none() && self.branch_id.is_none()
    }
}

/// A screenshot that passed form validation and is waiting to be copied
/// into the attachment store during submission.
#[derive(Debug, Clone)]
pub struct StagedAttachment {
    pub source: PathBuf,
    pub file_name: String,
    pub mime_type: String,
}

/// A ticket with everything the detail view renders.
#[derive(Debug, Clone)]
pub struct TicketDetail {
    pub row: TicketRow,
    pub detail_lines: Vec<DetailLine>,
    pub attachments: Vec<Attachment>,
    pub history: Vec<StatusHistory>,
}

pub struct Database {
    conn: Connection,
}

const TICKET_COLS: &str = "t.id, t.reporter_id, t.reporter_name, t.wrong_input_date, \
     t.issue_type, t.branch_id, t.feature_id, t.feature_other, t.inputter_name, \
     t.description, t.fix_description, t.status, t.priority, t.assigned_to, \
     t.created_at, t.updated_at";

const TICKET_JOINS: &str = "LEFT JOIN m_branches b ON b.id = t.branch_id \
     LEFT JOIN m_features f ON f.id = t.feature_id \
     LEFT JOIN profiles rp ON rp.id = t.reporter_id \
     LEFT JOIN profiles ap ON ap.id = t.assigned_to";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM pragma_user_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                -- Master data
                CREATE TABLE IF NOT EXISTS m_branches (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS m_features (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                -- One per user; role gates triage mutations
                CREATE TABLE IF NOT EXISTS profiles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    full_name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL DEFAULT 'requester',
                    branch_id INTEGER REFERENCES m_branches(id),
                    created_at TEXT NOT NULL
                );

                -- Core ticket table
                CREATE TABLE IF NOT EXISTS datafix_tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    reporter_id INTEGER REFERENCES profiles(id),
                    reporter_name TEXT,
                    wrong_input_date TEXT NOT NULL,
                    issue_type TEXT NOT NULL,
                    branch_id INTEGER NOT NULL REFERENCES m_branches(id),
                    feature_id INTEGER REFERENCES m_features(id),
                    feature_other TEXT,
                    inputter_name TEXT,
                    description TEXT NOT NULL,
                    fix_description TEXT,
                    status TEXT NOT NULL DEFAULT 'open',
                    priority INTEGER NOT NULL DEFAULT 2,
                    assigned_to INTEGER REFERENCES profiles(id),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                -- Before/after value pairs, immutable after submission
                CREATE TABLE IF NOT EXISTS ticket_detail_lines (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES datafix_tickets(id) ON DELETE CASCADE,
                    side TEXT NOT NULL,
                    item_name TEXT NOT NULL,
                    value TEXT,
                    note TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ticket_attachments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES datafix_tickets(id) ON DELETE CASCADE,
                    file_path TEXT NOT NULL,
                    file_name TEXT,
                    mime_type TEXT,
                    created_at TEXT NOT NULL
                );

                -- Append-only; written by the store itself on status change
                CREATE TABLE IF NOT EXISTS ticket_status_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL REFERENCES datafix_tickets(id) ON DELETE CASCADE,
                    from_status TEXT,
                    to_status TEXT NOT NULL,
                    changed_by INTEGER,
                    created_at TEXT NOT NULL
                );

                -- Sign-in records
                CREATE TABLE IF NOT EXISTS sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    profile_id INTEGER NOT NULL REFERENCES profiles(id),
                    signed_in_at TEXT NOT NULL,
                    signed_out_at TEXT
                );

                -- Indexes
                CREATE INDEX IF NOT EXISTS idx_tickets_status ON datafix_tickets(status);
                CREATE INDEX IF NOT EXISTS idx_tickets_branch ON datafix_tickets(branch_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_assignee ON datafix_tickets(assigned_to);
                CREATE INDEX IF NOT EXISTS idx_lines_ticket ON ticket_detail_lines(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_attachments_ticket ON ticket_attachments(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_history_ticket ON ticket_status_history(ticket_id);
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        // Enable foreign keys
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    // Ticket accessor

    pub fn create_ticket(&self, new: &NewTicket) -> Result<Ticket> {
        insert_ticket(&self.conn, new)
    }

    /// Full ticket list joined with branch, feature, reporter and assignee
    /// display names, newest first. Filters are plain equality matches
    /// applied in SQL.
    pub fn list_tickets(&self, filters: &TicketFilters) -> Result<Vec<TicketRow>> {
        let mut sql = format!(
            "SELECT {TICKET_COLS}, b.name, f.name, rp.full_name, ap.full_name \
             FROM datafix_tickets t {TICKET_JOINS}"
        );
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filters.status {
            conditions.push("t.status = ?".to_string());
            params_vec.push(Box::new(status.as_str().to_string()));
        }

        if let Some(branch_id) = filters.branch_id {
            conditions.push("t.branch_id = ?".to_string());
            params_vec.push(Box::new(branch_id));
        }

        if let Some(assigned_to) = filters.assigned_to {
            conditions.push("t.assigned_to = ?".to_string());
            params_vec.push(Box::new(assigned_to));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        sql.push_str(" ORDER BY t.created_at DESC, t.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let tickets = stmt
            .query_map(params_refs.as_slice(), map_ticket_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tickets)
    }

    /// One ticket with its detail lines, attachments and status history.
    pub fn get_ticket(&self, id: i64) -> Result<Option<TicketDetail>> {
        let sql = format!(
            "SELECT {TICKET_COLS}, b.name, f.name, rp.full_name, ap.full_name \
             FROM datafix_tickets t {TICKET_JOINS} WHERE t.id = ?1"
        );
        let row = self
            .conn
            .prepare(&sql)?
            .query_row([id], map_ticket_row)
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TicketDetail {
            detail_lines: self.get_detail_lines(id)?,
            attachments: self.get_attachments(id)?,
            history: self.get_status_history(id)?,
            row,
        }))
    }

    /// Partial triage update. When the status actually changes, a history
    /// row is appended in the same transaction. Returns the updated ticket,
    /// or None if no row matched.
    pub fn update_ticket(
        &self,
        id: i64,
        upd: &TicketUpdate,
        changed_by: Option<i64>,
    ) -> Result<Option<Ticket>> {
        let tx = self.conn.unchecked_transaction()?;

        let Some(before) = fetch_ticket(&tx, id)? else {
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        let mut updates = vec!["updated_at = ?1".to_string()];
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now.clone())];

        if let Some(status) = upd.status {
            updates.push(format!("status = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(status.as_str().to_string()));
        }

        if let Some(fix) = &upd.fix_description {
            updates.push(format!("fix_description = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(fix.clone()));
        }

        if let Some(priority) = upd.priority {
            updates.push(format!("priority = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(priority.as_i64()));
        }

        if let Some(assignee) = upd.assigned_to {
            updates.push(format!("assigned_to = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(assignee));
        }

        params_vec.push(Box::new(id));
        let sql = format!(
            "UPDATE datafix_tickets SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len()
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        tx.execute(&sql, params_refs.as_slice())?;

        if let Some(new_status) = upd.status {
            if new_status != before.status {
                tx.execute(
                    "INSERT INTO ticket_status_history (ticket_id, from_status, to_status, changed_by, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, before.status.as_str(), new_status.as_str(), changed_by, now],
                )?;
            }
        }

        let after = fetch_ticket(&tx, id)?;
        tx.commit()?;
        Ok(after)
    }

    pub fn delete_ticket(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM datafix_tickets WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    /// Status bucket counts in one pass; the aggregate-RPC analog.
    pub fn ticket_stats(&self) -> Result<TicketStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(CASE WHEN status = 'open' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END), 0) \
             FROM datafix_tickets",
            [],
            |row| {
                Ok(TicketStats {
                    total: row.get(0)?,
                    open: row.get(1)?,
                    in_progress: row.get(2)?,
                    resolved: row.get(3)?,
                    rejected: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }

    pub fn add_detail_lines(&self, ticket_id: i64, lines: &[DetailLineDraft]) -> Result<usize> {
        insert_detail_lines(&self.conn, ticket_id, lines)
    }

    pub fn get_detail_lines(&self, ticket_id: i64) -> Result<Vec<DetailLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, side, item_name, value, note, created_at \
             FROM ticket_detail_lines WHERE ticket_id = ?1 ORDER BY id",
        )?;
        let lines = stmt
            .query_map([ticket_id], |row| {
                Ok(DetailLine {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    side: parse_side(2, row.get::<_, String>(2)?)?,
                    item_name: row.get(3)?,
                    value: row.get(4)?,
                    note: row.get(5)?,
                    created_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    /// Metadata-only attachment insert; the submission workflow handles
    /// the file copy itself.
    pub fn insert_attachment(
        &self,
        ticket_id: i64,
        file_path: &str,
        file_name: &str,
        mime_type: &str,
    ) -> Result<i64> {
        insert_attachment_row(&self.conn, ticket_id, file_path, file_name, mime_type)
    }

    pub fn get_attachments(&self, ticket_id: i64) -> Result<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, file_path, file_name, mime_type, created_at \
             FROM ticket_attachments WHERE ticket_id = ?1 ORDER BY id",
        )?;
        let attachments = stmt
            .query_map([ticket_id], |row| {
                Ok(Attachment {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    file_path: row.get(2)?,
                    file_name: row.get(3)?,
                    mime_type: row.get(4)?,
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attachments)
    }

    pub fn get_status_history(&self, ticket_id: i64) -> Result<Vec<StatusHistory>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, from_status, to_status, changed_by, created_at \
             FROM ticket_status_history WHERE ticket_id = ?1 ORDER BY id",
        )?;
        let history = stmt
            .query_map([ticket_id], |row| {
                let from: Option<String> = row.get(2)?;
                Ok(StatusHistory {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    from_status: match from {
                        Some(s) => Some(parse_status(2, s)?),
                        None => None,
                    },
                    to_status: parse_status(3, row.get::<_, String>(3)?)?,
                    changed_by: row.get(4)?,
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(history)
    }

    /// The whole submission as one transaction: ticket, detail lines and
    /// attachment rows commit together. Staged files are copied into the
    /// store before the commit and removed again if anything fails, so a
    /// half-submitted ticket can never be observed.
    pub fn submit_ticket(
        &self,
        new: &NewTicket,
        lines: &[DetailLineDraft],
        files: &[StagedAttachment],
        attach_root: &Path,
    ) -> Result<Ticket> {
        let tx = self.conn.unchecked_transaction()?;

        let ticket = insert_ticket(&tx, new)?;
        insert_detail_lines(&tx, ticket.id, lines)?;

        let mut copied: Vec<PathBuf> = Vec::new();
        let result = (|| -> Result<()> {
            let stamp = Utc::now().timestamp_millis();
            for (idx, file) in files.iter().enumerate() {
                let ext = file
                    .source
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("bin");
                let key = format!("{}/{}_{:02}.{}", ticket.id, stamp, idx, ext);
                let dest = attach_root.join(&key);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::copy(&file.source, &dest).with_context(|| {
                    format!("Failed to store screenshot {}", file.source.display())
                })?;
                copied.push(dest);
                insert_attachment_row(&tx, ticket.id, &key, &file.file_name, &file.mime_type)?;
            }
            Ok(())
        })();

        match result.and_then(|_| tx.commit().map_err(Into::into)) {
            Ok(()) => Ok(ticket),
            Err(e) => {
                for path in copied {
                    if let Err(rm) = fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %rm, "failed to clean up staged attachment");
                    }
                }
                Err(e)
            }
        }
    }

    // Master data

    pub fn active_branches(&self) -> Result<Vec<Branch>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, is_active, created_at FROM m_branches \
             WHERE is_active = 1 ORDER BY name",
        )?;
        let branches = stmt
            .query_map([], |row| {
                Ok(Branch {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    is_active: row.get(2)?,
                    created_at: parse_datetime(row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(branches)
    }

    /// Active features in insertion order, matching the selection input.
    pub fn active_features(&self) -> Result<Vec<Feature>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, is_active, created_at FROM m_features \
             WHERE is_active = 1 ORDER BY created_at, id",
        )?;
        let features = stmt
            .query_map([], |row| {
                Ok(Feature {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    is_active: row.get(2)?,
                    created_at: parse_datetime(row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(features)
    }

    pub fn add_branch(&self, name: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO m_branches (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_feature(&self, name: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO m_features (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // Profiles

    pub fn create_profile(
        &self,
        full_name: &str,
        email: &str,
        role: UserRole,
        branch_id: Option<i64>,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO profiles (full_name, email, role, branch_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![full_name, email, role.as_str(), branch_id, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.full_name, p.email, p.role, p.branch_id, p.created_at, b.name \
             FROM profiles p LEFT JOIN m_branches b ON b.id = p.branch_id \
             ORDER BY p.created_at DESC, p.id DESC",
        )?;
        let profiles = stmt
            .query_map([], |row| {
                Ok(ProfileRow {
                    profile: map_profile(row)?,
                    branch_name: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    pub fn get_profile(&self, id: i64) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .prepare(
                "SELECT id, full_name, email, role, branch_id, created_at \
                 FROM profiles WHERE id = ?1",
            )?
            .query_row([id], map_profile)
            .optional()?;
        Ok(profile)
    }

    pub fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .prepare(
                "SELECT id, full_name, email, role, branch_id, created_at \
                 FROM profiles WHERE email = ?1",
            )?
            .query_row([email], map_profile)
            .optional()?;
        Ok(profile)
    }

    pub fn update_profile(&self, id: i64, upd: &ProfileUpdate) -> Result<bool> {
        let mut updates = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(name) = &upd.full_name {
            updates.push(format!("full_name = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(name.clone()));
        }

        if let Some(role) = upd.role {
            updates.push(format!("role = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(role.as_str().to_string()));
        }

        if let Some(branch) = upd.branch_id {
            updates.push(format!("branch_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(branch));
        }

        if updates.is_empty() {
            return Ok(false);
        }

        params_vec.push(Box::new(id));
        let sql = format!(
            "UPDATE profiles SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len()
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = self.conn.execute(&sql, params_refs.as_slice())?;
        Ok(rows > 0)
    }

    pub fn count_profiles(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
        Ok(count)
    }

    // Sessions

    /// Opens a session for the profile, closing any session left open.
    pub fn open_session(&self, profile_id: i64) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sessions SET signed_out_at = ?1 WHERE signed_out_at IS NULL",
            params![now],
        )?;
        self.conn.execute(
            "INSERT INTO sessions (profile_id, signed_in_at) VALUES (?1, ?2)",
            params![profile_id, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn close_session(&self) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE sessions SET signed_out_at = ?1 WHERE signed_out_at IS NULL",
            params![now],
        )?;
        Ok(rows > 0)
    }

    pub fn current_session(&self) -> Result<Option<SignInSession>> {
        let session = self
            .conn
            .prepare(
                "SELECT id, profile_id, signed_in_at, signed_out_at FROM sessions \
                 WHERE signed_out_at IS NULL ORDER BY id DESC LIMIT 1",
            )?
            .query_row([], |row| {
                Ok(SignInSession {
                    id: row.get(0)?,
                    profile_id: row.get(1)?,
                    signed_in_at: parse_datetime(row.get::<_, String>(2)?),
                    signed_out_at: row.get::<_, Option<String>>(3)?.map(parse_datetime),
                })
            })
            .optional()?;
        Ok(session)
    }
}

fn insert_ticket(conn: &Connection, new: &NewTicket) -> Result<Ticket> {
    let now = Utc::now();
    let now_str = now.to_rfc3339();
    conn.execute(
        "INSERT INTO datafix_tickets (reporter_id, reporter_name, wrong_input_date, issue_type, \
         branch_id, feature_id, feature_other, inputter_name, description, status, priority, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'open', ?10, ?11, ?11)",
        params![
            new.reporter_id,
            new.reporter_name,
            new.wrong_input_date.to_string(),
            new.issue_type,
            new.branch_id,
            new.feature_id,
            new.feature_other,
            new.inputter_name,
            new.description,
            new.priority.as_i64(),
            now_str,
        ],
    )?;
    let id = conn.last_insert_rowid();

    Ok(Ticket {
        id,
        reporter_id: new.reporter_id,
        reporter_name: new.reporter_name.clone(),
        wrong_input_date: new.wrong_input_date,
        issue_type: new.issue_type.clone(),
        branch_id: new.branch_id,
        feature_id: new.feature_id,
        feature_other: new.feature_other.clone(),
        inputter_name: new.inputter_name.clone(),
        description: new.description.clone(),
        fix_description: None,
        status: TicketStatus::Open,
        priority: new.priority,
        assigned_to: None,
        created_at: now,
        updated_at: now,
    })
}

fn insert_detail_lines(conn: &Connection, ticket_id: i64, lines: &[DetailLineDraft]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT INTO ticket_detail_lines (ticket_id, side, item_name, value, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for line in lines {
        stmt.execute(params![
            ticket_id,
            line.side.as_str(),
            line.item_name,
            line.value,
            now
        ])?;
    }
    Ok(lines.len())
}

fn insert_attachment_row(
    conn: &Connection,
    ticket_id: i64,
    file_path: &str,
    file_name: &str,
    mime_type: &str,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO ticket_attachments (ticket_id, file_path, file_name, mime_type, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![ticket_id, file_path, file_name, mime_type, now],
    )?;
    Ok(conn.last_insert_rowid())
}

fn fetch_ticket(conn: &Connection, id: i64) -> Result<Option<Ticket>> {
    let sql = format!("SELECT {TICKET_COLS} FROM datafix_tickets t WHERE t.id = ?1");
    let ticket = conn
        .prepare(&sql)?
        .query_row([id], map_ticket)
        .optional()?;
    Ok(ticket)
}

fn map_ticket(row: &Row) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        reporter_id: row.get(1)?,
        reporter_name: row.get(2)?,
        wrong_input_date: parse_date(3, row.get::<_, String>(3)?)?,
        issue_type: row.get(4)?,
        branch_id: row.get(5)?,
        feature_id: row.get(6)?,
        feature_other: row.get(7)?,
        inputter_name: row.get(8)?,
        description: row.get(9)?,
        fix_description: row.get(10)?,
        status: parse_status(11, row.get::<_, String>(11)?)?,
        priority: parse_priority(12, row.get(12)?)?,
        assigned_to: row.get(13)?,
        created_at: parse_datetime(row.get::<_, String>(14)?),
        updated_at: parse_datetime(row.get::<_, String>(15)?),
    })
}

fn map_ticket_row(row: &Row) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        ticket: map_ticket(row)?,
        branch_name: row.get(16)?,
        feature_name: row.get(17)?,
        reporter_full_name: row.get(18)?,
        assignee_full_name: row.get(19)?,
    })
}

fn map_profile(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        role: parse_role(3, row.get::<_, String>(3)?)?,
        branch_id: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn conversion_err(idx: usize, e: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn parse_status(idx: usize, s: String) -> rusqlite::Result<TicketStatus> {
    s.parse().map_err(|e| conversion_err(idx, e))
}

fn parse_priority(idx: usize, n: i64) -> rusqlite::Result<Priority> {
    Priority::from_i64(n).map_err(|e| conversion_err(idx, e))
}

fn parse_side(idx: usize, s: String) -> rusqlite::Result<crate::models::Side> {
    s.parse().map_err(|e| conversion_err(idx, e))
}

fn parse_role(idx: usize, s: String) -> rusqlite::Result<UserRole> {
    s.parse().map_err(|e| conversion_err(idx, e))
}

fn parse_date(idx: usize, s: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| conversion_err(idx, anyhow::Error::from(e)))
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    fn sample_ticket(db: &Database) -> NewTicket {
        let branch_id = db.add_branch("Jakarta").unwrap();
        NewTicket {
            reporter_id: None,
            reporter_name: Some("Budi".to_string()),
            wrong_input_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            issue_type: "data_entry_error".to_string(),
            branch_id,
            feature_id: None,
            feature_other: Some("Inventory".to_string()),
            inputter_name: Some("Sari".to_string()),
            description: "Quantity entered as 100 instead of 10".to_string(),
            priority: Priority::Medium,
        }
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_create_then_get_roundtrip() {
        let (db, _dir) = setup_test_db();
        let new = sample_ticket(&db);

        let created = db.create_ticket(&new).unwrap();
        let detail = db.get_ticket(created.id).unwrap().unwrap();
        let ticket = &detail.row.ticket;

        assert_eq!(ticket.wrong_input_date, new.wrong_input_date);
        assert_eq!(ticket.issue_type, new.issue_type);
        assert_eq!(ticket.branch_id, new.branch_id);
        assert_eq!(ticket.feature_other, new.feature_other);
        assert_eq!(ticket.description, new.description);
        assert_eq!(ticket.priority, new.priority);
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(detail.row.branch_name.as_deref(), Some("Jakarta"));
    }

    #[test]
    fn test_get_missing_ticket_is_none() {
        let (db, _dir) = setup_test_db();
        assert!(db.get_ticket(99999).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let (db, _dir) = setup_test_db();
        let new = sample_ticket(&db);
        let first = db.create_ticket(&new).unwrap();
        let second = db.create_ticket(&new).unwrap();

        let rows = db.list_tickets(&TicketFilters::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticket.id, second.id);
        assert_eq!(rows[1].ticket.id, first.id);
    }

    #[test]
    fn test_list_status_filter() {
        let (db, _dir) = setup_test_db();
        let new = sample_ticket(&db);
        let a = db.create_ticket(&new).unwrap();
        db.create_ticket(&new).unwrap();

        db.update_ticket(
            a.id,
            &TicketUpdate {
                status: Some(TicketStatus::Resolved),
                ..Default::default()
            },
            None,
        )
        .unwrap();

        let resolved = db
            .list_tickets(&TicketFilters {
                status: Some(TicketStatus::Resolved),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].ticket.id, a.id);
    }

    #[test]
    fn test_status_change_appends_history() {
        let (db, _dir) = setup_test_db();
        let new = sample_ticket(&db);
        let ticket = db.create_ticket(&new).unwrap();

        db.update_ticket(
            ticket.id,
            &TicketUpdate {
                status: Some(TicketStatus::InProgress),
                ..Default::default()
            },
            Some(7),
        )
        .unwrap();

        let history = db.get_status_history(ticket.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, Some(TicketStatus::Open));
        assert_eq!(history[0].to_status, TicketStatus::InProgress);
        assert_eq!(history[0].changed_by, Some(7));
    }

    #[test]
    fn test_same_status_update_writes_no_history() {
        let (db, _dir) = setup_test_db();
        let new = sample_ticket(&db);
        let ticket = db.create_ticket(&new).unwrap();

        db.update_ticket(
            ticket.id,
            &TicketUpdate {
                status: Some(TicketStatus::Open),
                fix_description: Some("noted".to_string()),
                ..Default::default()
            },
            None,
        )
        .unwrap();

        assert!(db.get_status_history(ticket.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_ticket_is_none() {
        let (db, _dir) = setup_test_db();
        let updated = db
            .update_ticket(
                424242,
                &TicketUpdate {
                    status: Some(TicketStatus::Resolved),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        assert!(updated.is_none());
    }

    #[test]
    fn test_clear_assignee() {
        let (db, _dir) = setup_test_db();
        let admin = db
            .create_profile("Ana Admin", "ana@example.com", UserRole::Admin, None)
            .unwrap();
        let new = sample_ticket(&db);
        let ticket = db.create_ticket(&new).unwrap();

        db.update_ticket(
            ticket.id,
            &TicketUpdate {
                assigned_to: Some(Some(admin)),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let assigned = db.get_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(assigned.row.ticket.assigned_to, Some(admin));
        assert_eq!(assigned.row.assignee_full_name.as_deref(), Some("Ana Admin"));

        db.update_ticket(
            ticket.id,
            &TicketUpdate {
                assigned_to: Some(None),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let cleared = db.get_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(cleared.row.ticket.assigned_to, None);
    }

    #[test]
    fn test_delete_cascades_children() {
        let (db, dir) = setup_test_db();
        let new = sample_ticket(&db);
        let lines = vec![DetailLineDraft {
            side: Side::Wrong,
            item_name: "Qty".to_string(),
            value: "100".to_string(),
        }];
        let src = dir.path().join("shot.png");
        std::fs::write(&src, b"png").unwrap();
        let files = vec![StagedAttachment {
            source: src,
            file_name: "shot.png".to_string(),
            mime_type: "image/png".to_string(),
        }];
        let attach_root = dir.path().join("attachments");
        let ticket = db.submit_ticket(&new, &lines, &files, &attach_root).unwrap();

        assert!(db.delete_ticket(ticket.id).unwrap());
        assert!(db.get_ticket(ticket.id).unwrap().is_none());
        assert!(db.get_detail_lines(ticket.id).unwrap().is_empty());
        assert!(db.get_attachments(ticket.id).unwrap().is_empty());
    }

    #[test]
    fn test_submit_is_atomic_on_bad_screenshot() {
        let (db, dir) = setup_test_db();
        let new = sample_ticket(&db);
        let lines = vec![DetailLineDraft {
            side: Side::Expected,
            item_name: "Qty".to_string(),
            value: "10".to_string(),
        }];
        let files = vec![StagedAttachment {
            source: dir.path().join("does-not-exist.png"),
            file_name: "does-not-exist.png".to_string(),
            mime_type: "image/png".to_string(),
        }];
        let attach_root = dir.path().join("attachments");

        let result = db.submit_ticket(&new, &lines, &files, &attach_root);
        assert!(result.is_err());

        // Nothing committed: no ticket, no orphaned lines.
        assert_eq!(db.ticket_stats().unwrap().total, 0);
        let rows = db.list_tickets(&TicketFilters::default()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_submit_stores_files_and_rows() {
        let (db, dir) = setup_test_db();
        let new = sample_ticket(&db);
        let src = dir.path().join("evidence.jpg");
        std::fs::write(&src, b"jpeg-bytes").unwrap();
        let files = vec![StagedAttachment {
            source: src,
            file_name: "evidence.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
        }];
        let lines = vec![
            DetailLineDraft {
                side: Side::Wrong,
                item_name: "Qty".to_string(),
                value: "100".to_string(),
            },
            DetailLineDraft {
                side: Side::Expected,
                item_name: "Qty".to_string(),
                value: "10".to_string(),
            },
        ];
        let attach_root = dir.path().join("attachments");

        let ticket = db.submit_ticket(&new, &lines, &files, &attach_root).unwrap();

        let detail = db.get_ticket(ticket.id).unwrap().unwrap();
        assert_eq!(detail.detail_lines.len(), 2);
        assert_eq!(detail.attachments.len(), 1);
        let stored = attach_root.join(&detail.attachments[0].file_path);
        assert_eq!(std::fs::read(stored).unwrap(), b"jpeg-bytes");
    }

    #[test]
    fn test_attachment_rows_in_insertion_order() {
        let (db, _dir) = setup_test_db();
        let new = sample_ticket(&db);
        let ticket = db.create_ticket(&new).unwrap();

        db.insert_attachment(ticket.id, "1/a.png", "a.png", "image/png")
            .unwrap();
        db.insert_attachment(ticket.id, "1/b.jpg", "b.jpg", "image/jpeg")
            .unwrap();

        let attachments = db.get_attachments(ticket.id).unwrap();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].file_path, "1/a.png");
        assert_eq!(attachments[1].mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_branches_alphabetical_features_insertion_order() {
        let (db, _dir) = setup_test_db();
        db.add_branch("Surabaya").unwrap();
        db.add_branch("Bandung").unwrap();
        db.add_feature("Zeta Module").unwrap();
        db.add_feature("Alpha Module").unwrap();

        let branches: Vec<String> = db
            .active_branches()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(branches, vec!["Bandung", "Surabaya"]);

        let features: Vec<String> = db
            .active_features()
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(features, vec!["Zeta Module", "Alpha Module"]);
    }

    #[test]
    fn test_profile_lookup_and_update() {
        let (db, _dir) = setup_test_db();
        let id = db
            .create_profile("Budi Requester", "budi@example.com", UserRole::Requester, None)
            .unwrap();

        let by_email = db.find_profile_by_email("budi@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(by_email.role, UserRole::Requester);

        let changed = db
            .update_profile(
                id,
                &ProfileUpdate {
                    role: Some(UserRole::Admin),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(changed);
        assert_eq!(db.get_profile(id).unwrap().unwrap().role, UserRole::Admin);
    }

    #[test]
    fn test_session_open_close() {
        let (db, _dir) = setup_test_db();
        let first = db
            .create_profile("Ana", "ana@example.com", UserRole::Admin, None)
            .unwrap();
        let second = db
            .create_profile("Budi", "budi@example.com", UserRole::Requester, None)
            .unwrap();

        db.open_session(first).unwrap();
        db.open_session(second).unwrap();

        // Opening a second session supersedes the first.
        let current = db.current_session().unwrap().unwrap();
        assert_eq!(current.profile_id, second);

        assert!(db.close_session().unwrap());
        assert!(db.current_session().unwrap().is_none());
        assert!(!db.close_session().unwrap());
    }

    // ==================== Property-Based Tests ====================

    proptest! {
        #[test]
        fn prop_stats_total_equals_bucket_sum(statuses in proptest::collection::vec(0usize..4, 0..25)) {
            let (db, _dir) = setup_test_db();
            let new = sample_ticket(&db);

            for &s in &statuses {
                let ticket = db.create_ticket(&new).unwrap();
                let status = TicketStatus::ALL[s];
                if status != TicketStatus::Open {
                    db.update_ticket(
                        ticket.id,
                        &TicketUpdate { status: Some(status), ..Default::default() },
                        None,
                    )
                    .unwrap();
                }
            }

            let stats = db.ticket_stats().unwrap();
            prop_assert_eq!(stats.total as usize, statuses.len());
            prop_assert_eq!(
                stats.total,
                stats.open + stats.in_progress + stats.resolved + stats.rejected
            );
        }

        #[test]
        fn prop_stored_priority_always_valid(priority in 1u8..=3) {
            let (db, _dir) = setup_test_db();
            let mut new = sample_ticket(&db);
            new.priority = Priority::from_i64(priority as i64).unwrap();

            let ticket = db.create_ticket(&new).unwrap();
            let fetched = db.get_ticket(ticket.id).unwrap().unwrap();
            let n = fetched.row.ticket.priority.as_i64();
            prop_assert!((1..=3).contains(&n));
        }

        #[test]
        fn prop_description_roundtrip(desc in "[\\p{L}\\p{N} ]{1,100}") {
            let (db, _dir) = setup_test_db();
            let mut new = sample_ticket(&db);
            new.description = desc.clone();

            let ticket = db.create_ticket(&new).unwrap();
            let fetched = db.get_ticket(ticket.id).unwrap().unwrap();
            prop_assert_eq!(fetched.row.ticket.description, desc);
        }
    }
}

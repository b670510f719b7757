use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a ticket. `Open` is the only status a new ticket can carry;
/// `Resolved` and `Rejected` are terminal in practice, but transitions are
/// not constrained beyond membership in this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Rejected,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Rejected => "rejected",
        }
    }

    /// Human-readable label for tables and the ticket detail view.
    pub fn label(&self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Rejected => "Rejected",
        }
    }

    /// Resolved and rejected tickets count as completed work in trend data.
    pub fn is_completed(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Rejected)
    }
}

impl FromStr for TicketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "in_progress" => Ok(TicketStatus::InProgress),
            "resolved" => Ok(TicketStatus::Resolved),
            "rejected" => Ok(TicketStatus::Rejected),
            other => anyhow::bail!(
                "Invalid status '{}'. Must be one of: open, in_progress, resolved, rejected",
                other
            ),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket priority, stored as its numeric form: 1 = high, 2 = medium, 3 = low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_i64(&self) -> i64 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    pub fn from_i64(n: i64) -> anyhow::Result<Self> {
        match n {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => anyhow::bail!(
                "Invalid priority '{}'. Must be 1 (high), 2 (medium) or 3 (low)",
                other
            ),
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    /// Accepts both the rank and the name, so `--priority 1` and
    /// `--priority high` mean the same thing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "high" => Ok(Priority::High),
            "2" | "medium" => Ok(Priority::Medium),
            "3" | "low" => Ok(Priority::Low),
            other => anyhow::bail!(
                "Invalid priority '{}'. Must be high (1), medium (2) or low (3)",
                other
            ),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.as_i64() as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = anyhow::Error;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Priority::from_i64(n as i64)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which side of a correction a detail line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Wrong,
    Expected,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Wrong => "wrong",
            Side::Expected => "expected",
        }
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wrong" => Ok(Side::Wrong),
            "expected" => Ok(Side::Expected),
            other => anyhow::bail!("Invalid detail line side '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Requester,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Requester => "requester",
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "requester" => Ok(UserRole::Requester),
            other => anyhow::bail!("Invalid role '{}'. Must be admin or requester", other),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed issue-type vocabulary accepted at submission time.
pub const ISSUE_TYPES: [&str; 5] = [
    "data_entry_error",
    "system_bug",
    "missing_data",
    "incorrect_calculation",
    "other",
];

pub fn validate_issue_type(issue_type: &str) -> bool {
    ISSUE_TYPES.contains(&issue_type)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub reporter_id: Option<i64>,
    pub reporter_name: Option<String>,
    pub wrong_input_date: NaiveDate,
    pub issue_type: String,
    pub branch_id: i64,
    pub feature_id: Option<i64>,
    pub feature_other: Option<String>,
    pub inputter_name: Option<String>,
    pub description: String,
    pub fix_description: Option<String>,
    pub status: TicketStatus,
    pub priority: Priority,
    pub assigned_to: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A ticket joined with the display names the list and report views need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRow {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub branch_name: Option<String>,
    pub feature_name: Option<String>,
    pub reporter_full_name: Option<String>,
    pub assignee_full_name: Option<String>,
}

impl TicketRow {
    /// Display name for the product area: joined feature name, then the
    /// free-text other-feature, then the raw issue type.
    pub fn feature_label(&self) -> &str {
        self.feature_name
            .as_deref()
            .or(self.ticket.feature_other.as_deref())
            .unwrap_or(&self.ticket.issue_type)
    }

    pub fn reporter_label(&self) -> &str {
        self.reporter_full_name
            .as_deref()
            .or(self.ticket.reporter_name.as_deref())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailLine {
    pub id: i64,
    pub ticket_id: i64,
    pub side: Side,
    pub item_name: String,
    pub value: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A detail line before it is attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailLineDraft {
    pub side: Side,
    pub item_name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub ticket_id: i64,
    pub file_path: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    pub branch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A profile joined with its branch name for the user management views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    #[serde(flatten)]
    pub profile: Profile,
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistory {
    pub id: i64,
    pub ticket_id: i64,
    pub from_status: Option<TicketStatus>,
    pub to_status: TicketStatus,
    pub changed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInSession {
    pub id: i64,
    pub profile_id: i64,
    pub signed_in_at: DateTime<Utc>,
    pub signed_out_at: Option<DateTime<Utc>>,
}

/// Status bucket counts across the whole ticket table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub rejected: i64,
}

impl TicketStats {
    /// Tickets still waiting on an admin.
    pub fn active(&self) -> i64 {
        self.open + self.in_progress
    }

    /// Resolved share of all tickets, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.resolved as f64 / self.total as f64 * 100.0
        }
    }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}

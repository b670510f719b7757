use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use crate::db::{Database, NewTicket, StagedAttachment};
use crate::models::{validate_issue_type, DetailLineDraft, Priority, Side, ISSUE_TYPES};
use crate::session::CurrentUser;

/// Screenshot constraints enforced by the form, not the store.
const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;
const IMAGE_TYPES: [(&str, &str); 5] = [
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

/// Everything the submission form collects before any store write.
#[derive(Debug, Clone)]
pub struct SubmitForm {
    pub wrong_input_date: NaiveDate,
    pub issue_type: String,
    pub branch_id: i64,
    pub feature_id: Option<i64>,
    pub feature_other: Option<String>,
    pub inputter_name: Option<String>,
    pub description: String,
    pub priority: Priority,
    /// `ITEM=VALUE` pairs for the before side.
    pub wrong: Vec<String>,
    /// `ITEM=VALUE` pairs for the after side.
    pub correct: Vec<String>,
    pub screenshots: Vec<PathBuf>,
}

pub fn run(db: &Database, attach_root: &Path, user: &CurrentUser, form: &SubmitForm) -> Result<()> {
    if form.description.trim().is_empty() {
        bail!("Description must not be empty");
    }

    if !validate_issue_type(&form.issue_type) {
        bail!(
            "Invalid issue type '{}'. Must be one of: {}",
            form.issue_type,
            ISSUE_TYPES.join(", ")
        );
    }

    if form.feature_id.is_none()
        && form
            .feature_other
            .as_deref()
            .map_or(true, |f| f.trim().is_empty())
    {
        bail!("A feature is required: pass --feature <id> or --feature-other <name>");
    }

    if form.screenshots.is_empty() {
        bail!("At least one screenshot of the wrong data is required");
    }

    let wrong = parse_line_items(&form.wrong)?;
    let correct = parse_line_items(&form.correct)?;
    let lines = merge_detail_lines(&wrong, &correct);
    if lines.is_empty() {
        bail!("At least one detail line with both an item name and a value is required");
    }

    let staged = stage_screenshots(&form.screenshots)?;

    let new = NewTicket {
        reporter_id: Some(user.profile.id),
        reporter_name: None,
        wrong_input_date: form.wrong_input_date,
        issue_type: form.issue_type.clone(),
        branch_id: form.branch_id,
        feature_id: form.feature_id,
        feature_other: form.feature_other.clone(),
        inputter_name: form.inputter_name.clone(),
        description: form.description.clone(),
        priority: form.priority,
    };

    let ticket = db.submit_ticket(&new, &lines, &staged, attach_root)?;

    println!(
        "Created ticket #{} with {} detail line(s) and {} screenshot(s)",
        ticket.id,
        lines.len(),
        staged.len()
    );
    println!("Track it with: datafix show {}", ticket.id);
    Ok(())
}

/// Splits each `ITEM=VALUE` argument at the first '='. Blank halves are
/// kept here; the merge step decides what survives.
fn parse_line_items(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
            None => bail!("Invalid line item '{}'. Expected ITEM=VALUE", entry),
        })
        .collect()
}

/// Walks both sides index-by-index and keeps only entries with a non-empty
/// item name and value, tagging each with its side. Mirrors how the intake
/// form pairs its wrong/correct tables row by row.
pub fn merge_detail_lines(
    wrong: &[(String, String)],
    correct: &[(String, String)],
) -> Vec<DetailLineDraft> {
    let mut lines = Vec::new();
    for i in 0..wrong.len().max(correct.len()) {
        if let Some((name, value)) = wrong.get(i) {
            if !name.is_empty() && !value.is_empty() {
                lines.push(DetailLineDraft {
                    side: Side::Wrong,
                    item_name: name.clone(),
                    value: value.clone(),
                });
            }
        }
        if let Some((name, value)) = correct.get(i) {
            if !name.is_empty() && !value.is_empty() {
                lines.push(DetailLineDraft {
                    side: Side::Expected,
                    item_name: name.clone(),
                    value: value.clone(),
                });
            }
        }
    }
    lines
}

/// Validates each screenshot (image extension, size cap) and resolves its
/// mime type. Runs before any store write so a bad file fails the whole
/// submission up front.
pub fn stage_screenshots(paths: &[PathBuf]) -> Result<Vec<StagedAttachment>> {
    paths
        .iter()
        .map(|path| {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            let Some(&(_, mime)) = IMAGE_TYPES.iter().find(|(e, _)| *e == ext) else {
                bail!(
                    "'{}' is not an image. Allowed: png, jpg, jpeg, gif, webp",
                    path.display()
                );
            };

            let meta = std::fs::metadata(path)
                .with_context(|| format!("Cannot read screenshot {}", path.display()))?;
            if meta.len() > MAX_ATTACHMENT_BYTES {
                bail!(
                    "'{}' is {} bytes; screenshots are limited to 5 MB",
                    path.display(),
                    meta.len()
                );
            }

            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("screenshot")
                .to_string();
            Ok(StagedAttachment {
                source: path.clone(),
                file_name,
                mime_type: mime.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::session::SessionManager;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn setup_workspace() -> (Database, tempfile::TempDir, CurrentUser, i64) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.create_profile("Budi", "budi@example.com", UserRole::Requester, None)
            .unwrap();
        let user = SessionManager::new(&db).sign_in("budi@example.com").unwrap();
        let branch_id = db.add_branch("Jakarta").unwrap();
        (db, dir, user, branch_id)
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    fn valid_form(dir: &Path, branch_id: i64) -> SubmitForm {
        let shot = dir.join("shot.png");
        std::fs::write(&shot, b"fake png").unwrap();
        SubmitForm {
            wrong_input_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            issue_type: "data_entry_error".to_string(),
            branch_id,
            feature_id: None,
            feature_other: Some("Inventory".to_string()),
            inputter_name: None,
            description: "Quantity off by a factor of ten".to_string(),
            priority: Priority::Medium,
            wrong: vec!["Qty=100".to_string()],
            correct: vec!["Qty=10".to_string()],
            screenshots: vec![shot],
        }
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_merge_keeps_only_complete_entries() {
        // Three wrong rows, one correct row, two complete entries total.
        let wrong = pairs(&[("Qty", "100"), ("", "5"), ("Price", "")]);
        let correct = pairs(&[("Qty", "10")]);

        let lines = merge_detail_lines(&wrong, &correct);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].side, Side::Wrong);
        assert_eq!(lines[0].item_name, "Qty");
        assert_eq!(lines[0].value, "100");
        assert_eq!(lines[1].side, Side::Expected);
        assert_eq!(lines[1].value, "10");
    }

    #[test]
    fn test_merge_interleaves_by_row() {
        let wrong = pairs(&[("A", "1"), ("B", "2")]);
        let correct = pairs(&[("A", "9"), ("B", "8")]);

        let sides: Vec<Side> = merge_detail_lines(&wrong, &correct)
            .into_iter()
            .map(|l| l.side)
            .collect();
        assert_eq!(
            sides,
            vec![Side::Wrong, Side::Expected, Side::Wrong, Side::Expected]
        );
    }

    #[test]
    fn test_merge_empty_inputs() {
        assert!(merge_detail_lines(&[], &[]).is_empty());
        let blank = pairs(&[("", ""), ("", "")]);
        assert!(merge_detail_lines(&blank, &blank).is_empty());
    }

    #[test]
    fn test_parse_line_items() {
        let parsed = parse_line_items(&["Qty=100".to_string(), "Name = Widget ".to_string()]).unwrap();
        assert_eq!(parsed[0], ("Qty".to_string(), "100".to_string()));
        assert_eq!(parsed[1], ("Name".to_string(), "Widget".to_string()));

        assert!(parse_line_items(&["no-equals-sign".to_string()]).is_err());
    }

    #[test]
    fn test_stage_rejects_non_image() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("evidence.pdf");
        std::fs::write(&doc, b"pdf").unwrap();

        let result = stage_screenshots(&[doc]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not an image"));
    }

    #[test]
    fn test_stage_rejects_oversized_file() {
        let dir = tempdir().unwrap();
        let big = dir.path().join("big.png");
        let f = std::fs::File::create(&big).unwrap();
        f.set_len(MAX_ATTACHMENT_BYTES + 1).unwrap();

        let result = stage_screenshots(&[big]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("5 MB"));
    }

    #[test]
    fn test_stage_resolves_mime_types() {
        let dir = tempdir().unwrap();
        let shot = dir.path().join("Shot.JPG");
        std::fs::write(&shot, b"jpeg").unwrap();

        let staged = stage_screenshots(&[shot]).unwrap();
        assert_eq!(staged[0].mime_type, "image/jpeg");
        assert_eq!(staged[0].file_name, "Shot.JPG");
    }

    #[test]
    fn test_submit_without_screenshot_touches_nothing() {
        let (db, dir, user, branch_id) = setup_workspace();
        let mut form = valid_form(dir.path(), branch_id);
        form.screenshots.clear();

        let result = run(&db, &dir.path().join("attachments"), &user, &form);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("At least one screenshot"));
        assert_eq!(db.ticket_stats().unwrap().total, 0);
    }

    #[test]
    fn test_submit_without_detail_lines_touches_nothing() {
        let (db, dir, user, branch_id) = setup_workspace();
        let mut form = valid_form(dir.path(), branch_id);
        form.wrong = vec!["Qty=".to_string()];
        form.correct.clear();

        let result = run(&db, &dir.path().join("attachments"), &user, &form);
        assert!(result.is_err());
        assert_eq!(db.ticket_stats().unwrap().total, 0);
    }

    #[test]
    fn test_submit_rejects_unknown_issue_type() {
        let (db, dir, user, branch_id) = setup_workspace();
        let mut form = valid_form(dir.path(), branch_id);
        form.issue_type = "typo".to_string();

        let result = run(&db, &dir.path().join("attachments"), &user, &form);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid issue type"));
    }

    #[test]
    fn test_submit_requires_some_feature() {
        let (db, dir, user, branch_id) = setup_workspace();
        let mut form = valid_form(dir.path(), branch_id);
        form.feature_id = None;
        form.feature_other = Some("   ".to_string());

        let result = run(&db, &dir.path().join("attachments"), &user, &form);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("feature"));
    }

    #[test]
    fn test_submit_happy_path() {
        let (db, dir, user, branch_id) = setup_workspace();
        let form = valid_form(dir.path(), branch_id);
        let attach_root = dir.path().join("attachments");

        run(&db, &attach_root, &user, &form).unwrap();

        let rows = db.list_tickets(&Default::default()).unwrap();
        assert_eq!(rows.len(), 1);
        let detail = db.get_ticket(rows[0].ticket.id).unwrap().unwrap();
        assert_eq!(detail.row.ticket.reporter_id, Some(user.profile.id));
        assert_eq!(detail.row.ticket.status, crate::models::TicketStatus::Open);
        assert_eq!(detail.detail_lines.len(), 2);
        assert_eq!(detail.attachments.len(), 1);
    }

    // ==================== Property-Based Tests ====================

    proptest! {
        #[test]
        fn prop_merge_never_emits_blank_entries(
            wrong in proptest::collection::vec(("[a-z]{0,6}", "[0-9]{0,4}"), 0..6),
            correct in proptest::collection::vec(("[a-z]{0,6}", "[0-9]{0,4}"), 0..6),
        ) {
            let lines = merge_detail_lines(&wrong, &correct);
            prop_assert!(lines
                .iter()
                .all(|l| !l.item_name.is_empty() && !l.value.is_empty()));
        }

        #[test]
        fn prop_merge_count_matches_complete_entries(
            wrong in proptest::collection::vec(("[a-z]{0,6}", "[0-9]{0,4}"), 0..6),
            correct in proptest::collection::vec(("[a-z]{0,6}", "[0-9]{0,4}"), 0..6),
        ) {
            let complete = |side: &[(String, String)]| {
                side.iter()
                    .filter(|(n, v)| !n.is_empty() && !v.is_empty())
                    .count()
            };
            let lines = merge_detail_lines(&wrong, &correct);
            prop_assert_eq!(lines.len(), complete(&wrong) + complete(&correct));
        }
    }
}

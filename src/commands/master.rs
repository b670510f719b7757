use anyhow::{bail, Result};

use crate::db::Database;
use crate::session::{Action, CurrentUser};

pub fn list_branches(db: &Database) -> Result<()> {
    let branches = db.active_branches()?;
    if branches.is_empty() {
        println!("No branches registered. Add one with: datafix branch add <name>");
        return Ok(());
    }
    println!("{:<5} {}", "ID", "NAME");
    for branch in branches {
        println!("{:<5} {}", branch.id, branch.name);
    }
    Ok(())
}

pub fn add_branch(db: &Database, user: &CurrentUser, name: &str) -> Result<()> {
    user.require(Action::ManageUsers)?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Branch name must not be empty");
    }
    if db.active_branches()?.iter().any(|b| b.name == name) {
        bail!("Branch '{}' already exists", name);
    }
    let id = db.add_branch(name)?;
    println!("Created branch #{}: {}", id, name);
    Ok(())
}

pub fn list_features(db: &Database) -> Result<()> {
    let features = db.active_features()?;
    if features.is_empty() {
        println!("No features registered. Add one with: datafix feature add <name>");
        return Ok(());
    }
    println!("{:<5} {}", "ID", "NAME");
    for feature in features {
        println!("{:<5} {}", feature.id, feature.name);
    }
    Ok(())
}

pub fn add_feature(db: &Database, user: &CurrentUser, name: &str) -> Result<()> {
    user.require(Action::ManageUsers)?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Feature name must not be empty");
    }
    if db.active_features()?.iter().any(|f| f.name == name) {
        bail!("Feature '{}' already exists", name);
    }
    let id = db.add_feature(name)?;
    println!("Created feature #{}: {}", id, name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::session::SessionManager;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir, CurrentUser) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.create_profile("Ana", "ana@example.com", UserRole::Admin, None)
            .unwrap();
        let admin = SessionManager::new(&db).sign_in("ana@example.com").unwrap();
        (db, dir, admin)
    }

    #[test]
    fn test_add_branch() {
        let (db, _dir, admin) = setup_test_db();

        add_branch(&db, &admin, "Surabaya").unwrap();

        let branches = db.active_branches().unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "Surabaya");
    }

    #[test]
    fn test_duplicate_branch_rejected() {
        let (db, _dir, admin) = setup_test_db();
        add_branch(&db, &admin, "Surabaya").unwrap();

        let result = add_branch(&db, &admin, "Surabaya");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[test]
    fn test_blank_feature_rejected() {
        let (db, _dir, admin) = setup_test_db();

        let result = add_feature(&db, &admin, "   ");
        assert!(result.is_err());
    }

    #[test]
    fn test_requester_cannot_add_master_data() {
        let (db, _dir, admin) = setup_test_db();
        db.create_profile("Budi", "budi@example.com", UserRole::Requester, None)
            .unwrap();
        let requester = SessionManager::new(&db).sign_in("budi@example.com").unwrap();

        assert!(add_branch(&db, &requester, "Medan").is_err());
        assert!(add_feature(&db, &requester, "Payroll").is_err());
        let _ = admin;
    }

    #[test]
    fn test_features_keep_insertion_order() {
        let (db, _dir, admin) = setup_test_db();
        add_feature(&db, &admin, "Inventory").unwrap();
        add_feature(&db, &admin, "Billing").unwrap();

        let names: Vec<String> = db
            .active_features()
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["Inventory", "Billing"]);
    }
}

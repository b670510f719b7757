use anyhow::{bail, Result};

use crate::db::{Database, ProfileUpdate};
use crate::models::{truncate, UserRole};
use crate::session::{Action, CurrentUser};

pub fn list(db: &Database, user: &CurrentUser) -> Result<()> {
    user.require(Action::ManageUsers)?;

    let profiles = db.list_profiles()?;
    if profiles.is_empty() {
        println!("No profiles registered.");
        return Ok(());
    }

    let admins = profiles
        .iter()
        .filter(|p| p.profile.role == UserRole::Admin)
        .count();

    println!(
        "{:<5} {:<24} {:<30} {:<10} {}",
        "ID", "NAME", "EMAIL", "ROLE", "BRANCH"
    );
    for row in &profiles {
        println!(
            "{:<5} {:<24} {:<30} {:<10} {}",
            row.profile.id,
            truncate(&row.profile.full_name, 24),
            truncate(&row.profile.email, 30),
            row.profile.role.as_str(),
            row.branch_name.as_deref().unwrap_or("-"),
        );
    }
    println!();
    println!(
        "{} profile(s): {} admin, {} requester",
        profiles.len(),
        admins,
        profiles.len() - admins
    );
    Ok(())
}

/// Registers a profile. The very first profile may be created without a
/// signed-in admin so a fresh workspace can bootstrap itself; it is made
/// an admin regardless of the requested role.
pub fn add(
    db: &Database,
    user: Option<&CurrentUser>,
    full_name: &str,
    email: &str,
    role: UserRole,
    branch_id: Option<i64>,
) -> Result<()> {
    if full_name.trim().is_empty() {
        bail!("Full name must not be empty");
    }
    if !email.contains('@') {
        bail!("'{}' does not look like an email address", email);
    }
    if db.find_profile_by_email(email)?.is_some() {
        bail!("A profile with email '{}' already exists", email);
    }

    let bootstrap = db.count_profiles()? == 0;
    let role = if bootstrap {
        UserRole::Admin
    } else {
        match user {
            Some(u) => {
                u.require(Action::ManageUsers)?;
                role
            }
            None => bail!("Not signed in. Run 'datafix login <email>' first"),
        }
    };

    let id = db.create_profile(full_name, email, role, branch_id)?;
    println!("Created {} profile #{} for {}", role.as_str(), id, email);
    if bootstrap {
        println!("First profile is always an administrator. Sign in with: datafix login {}", email);
    }
    Ok(())
}

pub fn set(db: &Database, user: &CurrentUser, profile_id: i64, upd: &ProfileUpdate) -> Result<()> {
    user.require(Action::ManageUsers)?;

    if upd.is_empty() {
        bail!("Nothing to update. Use --name, --role, or --branch");
    }

    let Some(profile) = db.get_profile(profile_id)? else {
        bail!("No profile with id {}", profile_id);
    };

    if let Some(role) = upd.role {
        if profile.id == user.profile.id && role != UserRole::Admin {
            bail!("You cannot remove your own administrator role");
        }
    }

    db.update_profile(profile_id, upd)?;
    let after = db
        .get_profile(profile_id)?
        .unwrap_or(profile);
    println!("Updated profile #{}: {} ({})", after.id, after.full_name, after.role);
    Ok(())
}

/// Formatted roster dump with role counts. Deliberately session-free: it
/// is the tool you reach for when sign-in itself is broken.
pub fn roster(db: &Database) -> Result<()> {
    let profiles = db.list_profiles()?;
    let admins = profiles
        .iter()
        .filter(|p| p.profile.role == UserRole::Admin)
        .count();

    println!("+------+--------------------------+------------+------------------+");
    println!("| {:<4} | {:<24} | {:<10} | {:<16} |", "ID", "NAME", "ROLE", "BRANCH");
    println!("+------+--------------------------+------------+------------------+");
    for row in &profiles {
        println!(
            "| {:<4} | {:<24} | {:<10} | {:<16} |",
            row.profile.id,
            truncate(&row.profile.full_name, 24),
            row.profile.role.as_str(),
            truncate(row.branch_name.as_deref().unwrap_or("-"), 16),
        );
    }
    println!("+------+--------------------------+------------+------------------+");
    println!(
        "Total: {}  Admins: {}  Requesters: {}",
        profiles.len(),
        admins,
        profiles.len() - admins
    );
    Ok(())
}

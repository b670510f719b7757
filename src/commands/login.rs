use anyhow::Result;

use crate::db::Database;
use crate::session::SessionManager;

pub fn login(db: &Database, email: &str) -> Result<()> {
    let sessions = SessionManager::new(db);
    let user = sessions.sign_in(email)?;
    println!(
        "Signed in as {} <{}> ({})",
        user.profile.full_name, user.profile.email, user.profile.role
    );
    Ok(())
}

pub fn logout(db: &Database) -> Result<()> {
    let sessions = SessionManager::new(db);
    if sessions.sign_out()? {
        println!("Signed out.");
    } else {
        println!("No active session.");
    }
    Ok(())
}

pub fn whoami(db: &Database) -> Result<()> {
    let sessions = SessionManager::new(db);
    match sessions.current()? {
        Some(user) => {
            println!("{} <{}>", user.profile.full_name, user.profile.email);
            println!("Role: {}", user.profile.role);
            match user.profile.branch_id {
                Some(id) => println!("Branch: #{}", id),
                None => println!("Branch: (none)"),
            }
            if user.capabilities.is_admin() {
                println!("Can: triage, assign, delete tickets; manage users");
            } else {
                println!("Can: submit and view tickets");
            }
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

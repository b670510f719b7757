use anyhow::{bail, Result};
use tracing::warn;

use crate::db::Database;
use crate::models::{Profile, UserRole};

/// Things only an administrator may do. Views ask the capability set
/// instead of comparing role strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TriageTickets,
    DeleteTickets,
    ManageUsers,
    ViewAdminReports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    role: UserRole,
}

impl Capabilities {
    pub fn for_role(role: UserRole) -> Self {
        Capabilities { role }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::TriageTickets
            | Action::DeleteTickets
            | Action::ManageUsers
            | Action::ViewAdminReports => self.role == UserRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_requester(&self) -> bool {
        self.role == UserRole::Requester
    }
}

/// The signed-in identity, resolved once per invocation and passed by value
/// into every command that needs it.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub profile: Profile,
    pub capabilities: Capabilities,
}

impl CurrentUser {
    fn from_profile(profile: Profile) -> Self {
        let capabilities = Capabilities::for_role(profile.role);
        CurrentUser {
            profile,
            capabilities,
        }
    }

    /// Bails with a uniform message when the capability is missing.
    pub fn require(&self, action: Action) -> Result<()> {
        if !self.capabilities.allows(action) {
            bail!("This action requires an administrator account");
        }
        Ok(())
    }
}

/// Owns the sign-in lifecycle against the store's session table.
pub struct SessionManager<'a> {
    db: &'a Database,
}

impl<'a> SessionManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        SessionManager { db }
    }

    /// Resolves the profile for the email and opens a session. Credential
    /// verification belongs to the external auth service; the store never
    /// sees a password.
    pub fn sign_in(&self, email: &str) -> Result<CurrentUser> {
        let Some(profile) = self.db.find_profile_by_email(email)? else {
            bail!("No profile registered for '{}'", email);
        };
        self.db.open_session(profile.id)?;
        Ok(CurrentUser::from_profile(profile))
    }

    pub fn sign_out(&self) -> Result<bool> {
        self.db.close_session()
    }

    /// The user behind the open session, if any. A session whose profile
    /// fails to load is logged and reported as no user rather than an
    /// error, so a stale session never wedges the CLI.
    pub fn current(&self) -> Result<Option<CurrentUser>> {
        let Some(session) = self.db.current_session()? else {
            return Ok(None);
        };

        match self.db.get_profile(session.profile_id) {
            Ok(Some(profile)) => Ok(Some(CurrentUser::from_profile(profile))),
            Ok(None) => {
                warn!(profile_id = session.profile_id, "open session references a missing profile");
                Ok(None)
            }
            Err(e) => {
                warn!(profile_id = session.profile_id, error = %e, "failed to load profile for open session");
                Ok(None)
            }
        }
    }

    /// Like `current` but an error when nobody is signed in.
    pub fn require_user(&self) -> Result<CurrentUser> {
        match self.current()? {
            Some(user) => Ok(user),
            None => bail!("Not signed in. Run 'datafix login <email>' first"),
        }
    }
}

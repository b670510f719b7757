use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use datafix::commands;
use datafix::db::{Database, ProfileUpdate, TicketFilters, TicketUpdate};
use datafix::models::{Priority, TicketStatus, UserRole};
use datafix::session::SessionManager;

#[derive(Parser)]
#[command(name = "datafix")]
#[command(about = "A lean CLI tracker for data-correction tickets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a datafix workspace in the current directory
    Init,

    /// Sign in as a registered profile
    Login {
        /// Profile email
        email: String,
    },

    /// Sign out of the current session
    Logout,

    /// Show who is signed in
    Whoami,

    /// Submit a data-correction ticket
    Submit {
        /// Date the wrong data was entered (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Issue type (data_entry_error, system_bug, missing_data, incorrect_calculation, other)
        #[arg(long, default_value = "data_entry_error")]
        issue_type: String,
        /// Branch ID where the wrong data lives
        #[arg(long)]
        branch: i64,
        /// Feature ID from the master list
        #[arg(long)]
        feature: Option<i64>,
        /// Free-text feature when it is not in the master list
        #[arg(long)]
        feature_other: Option<String>,
        /// Name of the person who entered the wrong data
        #[arg(long)]
        inputter: Option<String>,
        /// What is wrong and what should happen instead
        #[arg(short, long)]
        description: String,
        /// Priority (high, medium, low or 1-3)
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Wrong value as ITEM=VALUE (repeatable)
        #[arg(long = "wrong")]
        wrong: Vec<String>,
        /// Expected value as ITEM=VALUE (repeatable)
        #[arg(long = "correct")]
        correct: Vec<String>,
        /// Screenshot of the wrong data (repeatable, at least one)
        #[arg(long = "screenshot")]
        screenshots: Vec<PathBuf>,
    },

    /// List tickets
    List {
        /// Case-insensitive search over id, feature and description
        #[arg(short, long)]
        search: Option<String>,
        /// Filter by status (open, in_progress, resolved, rejected)
        #[arg(long)]
        status: Option<TicketStatus>,
        /// Filter by priority (high, medium, low or 1-3)
        #[arg(long)]
        priority: Option<Priority>,
        /// Filter by branch ID
        #[arg(long)]
        branch: Option<i64>,
        /// Only tickets assigned to this profile ID
        #[arg(long)]
        assignee: Option<i64>,
        /// Page number (10 tickets per page)
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Show ticket details
    Show {
        /// Ticket ID
        id: i64,
    },

    /// Update a ticket during triage
    Update {
        /// Ticket ID
        id: i64,
        /// New status (open, in_progress, resolved, rejected)
        #[arg(long)]
        status: Option<TicketStatus>,
        /// How the data was corrected
        #[arg(long)]
        fix: Option<String>,
        /// New priority (high, medium, low or 1-3)
        #[arg(long)]
        priority: Option<Priority>,
        /// Assign to this profile ID
        #[arg(long, conflicts_with = "unassign")]
        assign: Option<i64>,
        /// Clear the assignee
        #[arg(long)]
        unassign: bool,
    },

    /// Assign a ticket to a profile
    Assign {
        /// Ticket ID
        id: i64,
        /// Profile ID of the assignee
        profile: i64,
    },

    /// Clear a ticket's assignee
    Unassign {
        /// Ticket ID
        id: i64,
    },

    /// Delete a ticket and its stored screenshots
    Delete {
        /// Ticket ID
        id: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Ticket counts, recent activity and admin reports
    Dashboard,

    /// Profile management
    Users {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Branch master data
    Branch {
        #[command(subcommand)]
        action: MasterCommands,
    },

    /// Feature master data
    Feature {
        #[command(subcommand)]
        action: MasterCommands,
    },

    /// Export all tickets as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List registered profiles
    List,
    /// Register a profile
    Add {
        /// Full name
        name: String,
        /// Email used to sign in
        email: String,
        /// Role (admin, requester)
        #[arg(long, default_value = "requester")]
        role: UserRole,
        /// Home branch ID
        #[arg(long)]
        branch: Option<i64>,
    },
    /// Update a profile's name, role or branch
    Set {
        /// Profile ID
        id: i64,
        /// New full name
        #[arg(long)]
        name: Option<String>,
        /// New role (admin, requester)
        #[arg(long)]
        role: Option<UserRole>,
        /// New home branch ID
        #[arg(long, conflicts_with = "no_branch")]
        branch: Option<i64>,
        /// Clear the home branch
        #[arg(long)]
        no_branch: bool,
    },
    /// Dump the full roster with role counts (no sign-in needed)
    Roster,
}

#[derive(Subcommand)]
enum MasterCommands {
    /// List active entries
    List,
    /// Add an entry
    Add {
        /// Entry name
        name: String,
    },
}

/// A located workspace: the database plus the attachment store root.
struct Workspace {
    db: Database,
    attach_root: PathBuf,
}

fn find_datafix_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let candidate = current.join(".datafix");
        if candidate.exists() && candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a datafix workspace (or any parent). Run 'datafix init' first.");
        }
    }
}

fn open_workspace() -> Result<Workspace> {
    let datafix_dir = find_datafix_dir()?;
    let db = Database::open(&datafix_dir.join("tickets.db")).context("Failed to open database")?;
    Ok(Workspace {
        db,
        attach_root: datafix_dir.join("attachments"),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("DATAFIX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cwd = env::current_dir()?;
            commands::init::run(&cwd)
        }

        Commands::Login { email } => {
            let ws = open_workspace()?;
            commands::login::login(&ws.db, &email)
        }

        Commands::Logout => {
            let ws = open_workspace()?;
            commands::login::logout(&ws.db)
        }

        Commands::Whoami => {
            let ws = open_workspace()?;
            commands::login::whoami(&ws.db)
        }

        Commands::Submit {
            date,
            issue_type,
            branch,
            feature,
            feature_other,
            inputter,
            description,
            priority,
            wrong,
            correct,
            screenshots,
        } => {
            let ws = open_workspace()?;
            let user = SessionManager::new(&ws.db).require_user()?;
            let form = commands::submit::SubmitForm {
                wrong_input_date: date,
                issue_type,
                branch_id: branch,
                feature_id: feature,
                feature_other,
                inputter_name: inputter,
                description,
                priority,
                wrong,
                correct,
                screenshots,
            };
            commands::submit::run(&ws.db, &ws.attach_root, &user, &form)
        }

        Commands::List {
            search,
            status,
            priority,
            branch,
            assignee,
            page,
        } => {
            let ws = open_workspace()?;
            SessionManager::new(&ws.db).require_user()?;
            let filters = TicketFilters {
                status: None,
                branch_id: branch,
                assigned_to: assignee,
            };
            commands::list::run(&ws.db, &filters, search, status, priority, page)
        }

        Commands::Show { id } => {
            let ws = open_workspace()?;
            let user = SessionManager::new(&ws.db).require_user()?;
            commands::show::run(&ws.db, &user, id)
        }

        Commands::Update {
            id,
            status,
            fix,
            priority,
            assign,
            unassign,
        } => {
            let ws = open_workspace()?;
            let user = SessionManager::new(&ws.db).require_user()?;
            let upd = TicketUpdate {
                status,
                fix_description: fix,
                priority,
                assigned_to: if unassign {
                    Some(None)
                } else {
                    assign.map(Some)
                },
            };
            commands::update::run(&ws.db, &user, id, &upd)
        }

        Commands::Assign { id, profile } => {
            let ws = open_workspace()?;
            let user = SessionManager::new(&ws.db).require_user()?;
            commands::assign::run(&ws.db, &user, id, profile)
        }

        Commands::Unassign { id } => {
            let ws = open_workspace()?;
            let user = SessionManager::new(&ws.db).require_user()?;
            commands::assign::unassign(&ws.db, &user, id)
        }

        Commands::Delete { id, force } => {
            let ws = open_workspace()?;
            let user = SessionManager::new(&ws.db).require_user()?;
            commands::delete::run(&ws.db, &ws.attach_root, &user, id, force)
        }

        Commands::Dashboard => {
            let ws = open_workspace()?;
            let user = SessionManager::new(&ws.db).require_user()?;
            commands::dashboard::run(&ws.db, &user)
        }

        Commands::Users { action } => {
            let ws = open_workspace()?;
            match action {
                UserCommands::List => {
                    let user = SessionManager::new(&ws.db).require_user()?;
                    commands::users::list(&ws.db, &user)
                }
                UserCommands::Add {
                    name,
                    email,
                    role,
                    branch,
                } => {
                    // Signing in is impossible before the first profile
                    // exists, so `add` tolerates an absent session.
                    let user = SessionManager::new(&ws.db).current()?;
                    commands::users::add(&ws.db, user.as_ref(), &name, &email, role, branch)
                }
                UserCommands::Set {
                    id,
                    name,
                    role,
                    branch,
                    no_branch,
                } => {
                    let user = SessionManager::new(&ws.db).require_user()?;
                    let upd = ProfileUpdate {
                        full_name: name,
                        role,
                        branch_id: if no_branch {
                            Some(None)
                        } else {
                            branch.map(Some)
                        },
                    };
                    commands::users::set(&ws.db, &user, id, &upd)
                }
                UserCommands::Roster => commands::users::roster(&ws.db),
            }
        }

        Commands::Branch { action } => {
            let ws = open_workspace()?;
            match action {
                MasterCommands::List => commands::master::list_branches(&ws.db),
                MasterCommands::Add { name } => {
                    let user = SessionManager::new(&ws.db).require_user()?;
                    commands::master::add_branch(&ws.db, &user, &name)
                }
            }
        }

        Commands::Feature { action } => {
            let ws = open_workspace()?;
            match action {
                MasterCommands::List => commands::master::list_features(&ws.db),
                MasterCommands::Add { name } => {
                    let user = SessionManager::new(&ws.db).require_user()?;
                    commands::master::add_feature(&ws.db, &user, &name)
                }
            }
        }

        Commands::Export { output } => {
            let ws = open_workspace()?;
            commands::export::run(&ws.db, output.as_deref())
        }
    }
}

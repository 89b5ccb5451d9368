//! Clinic Admin: bootstrap and schema maintenance.
//!
//! Exit codes: `0` success, `1` error, `2` already exists (no-op).

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clinic_audit::AuditActor;
use clinic_auth::{LogMailer, NewMember, SuperadminInput, SuperadminOutcome};
use clinic_core::models::role::Role;
use clinic_core::models::tenant::CreateTenant;
use clinic_db::{DbManager, role_evolver, rollback_role_revision, run_migrations};
use clinic_server::{AppState, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_ALREADY_EXISTS: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "clinic-admin", about = "Clinic backend administration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the platform super-administrator.
    CreateSuperadmin {
        #[arg(long, env = "SUPERADMIN_EMAIL")]
        email: Option<String>,
        #[arg(long, env = "SUPERADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long, default_value = "Super")]
        first_name: String,
        #[arg(long, default_value = "Admin")]
        last_name: String,
    },
    /// Create a tenant with its first administrator.
    OnboardTenant {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        plan: Option<String>,
        #[arg(long)]
        admin_email: String,
        #[arg(long)]
        admin_first_name: String,
        #[arg(long)]
        admin_last_name: String,
    },
    /// Apply pending schema migrations and role revisions.
    Migrate,
    /// Apply or revert a role-schema revision.
    RoleMigration {
        #[command(subcommand)]
        direction: Direction,
    },
}

#[derive(Subcommand, Debug)]
enum Direction {
    Up { revision: String },
    Down { revision: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clinic=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "Command failed");
            ExitCode::FAILURE
        }
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

async fn run(command: Command) -> CliResult<ExitCode> {
    let config = ServerConfig::from_env()?;
    let db = DbManager::connect(&config.db).await?;
    // A downgrade must not re-apply the revision it is about to revert.
    if !matches!(
        command,
        Command::RoleMigration {
            direction: Direction::Down { .. }
        }
    ) {
        run_migrations(db.client()).await?;
    }

    match command {
        Command::Migrate => {
            info!("Schema is up to date");
            Ok(ExitCode::SUCCESS)
        }
        Command::RoleMigration { direction } => role_migration(&db, direction).await,
        Command::CreateSuperadmin {
            email,
            password,
            first_name,
            last_name,
        } => {
            let email = match email {
                Some(email) => email,
                None => prompt("Super-admin email: ")?,
            };
            let password = match password {
                Some(password) => password,
                None => prompt("Super-admin password: ")?,
            };
            let state = app_state(&db, &config);
            let outcome = state
                .provisioning
                .create_superadmin(SuperadminInput {
                    email,
                    password,
                    first_name,
                    last_name,
                })
                .await;
            state.audit.shutdown().await;

            match outcome? {
                SuperadminOutcome::Created(user) => {
                    info!(user_id = %user.id, email = %user.email, "Super-admin created");
                    Ok(ExitCode::SUCCESS)
                }
                SuperadminOutcome::AlreadyExists => {
                    info!("A principal with that email already exists; nothing changed");
                    Ok(ExitCode::from(EXIT_ALREADY_EXISTS))
                }
            }
        }
        Command::OnboardTenant {
            name,
            slug,
            plan,
            admin_email,
            admin_first_name,
            admin_last_name,
        } => {
            let state = app_state(&db, &config);
            let outcome = state
                .provisioning
                .onboard_tenant(
                    &AuditActor::system(),
                    CreateTenant {
                        name,
                        slug,
                        email: None,
                        phone: None,
                        address: None,
                        logo_url: None,
                        primary_color: None,
                        settings: None,
                        plan,
                    },
                    NewMember {
                        email: admin_email,
                        first_name: admin_first_name,
                        last_name: admin_last_name,
                        phone: None,
                        role: Role::TenantAdmin,
                    },
                )
                .await;
            state.audit.shutdown().await;

            let outcome = outcome?;
            info!(
                tenant_id = %outcome.tenant.id,
                admin_id = %outcome.admin.id,
                admin_created = outcome.admin_created,
                welcome_email_sent = outcome.welcome_email_sent,
                "Tenant onboarded"
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn app_state(db: &DbManager, config: &ServerConfig) -> AppState {
    AppState::new(
        db.client().clone(),
        config.auth.clone(),
        config.audit.clone(),
        Arc::new(LogMailer),
    )
}

async fn role_migration(db: &DbManager, direction: Direction) -> CliResult<ExitCode> {
    match direction {
        // Registered revisions are part of the migration chain, so
        // `run_migrations` above has already applied them.
        Direction::Up { revision } => {
            if role_evolver::revision(&revision).is_none() {
                return Err(format!("unknown role revision {revision}").into());
            }
            let labels = role_evolver::current_labels(db.client()).await?;
            info!(%revision, ?labels, "Role revision applied");
        }
        Direction::Down { revision } => {
            rollback_role_revision(db.client(), &revision).await?;
            let labels = role_evolver::current_labels(db.client()).await?;
            info!(%revision, ?labels, "Role revision reverted");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn prompt(label: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(label.as_bytes())?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

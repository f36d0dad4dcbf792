use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use spacegate_core::config::Config;
use spacegate_core::core_space::storage::CURRENT_DIRECTORY_SCHEMA_VERSION;
use spacegate_core::core_space::{
    permissions_for, LocalTenantProvisioner, Organization, OrganizationId,
    OrganizationMembership, OrganizationRole, OrganizationUpdate, OrganizationVisibility, SpaceEnumerator,
    SpaceError, SpaceResolver, SqlDirectory, User, UserId,
};
use spacegate_core::logging::{init_logging_with_config, LogConfig};
use spacegate_core::telemetry::{TraceContext, TracedOperation};
use spacegate_core::OrganizationManager;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Instrument};

#[derive(Parser, Debug)]
#[command(name = "spacegate")]
#[command(author, version, about = "Resolve and manage tenant-backed spaces", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory database path, overrides the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the directory database and apply migrations
    Init,

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage organizations and their members
    #[command(subcommand)]
    Org(OrgCommand),

    /// List the spaces a user can see
    Spaces {
        #[arg(long)]
        user: String,
    },

    /// Resolve a space for a user
    Resolve {
        #[arg(long)]
        user: String,

        /// personal or organization
        #[arg(long = "type")]
        space_type: String,

        #[arg(long)]
        space: String,
    },

    /// Show the capabilities granted by a role name
    Permissions { role: String },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// List registered users
    List,
}

#[derive(Subcommand, Debug)]
enum OrgCommand {
    /// Create an organization owned by the actor
    Create {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "private")]
        visibility: String,
    },
    /// Rename or change visibility
    Update {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        visibility: Option<String>,
    },
    /// Delete an organization
    Delete {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        org: String,
    },
    /// Add a member
    Invite {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// Change a member's role
    SetRole {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        role: String,
    },
    /// Remove a member
    Remove {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
    },
    /// List members
    Members {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        org: String,
    },
    /// Provision and bind the organization's tenant
    Provision {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        org: String,
    },
}

/// Everything a command needs, wired to one directory database
struct App {
    database: PathBuf,
    directory: Arc<SqlDirectory>,
    resolver: SpaceResolver,
    enumerator: SpaceEnumerator,
    manager: OrganizationManager,
    timeout: Duration,
}

impl App {
    fn open(config: &Config) -> Result<Self> {
        let directory = Arc::new(
            SqlDirectory::open(&config.store)
                .with_context(|| format!("opening {}", config.store.database_path.display()))?,
        );
        let provisioner = Arc::new(LocalTenantProvisioner::new());

        Ok(Self {
            resolver: SpaceResolver::new(directory.clone(), directory.clone()),
            enumerator: SpaceEnumerator::new(
                directory.clone(),
                directory.clone(),
                provisioner.clone(),
                config.provisioning.clone(),
            ),
            manager: OrganizationManager::new(
                directory.clone(),
                directory.clone(),
                provisioner,
                config.provisioning.clone(),
            ),
            directory,
            database: config.store.database_path.clone(),
            timeout: config.request.timeout,
        })
    }

    /// Run one store call under the request deadline
    async fn call<T>(&self, fut: impl Future<Output = Result<T, SpaceError>>) -> Result<T> {
        let value = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| SpaceError::Unavailable(format!("request timed out after {:?}", self.timeout)))??;
        Ok(value)
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(db) = &args.db {
        config.store.database_path = db.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

fn parse_role(raw: &str) -> Result<OrganizationRole, SpaceError> {
    raw.parse().map_err(|_| SpaceError::BadRequest(format!("unknown role '{raw}'")))
}

fn parse_visibility(raw: &str) -> Result<OrganizationVisibility, SpaceError> {
    raw.parse().map_err(|_| SpaceError::BadRequest(format!("unknown visibility '{raw}'")))
}

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "full_name": user.full_name,
        "username": user.username,
        "personal_tenant_id": user.personal_tenant.as_ref().map(|b| b.tenant_id.clone()),
    })
}

fn organization_json(org: &Organization) -> Value {
    json!({
        "id": org.id,
        "slug": org.slug,
        "name": org.name,
        "visibility": org.visibility,
        "tenant_id": org.tenant.as_ref().map(|b| b.tenant_id.clone()),
    })
}

fn member_json(member: &OrganizationMembership) -> Value {
    json!({
        "user_id": member.user_id,
        "role": member.role,
        "invited_by": member.invited_by,
        "joined_at": member.joined_at,
    })
}

async fn run(app: &App, command: Command) -> Result<Value> {
    let output = match command {
        Command::Init => json!({
            "database": app.database.display().to_string(),
            "schema_version": CURRENT_DIRECTORY_SCHEMA_VERSION,
        }),

        Command::User(UserCommand::Add { id, email, username, name }) => {
            let user = User::new(UserId::new(id), email, name, username);
            app.call(app.directory.create_user(&user)).await?;
            info!(user_id = %user.id, "User registered");
            user_json(&user)
        }
        Command::User(UserCommand::List) => {
            let users = app.call(app.directory.list_users()).await?;
            Value::Array(users.iter().map(user_json).collect())
        }

        Command::Org(org_command) => run_org(app, org_command).await?,

        Command::Spaces { user } => {
            let listing = app.call(app.enumerator.list_spaces(&UserId::new(user))).await?;
            serde_json::to_value(listing.into_vec())?
        }

        Command::Resolve { user, space_type, space } => {
            let ctx = app.call(app.resolver.resolve_raw(&UserId::new(user), &space_type, &space)).await?;
            serde_json::to_value(&ctx)?
        }

        Command::Permissions { role } => json!({
            "role": role,
            "permissions": permissions_for(&role).names(),
        }),
    };
    Ok(output)
}

async fn run_org(app: &App, command: OrgCommand) -> Result<Value> {
    let manager = &app.manager;
    let output = match command {
        OrgCommand::Create { actor, slug, name, visibility } => {
            let visibility = parse_visibility(&visibility)?;
            let org = app
                .call(manager.create_organization(&UserId::new(actor), &slug, &name, visibility))
                .await?;
            organization_json(&org)
        }
        OrgCommand::Update { actor, org, name, visibility } => {
            let update = OrganizationUpdate {
                name,
                visibility: visibility.as_deref().map(parse_visibility).transpose()?,
            };
            let org = app
                .call(manager.update_organization(&UserId::new(actor), &OrganizationId::new(org), update))
                .await?;
            organization_json(&org)
        }
        OrgCommand::Delete { actor, org } => {
            app.call(manager.delete_organization(&UserId::new(actor), &OrganizationId::new(&org)))
                .await?;
            json!({ "deleted": org })
        }
        OrgCommand::Invite { actor, org, user, role } => {
            let role = parse_role(&role)?;
            let membership = app
                .call(manager.invite_member(
                    &UserId::new(actor),
                    &OrganizationId::new(org),
                    &UserId::new(user),
                    role,
                ))
                .await?;
            member_json(&membership)
        }
        OrgCommand::SetRole { actor, org, user, role } => {
            let role = parse_role(&role)?;
            app.call(manager.update_member_role(
                &UserId::new(actor),
                &OrganizationId::new(org),
                &UserId::new(&user),
                role,
            ))
            .await?;
            json!({ "user_id": user, "role": role })
        }
        OrgCommand::Remove { actor, org, user } => {
            app.call(manager.remove_member(&UserId::new(actor), &OrganizationId::new(org), &UserId::new(&user)))
                .await?;
            json!({ "removed": user })
        }
        OrgCommand::Members { actor, org } => {
            let members = app
                .call(manager.list_members(&UserId::new(actor), &OrganizationId::new(org)))
                .await?;
            Value::Array(members.iter().map(member_json).collect())
        }
        OrgCommand::Provision { actor, org } => {
            let binding = app
                .call(manager.provision_organization_tenant(&UserId::new(actor), &OrganizationId::new(&org)))
                .await?;
            json!({ "organization_id": org, "tenant_id": binding.tenant_id })
        }
    };
    Ok(output)
}

/// Process exit status for a failed command
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SpaceError>().map(SpaceError::kind) {
        Some("bad_request") => 2,
        Some("not_found") => 3,
        Some("forbidden") => 4,
        Some("conflict") => 5,
        Some(_) => 6,
        None => 1,
    }
}

fn error_json(err: &anyhow::Error) -> Value {
    let kind = err.downcast_ref::<SpaceError>().map(SpaceError::kind).unwrap_or("internal");
    json!({ "error": kind, "message": format!("{err:#}") })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let result = async move {
        let config = load_config(&args)?;
        init_logging_with_config(LogConfig::from_settings(&config.logging)?)?;
        spacegate_core::metrics::init_metrics();
        debug!(database = %config.store.database_path.display(), "Configuration loaded");

        let app = App::open(&config)?;
        let trace = TraceContext::new();
        let op = TracedOperation::with_context("cli_command", &trace);
        let result = run(&app, args.command).instrument(op.span().clone()).await;
        match &result {
            Ok(_) => op.complete(),
            Err(e) => op.record_error(e),
        }
        result
    }
    .await;

    match result {
        Ok(output) => println!("{output:#}"),
        Err(err) => {
            eprintln!("{}", error_json(&err));
            std::process::exit(exit_code(&err));
        }
    }
}

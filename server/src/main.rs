mod auth;
mod config;
mod http;
mod rest;

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_db::{DatabaseSettings, DbPool, connect};
use platform_obs::{ObsConfig, init_tracing};
use products_crm::{LogMailer, seed_demo};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "sales-crm", version, about = "Sales CRM REST API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Insert the demo admin, leads, customer and invoice.
    Seed(SeedCommand),
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8000)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

#[derive(Args, Debug)]
struct SeedCommand {
    #[arg(long, env = "SEED_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: String,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _obs = init_tracing(ObsConfig::from_env())?;
    match Cli::parse().command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Migrate(action) => run_migrate(action).await,
        Command::Seed(cmd) => run_seed(cmd).await,
    }
}

async fn open_pool() -> Result<DbPool> {
    Ok(connect(&DatabaseSettings::from_env()).await?)
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = AppConfig::load()?;
    let pool = open_pool().await?;
    require_current_schema(&pool, cmd.allow_dirty).await?;
    let state = AppState {
        pool,
        access: Arc::new(config.access()),
        scorer: config.scorer()?,
        mailer: Arc::new(LogMailer),
        cors_allowed_origins: config.cors_allowed_origins.clone().into(),
    };
    http::serve((&cmd).into(), state).await
}

async fn run_migrate(action: MigrateCommand) -> Result<()> {
    let pool = open_pool().await?;
    match action {
        MigrateCommand::Up => {
            Migrator::up(&pool, None).await?;
            info!("schema is up to date");
        }
        MigrateCommand::Down => {
            Migrator::down(&pool, Some(1)).await?;
            info!("rolled back one migration");
        }
    }
    Ok(())
}

async fn run_seed(cmd: SeedCommand) -> Result<()> {
    let pool = open_pool().await?;
    require_current_schema(&pool, false).await?;
    let seeded = seed_demo(&pool, &cmd.admin_password).await?;
    info!(
        admin = %seeded.admin.username,
        leads = seeded.leads.len(),
        invoice = %seeded.invoice.invoice_number,
        "seed complete"
    );
    Ok(())
}

/// Refuse to run against a database with unapplied migrations.
async fn require_current_schema(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if pending.is_empty() {
        return Ok(());
    }
    if allow_dirty {
        warn!(pending = pending.len(), "starting with pending migrations");
        return Ok(());
    }
    anyhow::bail!(
        "{} pending migration(s); run `sales-crm migrate up` or pass --allow-dirty",
        pending.len()
    )
}

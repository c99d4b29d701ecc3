//! shelfguard: operator commands for the upload quarantine.
//!
//! Reads configuration from the environment (and `.env`), connects to the
//! record store at DATABASE_URL and applies pending migrations on start.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use shelfguard_cli::{print_json, print_manifest_table, print_status_table, OutputFormat};
use shelfguard_core::Config;
use shelfguard_db::{connect, run_migrations, PgUploadRepository};
use shelfguard_infra::init_telemetry;
use shelfguard_services::{
    read_manifest, LocalFileStore, QuarantineLifecycle, SweepOptions, SysinfoDiskProbe,
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "shelfguard", about = "Upload quarantine lifecycle manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Disk and quarantine usage, record counts and warnings
    Status {
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Ask the capacity gate whether a file of this size may be accepted
    Admit {
        #[arg(long)]
        size_bytes: u64,
    },
    /// Delete aged quarantine files that never passed verification
    Sweep {
        /// Override the configured retention age
        #[arg(long)]
        max_age_hours: Option<u64>,
        /// Stop once this many bytes are freed
        #[arg(long)]
        target_bytes: Option<u64>,
    },
    /// Delete unverified quarantine files, oldest first, until enough is freed
    Reclaim {
        #[arg(long)]
        target_bytes: u64,
    },
    /// Resolve a verified upload and promote or discard it
    Promote {
        /// Upload ID
        id: Uuid,
    },
    /// Discard a verified upload
    Discard {
        /// Upload ID
        id: Uuid,
        #[arg(long)]
        reason: String,
    },
    /// Show the audit manifest
    Manifest {
        /// Show only the most recent N entries
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Run the periodic retention sweep until Ctrl-C
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_telemetry(config.log_format)
        .map_err(|e| anyhow!("Failed to initialize telemetry: {}", e))?;

    // The manifest is a plain file; reading it needs no database.
    match cli.command {
        Commands::Manifest { limit, format } => show_manifest(&config, limit, format),
        command => run(command, build_lifecycle(config).await?).await,
    }
}

async fn run(command: Commands, lifecycle: QuarantineLifecycle) -> Result<()> {
    match command {
        Commands::Status { format } => {
            let status = lifecycle.disk_status().await?;
            match format {
                OutputFormat::Json => print_json(&status)?,
                OutputFormat::Table => print_status_table(&status),
            }
        }
        Commands::Admit { size_bytes } => {
            let admission = lifecycle.admit(size_bytes).await?;
            print_json(&admission)?;
            if !admission.allowed() {
                std::process::exit(2);
            }
        }
        Commands::Sweep {
            max_age_hours,
            target_bytes,
        } => {
            let mut options = SweepOptions::default();
            if let Some(hours) = max_age_hours {
                options = options.with_max_age_hours(hours);
            }
            if let Some(bytes) = target_bytes {
                options = options.with_target(bytes);
            }
            print_json(&lifecycle.sweep(options).await?)?;
        }
        Commands::Reclaim { target_bytes } => {
            print_json(&lifecycle.reclaim_to(target_bytes).await?)?;
        }
        Commands::Promote { id } => {
            print_json(&lifecycle.promote_verified(id).await?)?;
        }
        Commands::Discard { id, reason } => {
            print_json(&lifecycle.discard(id, &reason).await?)?;
        }
        Commands::Manifest { limit, format } => show_manifest(lifecycle.config(), limit, format)?,
        Commands::Serve => serve(lifecycle).await?,
    }

    Ok(())
}

fn show_manifest(config: &Config, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let mut entries = read_manifest(&config.moving.manifest_path)?;
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    match format {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Table => {
            print_manifest_table(&entries);
            Ok(())
        }
    }
}

async fn build_lifecycle(config: Config) -> Result<QuarantineLifecycle> {
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    let pool = connect(&database_url).await?;
    run_migrations(&pool).await?;

    let files = LocalFileStore::new(config.moving.directory_permissions_mode);
    let lifecycle = QuarantineLifecycle::new(
        config,
        Arc::new(PgUploadRepository::new(pool)),
        Arc::new(files),
        Arc::new(SysinfoDiskProbe::new()),
    );
    lifecycle.ensure_directories().await?;
    Ok(lifecycle)
}

async fn serve(lifecycle: QuarantineLifecycle) -> Result<()> {
    let scheduler = lifecycle.scheduler();
    tracing::info!(
        period_secs = scheduler.period().as_secs(),
        "Starting retention sweep scheduler"
    );
    let handle = lifecycle.start_scheduler();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    lifecycle.shutdown();
    handle.await.context("Sweep scheduler task failed")?;
    Ok(())
}

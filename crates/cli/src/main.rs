use crate::{commands::Commands, config::AppConfig, error::CliError};
use clap::Parser;
use engine::{data_sync, schema_sync, source_setup, sql_script};
use std::{fs, path::Path, process};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;
mod tables;

#[derive(Parser)]
#[command(
    name = "melchi",
    version,
    about = "Replicates warehouse tables with stream-based CDC"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        default_value = "config/config.yaml",
        help = "Config file path"
    )]
    config: String,

    #[arg(
        long,
        global = true,
        help = "Drop and recreate existing CDC objects and target tables (destructive)"
    )]
    replace_existing: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let exit_code = match run_cli().await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    };
    process::exit(exit_code);
}

async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(Path::new(&cli.config))?;
    if cli.replace_existing {
        config.set_replace_existing(true);
    }
    let tables = tables::load_tables(Path::new(&config.tables_path))?;
    info!(tables = tables.len(), "loaded replication scope");

    match cli.command {
        Commands::Setup => {
            source_setup::setup_source(&config.source, &tables).await?;
            schema_sync::transfer_schema(&config.source, &config.target, &tables).await?;
            info!("setup completed");
            Ok(())
        }
        Commands::SyncData => {
            let report = data_sync::sync_data(&config.source, &config.target, &tables).await?;
            for table in &report.synced {
                info!("synced {table}");
            }
            for (table, message) in &report.failed {
                error!("failed {table}: {message}");
            }
            if report.all_succeeded() {
                Ok(())
            } else {
                Err(CliError::PartialFailure {
                    failed: report.failed.len(),
                })
            }
        }
        Commands::GenerateSourceSql { output } => {
            let sql = sql_script::generate_source_sql(&config.source, &tables)?;
            fs::create_dir_all(&output)?;
            let path = Path::new(&output).join("source_setup.sql");
            fs::write(&path, sql)?;
            info!("wrote {}", path.display());
            Ok(())
        }
    }
}

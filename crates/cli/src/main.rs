//! schoolhouse-migrate: operator tool for the schema migration runner.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use schoolhouse_core::migrate::source;
use schoolhouse_core::{AppConfig, Database, MigrationRunner};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(message) => println!("{message}"),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<String> {
    let mut config = AppConfig::load().context("loading configuration")?;
    if let Some(path) = cli.db_path {
        config.db_path = path;
    }
    if let Some(dir) = cli.migrations_dir {
        config.migrations_dir = Some(dir);
    }

    match cli.command {
        Commands::Create(args) => commands::create(config.migrations_dir.as_deref(), &args.name),
        Commands::Up(args) => commands::up(&open_runner(&config).await?, args.steps).await,
        Commands::Down(args) => commands::down(&open_runner(&config).await?, args.steps).await,
        Commands::Version => commands::version(&open_runner(&config).await?).await,
        Commands::Force(args) => commands::force(&open_runner(&config).await?, args.steps).await,
    }
}

async fn open_runner(config: &AppConfig) -> Result<MigrationRunner> {
    let steps = source::load(config.migrations_dir.as_deref()).context("loading migrations")?;
    let db = Database::connect(&config.db_path, &config.retry_policy())
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let runner = MigrationRunner::new(&db, steps);
    tracing::debug!(db = %config.db_path.display(), steps = runner.steps().len(), "runner ready");
    Ok(runner)
}

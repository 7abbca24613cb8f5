use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "schoolhouse-migrate")]
#[command(about = "Apply, revert and inspect schoolhouse schema migrations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// SQLite database file (overrides SCHOOLHOUSE_DB_PATH and the config file)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Directory of `<version>_<name>.{up,down}.sql` scripts; built-in migrations when unset
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply pending migrations
    Up(StepsArgs),
    /// Revert applied migrations
    Down(StepsArgs),
    /// Print the recorded schema version
    Version,
    /// Record a version as clean without running any script
    Force(ForceArgs),
    /// Scaffold an empty up/down script pair
    Create(CreateArgs),
}

#[derive(Debug, clap::Args)]
pub struct StepsArgs {
    /// Number of steps; 0 means all
    #[arg(long, default_value_t = 0)]
    pub steps: usize,
}

#[derive(Debug, clap::Args)]
pub struct ForceArgs {
    /// Version to record; must be at least 1 (use `down` to revert everything)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub steps: u64,
}

#[derive(Debug, clap::Args)]
pub struct CreateArgs {
    /// Human-readable migration name
    #[arg(long)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_up_defaults_to_all() {
        let cli = Cli::try_parse_from(["schoolhouse-migrate", "up"]).unwrap();
        assert!(matches!(cli.command, Commands::Up(StepsArgs { steps: 0 })));
    }

    #[test]
    fn test_parse_global_flags_after_command() {
        let cli = Cli::try_parse_from(["schoolhouse-migrate", "down", "--steps", "2", "--db-path", "x.sqlite"]).unwrap();
        assert!(matches!(cli.command, Commands::Down(StepsArgs { steps: 2 })));
        assert_eq!(cli.db_path, Some(PathBuf::from("x.sqlite")));
    }

    #[test]
    fn test_force_requires_version() {
        assert!(Cli::try_parse_from(["schoolhouse-migrate", "force"]).is_err());
        let cli = Cli::try_parse_from(["schoolhouse-migrate", "force", "--steps", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Force(ForceArgs { steps: 3 })));
    }

    #[test]
    fn test_force_rejects_version_zero() {
        let err = Cli::try_parse_from(["schoolhouse-migrate", "force", "--steps", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_create_requires_name() {
        assert!(Cli::try_parse_from(["schoolhouse-migrate", "create"]).is_err());
    }
}

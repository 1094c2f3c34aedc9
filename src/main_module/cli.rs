use anyhow::{anyhow, Context, Result};
use diesel::prelude::*;
use log::{info, warn};
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{create_conn, mask_database_url, run_migrations};

use super::run_axum_server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Migrate,
    CheckDb,
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        match args.get(1).map(String::as_str) {
            None | Some("serve") => Ok(Self::Serve),
            Some("migrate") => Ok(Self::Migrate),
            Some("check-db") => Ok(Self::CheckDb),
            Some("--help") | Some("-h") | Some("help") => Ok(Self::Help),
            Some(other) => Err(anyhow!("Unknown command: {other}")),
        }
    }
}

pub fn print_usage() {
    println!("Baterías backend {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: baterias-server [command]");
    println!();
    println!("Commands:");
    println!("  serve      Run the HTTP server (default)");
    println!("  migrate    Apply pending database migrations and exit");
    println!("  check-db   Test the database connection");
    println!("  --help     Show this message");
}

pub async fn run(args: Vec<String>) -> Result<()> {
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            return Err(e);
        }
    };
    if command == Command::Help {
        print_usage();
        return Ok(());
    }

    let config = AppConfig::from_env()?;
    match command {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(&config),
        Command::CheckDb => check_db(&config),
        Command::Help => Ok(()),
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    info!(
        "Connecting to database at {}",
        mask_database_url(&config.database.url)
    );
    let pool = create_conn(&config.database).context("Failed to create database pool")?;

    if config.database.run_migrations {
        run_migrations(&pool)?;
    } else {
        warn!("RUN_MIGRATIONS disabled, skipping migrations");
    }

    let state = Arc::new(AppState::new(pool, config)?);
    run_axum_server(state).await?;
    Ok(())
}

fn migrate(config: &AppConfig) -> Result<()> {
    let pool = create_conn(&config.database).context("Failed to create database pool")?;
    run_migrations(&pool)?;
    println!("Migrations applied");
    Ok(())
}

fn check_db(config: &AppConfig) -> Result<()> {
    println!("Database URL: {}", mask_database_url(&config.database.url));
    println!("Max connections: {}", config.database.max_connections);
    match PgConnection::establish(&config.database.url) {
        Ok(mut conn) => {
            diesel::sql_query("SELECT 1")
                .execute(&mut conn)
                .context("Connected but the test query failed")?;
            println!("✓ Database connection OK");
            Ok(())
        }
        Err(e) => {
            println!("✗ Database connection failed: {e}");
            Err(anyhow!("Database connection failed: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(&args(&["bin"])).unwrap(), Command::Serve);
        assert_eq!(Command::parse(&args(&["bin", "serve"])).unwrap(), Command::Serve);
        assert_eq!(Command::parse(&args(&["bin", "migrate"])).unwrap(), Command::Migrate);
        assert_eq!(Command::parse(&args(&["bin", "check-db"])).unwrap(), Command::CheckDb);
        assert_eq!(Command::parse(&args(&["bin", "-h"])).unwrap(), Command::Help);
        assert!(Command::parse(&args(&["bin", "install"])).is_err());
    }

    #[tokio::test]
    async fn test_help_does_not_read_config() {
        assert!(run(args(&["bin", "--help"])).await.is_ok());
    }
}

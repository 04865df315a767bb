//! # Main — CLI Entry Point
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API (migrates the schema first).
//! - `migrate`: create missing tables and exit.
//! - `challenges`: print the challenge catalog.
//! - `grant-admin <user>`: make an account an administrator.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//! - `--config` / `PETNET_CONFIG`: optional TOML configuration file.
//! - `--memory`: use the in-process store instead of PostgreSQL.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "petnet", about = "Petnet backend: pets, XP challenges, barks and votes")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// TOML configuration file
    #[arg(long, env = "PETNET_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Keep all data in process memory (lost on exit)
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Port to listen on (overrides [server] port)
        #[arg(long)]
        port: Option<u16>,
        /// Directory of a static frontend export to serve as the fallback
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Create or update the database schema
    Migrate,
    /// Print the XP challenge catalog
    Challenges,
    /// Grant the admin role to an account
    GrantAdmin {
        /// Account id (the identity provider's `sub` claim)
        user_id: String,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Challenges => cli::run_challenges(),
        Commands::Serve { port, static_dir } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_serve(&cli, *port, static_dir.clone()))
        }
        Commands::Migrate => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_migrate(&cli))
        }
        Commands::GrantAdmin { user_id } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::run_grant_admin(&cli, user_id))
        }
    }
}

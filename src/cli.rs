//! # CLI Execution Functions
//!
//! Execution logic for each subcommand, kept out of `main.rs`.

use anyhow::{Context, Result};
use petnet::api::{self, AppState};
use petnet::catalog;
use petnet::config::Config;
use petnet::service::Petnet;
use petnet::store::{MemoryStore, PgStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::Cli;

fn database_url(cli: &Cli) -> Result<&str> {
    cli.database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)"))
}

async fn connect(cli: &Cli) -> Result<PgStore> {
    let store = PgStore::connect(database_url(cli)?)
        .await
        .context("connecting to PostgreSQL")?;
    Ok(store)
}

pub async fn run_serve(cli: &Cli, port: Option<u16>, static_dir: Option<PathBuf>) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if static_dir.is_some() {
        config.server.static_dir = static_dir;
    }
    if config.auth.jwt_secret.is_none() {
        warn!("no JWT secret configured; bearer tokens are accepted without signature verification");
    }

    let store: Arc<dyn Store> = if cli.memory {
        info!("using in-memory store; data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let pg = connect(cli).await?;
        pg.migrate().await.context("applying schema")?;
        Arc::new(pg)
    };

    let port = config.server.port;
    let state = AppState::from_config(store, config)?;
    api::run(state, port).await
}

pub async fn run_migrate(cli: &Cli) -> Result<()> {
    let store = connect(cli).await?;
    store.migrate().await.context("applying schema")?;
    info!("schema is up to date");
    Ok(())
}

pub async fn run_grant_admin(cli: &Cli, user_id: &str) -> Result<()> {
    let store = connect(cli).await?;
    let service = Petnet::new(Arc::new(store));
    let user = service.grant_admin(user_id).await?;
    info!(user_id = %user.id, role = %user.role, "role updated");
    println!("{} is now {}", user.id, user.role);
    Ok(())
}

pub fn run_challenges() -> Result<()> {
    println!("{:<24} {:<9} {:>4} {:>5}  TITLE", "ID", "CADENCE", "GOAL", "XP");
    for c in catalog::all() {
        println!(
            "{:<24} {:<9} {:>4} {:>5}  {}",
            c.id,
            c.cadence.as_str(),
            c.goal,
            c.xp_reward,
            c.title
        );
    }
    Ok(())
}

mod api;
mod auth;
mod cli;
mod config;
mod db;
mod streak;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::config::Config;
use crate::db::Database;
use crate::streak::UserLocks;
use crate::streak::service::refresh_stored_streak;
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = load_runtime_config()?;
            run_service(config).await
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Status => handle_status(),
        Commands::Streak { username } => handle_streak(&username),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.save()?;

            let masked = if key.contains("secret") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_or_default_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config_path = Config::config_path()?;
    let config = load_runtime_config()?;

    println!("EduStreakz status");
    println!("- config: {}", config_path.display());
    println!("- listen: {}:{}", config.bind_address, config.api_port);
    println!("- completion_marker: {}", config.completion_marker);

    match Database::open(&config.db_path).and_then(|database| database.count_users()) {
        Ok(users) => {
            println!("- db: {} (reachable)", config.db_path.display());
            println!("- users: {users}");
        }
        Err(error) => println!("- db: {} (unreachable: {error:#})", config.db_path.display()),
    }

    Ok(())
}

fn handle_streak(username: &str) -> Result<()> {
    let config = load_runtime_config()?;
    let user = Database::open(&config.db_path)?
        .user_by_username(username)?
        .with_context(|| format!("User not found: {username}"))?;

    let streak = refresh_stored_streak(
        &config.db_path,
        &config.completion_marker,
        &UserLocks::default(),
        user.id,
        &Local::now(),
    )?;

    println!("{}: streak {streak}", user.username);
    Ok(())
}

async fn run_service(mut config: Config) -> Result<()> {
    if config.ensure_jwt_secret() {
        // Persist only the secret; env overrides stay out of the file.
        let mut stored = load_or_default_config()?;
        stored.jwt_secret = config.jwt_secret.clone();
        stored.save()?;
        info!("generated a new JWT signing secret");
    }
    let _ = Database::open(&config.db_path)?;

    info!(db_path = %config.db_path.display(), "EduStreakz service started");

    api::run_server(Arc::new(config)).await
}

/// Load the config file, writing defaults on first run.
fn load_or_default_config() -> Result<Config> {
    if Config::config_path()?.exists() {
        return Config::load();
    }

    let config = Config::default();
    config.save()?;
    Ok(config)
}

/// Config file plus `EDUSTREAKZ_*` environment overrides.
fn load_runtime_config() -> Result<Config> {
    let mut config = load_or_default_config()?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

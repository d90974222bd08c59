use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "edustreakz",
    about = "Gamified learning backend with daily streaks, games, badges and classes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API until interrupted.
    Serve,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
    /// Re-evaluate a user's streak the same way `POST /api/streak` does.
    Streak {
        #[arg(long)]
        username: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod offline;

#[derive(Parser)]
#[command(name = "parley", about = "Scored conversation practice in the terminal")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Play a quest file chapter by chapter
    Play(commands::play::PlayArgs),
    /// Generate one scenario and print it as JSON
    Scenario(commands::scenario::ScenarioArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Play(args) => commands::play::run(args).await,
        Commands::Scenario(args) => commands::scenario::run(args).await,
    }
}

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start(cmd) => cmd.run().await,
        Commands::Spawn(cmd) => cmd.run().await,
        Commands::MineUntil(cmd) => cmd.run().await,
        Commands::Stop(cmd) => cmd.run().await,
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

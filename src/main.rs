use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{CollectionCommand, ConfigCommand};
use modulux::app::App;
use modulux::config::Config;

#[derive(Parser)]
#[command(name = "modulux")]
#[command(version)]
#[command(about = "Operator CLI for Modulux collections", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage collections
    Collection(CollectionCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Collection(cmd)) => {
            let app = App::open(&config).await?;
            cmd.run(&app).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

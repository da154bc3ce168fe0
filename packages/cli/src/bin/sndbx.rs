use clap::{Parser, Subcommand};
use colored::*;
use std::process;

mod cli;

use cli::init::InitArgs;

#[derive(Parser)]
#[command(name = "sndbx")]
#[command(about = "Spawn a quick sandbox 📦✅")]
#[command(version)]
struct Cli {
    /// Log at debug level (overrides SNDBX_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a sandbox from an image or a local Dockerfile
    Init(InitArgs),
    /// Remove every container and network sndbx created
    Clear,
}

fn main() {
    let cli = Cli::parse();
    sndbx_cli::logging::init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    let result = runtime.block_on(handle_command(cli.command));

    // A blocking stdin read can outlive the session; don't wait for it
    runtime.shutdown_background();

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => cli::init::init_command(args).await,
        Commands::Clear => cli::clear::clear_command().await,
    }
}

//! CLI for xpcspy
//!
//! Commands:
//! - replay: run a recorded session through the agent and print the trace
//! - correlate: reassemble invocations from a raw record file
//! - decode: decode a bplist00 file
//! - hooks: list the intercepted entry points

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod collector;
mod commands;
mod output;

#[derive(Parser)]
#[command(name = "xpcspy")]
#[command(about = "xpcspy - XPC message interception and payload decoding", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session through the agent
    Replay(commands::replay::ReplayArgs),

    /// Pair raw trace records into invocations
    Correlate(commands::correlate::CorrelateArgs),

    /// Decode a binary property list file
    Decode(commands::decode::DecodeArgs),

    /// List intercepted entry points
    Hooks(commands::hooks::HooksArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Replay(args) => commands::replay::run(args).await,
        Commands::Correlate(args) => commands::correlate::run(args).await,
        Commands::Decode(args) => commands::decode::run(args).await,
        Commands::Hooks(args) => commands::hooks::run(args).await,
    };

    if let Err(e) = result {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

/// Logs go to stderr; stdout carries the trace.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

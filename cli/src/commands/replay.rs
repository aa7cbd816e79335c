//! Replay command implementation
//!
//! Drives a recorded session through the agent inside a simulated process and
//! prints the reassembled invocations, as a live trace would.

use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use xpcspy_agent::simulate::Scenario;
use xpcspy_agent::{ChannelSink, Config, EventSink, LineSink};
use xpcspy_shared::types::filter::Direction;

use crate::collector::Correlator;
use crate::output;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Recorded session (JSON)
    pub scenario: PathBuf,

    /// Configuration file (TOML)
    #[arg(short, long, env = "XPCSPY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Direction to intercept: in, out or all
    #[arg(short, long)]
    pub direction: Option<Direction>,

    /// Connection name pattern, `*` matches any characters
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Do not decode binary property lists in payloads
    #[arg(long)]
    pub no_parse: bool,

    /// Also write every raw record as a JSON line to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print invocations as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Layer configuration: recorded filter, then config file, environment, flags.
pub fn resolve_config(args: &ReplayArgs, scenario: &Scenario) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            let mut config = Config::default();
            if let Some(filter) = &scenario.filter {
                config.direction = filter.direction;
                config.channel_pattern = filter.channel_pattern.clone();
            }
            config
        }
    };

    let mut config = config.with_env()?;
    if let Some(direction) = args.direction {
        config.direction = direction;
    }
    if let Some(pattern) = &args.pattern {
        config.channel_pattern = pattern.clone();
    }
    if args.no_parse {
        config.should_decode = false;
    }
    if let Some(output) = &args.output {
        config.output = Some(output.clone());
    }

    config.validate()?;
    Ok(config)
}

pub async fn run(args: ReplayArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let config = resolve_config(&args, &scenario)?;
    let filter = config.filter();

    output::info(&format!(
        "Replaying {} call(s) from {} (direction: {}, pattern: {})",
        scenario.calls.len(),
        args.scenario.display(),
        filter.direction,
        filter.channel_pattern
    ));

    let raw = match &config.output {
        Some(path) => Some(LineSink::new(BufWriter::new(File::create(path).with_context(
            || format!("Failed to create output file: {}", path.display()),
        )?))),
        None => None,
    };

    let (sink, mut rx) = ChannelSink::new();
    let should_decode = config.should_decode;
    let replay = tokio::task::spawn_blocking(move || {
        scenario.replay(&filter, should_decode, Arc::new(sink))
    });

    let color = std::io::stdout().is_terminal();
    let mut correlator = Correlator::new();
    let mut received = 0;
    let mut printed = 0;

    while let Some(message) = rx.recv().await {
        received += 1;
        if let Some(lines) = &raw {
            lines.send(message.clone());
        }

        if let Some(invocation) = correlator.feed(message) {
            if args.json {
                println!("{}", serde_json::to_string(&invocation)?);
            } else {
                println!("{}", output::render_invocation(&invocation, color));
            }
            printed += 1;
        }
    }

    let summary = replay.await.context("Replay task failed")??;

    if let Some(lines) = raw {
        lines
            .into_inner()
            .flush()
            .context("Failed to flush output file")?;
        if let Some(path) = &config.output {
            output::info(&format!("Wrote {} record(s) to {}", received, path.display()));
        }
    }

    if correlator.pending() > 0 || correlator.unmatched() > 0 {
        output::warning(&format!(
            "{} call(s) without data, {} data record(s) without a call",
            correlator.pending(),
            correlator.unmatched()
        ));
    }

    output::success(&format!(
        "{} hook(s) installed, {} of {} call(s) intercepted, {} traced",
        summary.installed.len(),
        summary.intercepted,
        summary.total,
        printed
    ));

    Ok(())
}

//! Correlate command implementation
//!
//! Reassembles invocations from a raw record file written by `replay --output`
//! or any other producer of envelope lines.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use xpcspy_shared::protocol::wire::Envelope;

use crate::collector::{Correlator, Invocation};
use crate::output;

#[derive(Args, Debug)]
pub struct CorrelateArgs {
    /// File of JSON envelope lines
    pub file: PathBuf,

    /// Print invocations as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Pair every record in `text`, returning the invocations in completion order.
pub fn correlate(text: &str) -> Result<(Vec<Invocation>, Correlator)> {
    let mut correlator = Correlator::new();
    let mut invocations = Vec::new();

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let envelope =
            Envelope::from_line(line).with_context(|| format!("line {}", number + 1))?;
        if let Some(invocation) = correlator.feed(envelope.record) {
            invocations.push(invocation);
        }
    }

    Ok((invocations, correlator))
}

pub async fn run(args: CorrelateArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let (invocations, correlator) = correlate(&text)?;

    for invocation in &invocations {
        if args.json {
            println!("{}", serde_json::to_string(invocation)?);
        } else {
            println!("{}", output::render_invocation(invocation, false));
        }
    }

    if correlator.pending() > 0 {
        output::warning(&format!("{} call(s) never received data", correlator.pending()));
    }
    if !correlator.hooks_installed() {
        output::warning("Trace does not record hook installation");
    }
    Ok(())
}

//! Hooks command implementation

use anyhow::Result;
use clap::Args;
use xpcspy_agent::hooks::planned_hooks;
use xpcspy_shared::types::filter::Direction;

#[derive(Args, Debug)]
pub struct HooksArgs {
    /// Direction to list: in, out or all
    #[arg(short, long, default_value = "all")]
    pub direction: Direction,
}

pub async fn run(args: HooksArgs) -> Result<()> {
    for (symbol, direction) in planned_hooks(args.direction) {
        println!("{:<48} {}", symbol, direction);
    }
    Ok(())
}

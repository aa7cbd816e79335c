//! Agent error types

use thiserror::Error;

use crate::decoder::DecodeError;
use crate::runtime::RuntimeError;

/// Errors surfaced by session setup and per-call processing
#[derive(Debug, Error)]
pub enum AgentError {
    /// A required entry point is missing from the target; nothing can run.
    #[error("required symbol '{symbol}' could not be resolved in the target")]
    UnresolvedSymbol { symbol: &'static str },

    #[error("failed to attach probe to '{symbol}': {reason}")]
    Attach { symbol: String, reason: String },

    #[error("invalid channel pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

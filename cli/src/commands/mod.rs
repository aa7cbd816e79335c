//! Subcommand implementations

pub mod correlate;
pub mod decode;
pub mod hooks;
pub mod replay;

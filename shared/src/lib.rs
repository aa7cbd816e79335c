//! Shared types and utilities for xpcspy
//!
//! This crate contains the trace record types exchanged between the agent and
//! its host, the host wire envelope, the binary property-list decoder, and a
//! few small utilities used across the agent and the CLI.

pub mod plist;
pub mod protocol;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{events::*, filter::*, payload::*};

//! Data model shared by the agent and the host

pub mod events;
pub mod filter;
pub mod payload;

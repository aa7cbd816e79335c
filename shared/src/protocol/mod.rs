//! Wire protocol definitions
//!
//! This module defines how host records are framed between the agent's
//! transport and the controlling process.

pub mod wire;

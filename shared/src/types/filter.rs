//! Interception filter types

use serde::{Deserialize, Serialize};

/// Which side of a connection to intercept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    All,
}

impl Direction {
    const INCOMING_BIT: u8 = 1;
    const OUTGOING_BIT: u8 = 2;

    /// Bit-flag value (`Incoming = 1`, `Outgoing = 2`, `All = 3`)
    pub fn bits(self) -> u8 {
        match self {
            Direction::Incoming => Self::INCOMING_BIT,
            Direction::Outgoing => Self::OUTGOING_BIT,
            Direction::All => Self::INCOMING_BIT | Self::OUTGOING_BIT,
        }
    }

    pub fn includes_incoming(self) -> bool {
        self.bits() & Self::INCOMING_BIT != 0
    }

    pub fn includes_outgoing(self) -> bool {
        self.bits() & Self::OUTGOING_BIT != 0
    }
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "i" | "in" | "incoming" => Ok(Direction::Incoming),
            "o" | "out" | "outgoing" => Ok(Direction::Outgoing),
            "a" | "all" | "both" => Ok(Direction::All),
            _ => anyhow::bail!("Invalid direction: {}", s),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Incoming => f.write_str("incoming"),
            Direction::Outgoing => f.write_str("outgoing"),
            Direction::All => f.write_str("all"),
        }
    }
}

/// Installation filter, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub direction: Direction,

    /// Shell-style wildcard pattern matched against the connection name
    pub channel_pattern: String,
}

impl Filter {
    pub fn new(direction: Direction, channel_pattern: impl Into<String>) -> Self {
        Self {
            direction,
            channel_pattern: channel_pattern.into(),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(Direction::All, "*")
    }
}

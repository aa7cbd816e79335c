//! Configuration types for the interception agent
//!
//! Precedence, lowest first: defaults, an optional TOML file, `XPCSPY_*`
//! environment variables, explicit command-line flags.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use xpcspy_shared::types::filter::{Direction, Filter};

use crate::filter::ChannelMatcher;

pub const ENV_DIRECTION: &str = "XPCSPY_DIRECTION";
pub const ENV_PATTERN: &str = "XPCSPY_PATTERN";
pub const ENV_NO_PARSE: &str = "XPCSPY_NO_PARSE";

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Which side of each connection to intercept
    pub direction: Direction,

    /// Wildcard pattern for connection names
    pub channel_pattern: String,

    /// Decode embedded binary property lists
    pub should_decode: bool,

    /// Write records here instead of stdout
    pub output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            direction: Direction::All,
            channel_pattern: "*".to_string(),
            should_decode: true,
            output: None,
        }
    }
}

impl Config {
    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("Failed to parse configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Layer `XPCSPY_*` variables from the process environment.
    pub fn with_env(self) -> anyhow::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Layer overrides from an arbitrary variable lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(direction) = lookup(ENV_DIRECTION) {
            self.direction = direction
                .parse()
                .with_context(|| format!("{} is invalid", ENV_DIRECTION))?;
        }
        if let Some(pattern) = lookup(ENV_PATTERN) {
            self.channel_pattern = pattern;
        }
        if let Some(no_parse) = lookup(ENV_NO_PARSE) {
            self.should_decode = !is_truthy(&no_parse);
        }
        Ok(self)
    }

    /// Installation filter derived from this configuration
    pub fn filter(&self) -> Filter {
        Filter::new(self.direction, self.channel_pattern.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channel_pattern.is_empty() {
            anyhow::bail!("Channel pattern must not be empty (use '*' to match everything)");
        }

        ChannelMatcher::new(&self.channel_pattern)?;

        if let Some(output) = &self.output {
            if output.as_os_str().is_empty() {
                anyhow::bail!("Output path must not be empty");
            }
        }

        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

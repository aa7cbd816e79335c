//! Channel filter
//!
//! Shell-style wildcard patterns (`com.apple.*`) compiled once at installation
//! and tested against connection names on every intercepted call.

use regex::Regex;

use crate::error::AgentError;

const WILDCARD: char = '*';

/// Compiled channel-name pattern
#[derive(Debug, Clone)]
pub struct ChannelMatcher {
    /// `None` when the pattern matches every name
    regex: Option<Regex>,
}

impl ChannelMatcher {
    pub fn new(pattern: &str) -> Result<Self, AgentError> {
        if !pattern.is_empty() && pattern.chars().all(|c| c == WILDCARD) {
            return Ok(Self { regex: None });
        }

        let regex = Regex::new(&wildcard_to_regex(pattern)).map_err(|source| AgentError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self { regex: Some(regex) })
    }

    /// True when every name matches, so the name lookup can be skipped.
    pub fn matches_all(&self) -> bool {
        self.regex.is_none()
    }

    pub fn matches(&self, channel_name: &str) -> bool {
        match &self.regex {
            None => true,
            Some(regex) => regex.is_match(channel_name),
        }
    }
}

/// Translate a wildcard pattern into an anchored regular expression.
///
/// Every metacharacter except the wildcard is escaped; each wildcard becomes a
/// lazy `.*?`.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let body = pattern
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*?");
    format!("(?s)^{}$", body)
}

/// One-shot match, compiling the pattern each time
pub fn matches(channel_name: &str, pattern: &str) -> bool {
    ChannelMatcher::new(pattern)
        .map(|m| m.matches(channel_name))
        .unwrap_or(false)
}

//! Wire protocol for agent-to-host communication.
//!
//! Each host record travels inside an [`Envelope`] serialized as a single JSON
//! line. The sequence number is assigned by the transport writer in send order
//! and is informational only: data records are correlated by timestamp, never
//! by sequence.

use crate::types::events::HostMessage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Wire message envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub sequence: u64,
    pub record: HostMessage,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(sequence: u64, record: HostMessage) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequence,
            record,
        }
    }

    /// Serialize to one JSON line (without the trailing newline).
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize envelope")
    }

    /// Parse one JSON line, validating the protocol version.
    ///
    /// A bare record without an envelope is also accepted and given sequence 0,
    /// so traces written by older hosts still load.
    pub fn from_line(line: &str) -> Result<Self> {
        let line = line.trim();
        if let Ok(envelope) = serde_json::from_str::<Self>(line) {
            if envelope.version != PROTOCOL_VERSION {
                anyhow::bail!(
                    "unsupported protocol version {} (expected {})",
                    envelope.version,
                    PROTOCOL_VERSION
                );
            }
            return Ok(envelope);
        }
        let record: HostMessage =
            serde_json::from_str(line).context("failed to decode envelope or bare record")?;
        Ok(Self::new(0, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::events::SymbolEvent;

    #[test]
    fn test_roundtrip() {
        let envelope = Envelope::new(
            3,
            HostMessage::Symbol(SymbolEvent {
                timestamp: 10,
                symbolic_name: "xpc_connection_send_notification".to_string(),
            }),
        );
        let line = envelope.to_line().unwrap();
        assert!(!line.contains('\n'));

        let decoded = Envelope::from_line(&line).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_bare_record_fallback() {
        let decoded = Envelope::from_line(r#"{"type":"agent:hooks_installed"}"#).unwrap();
        assert_eq!(decoded.sequence, 0);
        assert_eq!(decoded.record, HostMessage::HooksInstalled);
    }

    #[test]
    fn test_version_mismatch_fails() {
        let line = r#"{"version":9,"sequence":1,"record":{"type":"agent:hooks_installed"}}"#;
        assert!(Envelope::from_line(line).is_err());
    }

    #[test]
    fn test_garbage_fails() {
        assert!(Envelope::from_line("not json").is_err());
    }
}

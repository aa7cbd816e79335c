//! Trace event definitions
//!
//! Every admitted call produces a [`SymbolEvent`] as soon as the probe fires
//! and, once introspection finishes, a [`DataEvent`] carrying the same
//! timestamp. The host pairs the two by timestamp because data events may
//! arrive out of call order.

use serde::{Deserialize, Serialize};

/// Monotonic timestamp in nanoseconds, shared by the two records of a call
pub type Timestamp = u64;

/// Sent immediately on hook entry, before any decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEvent {
    pub timestamp: Timestamp,

    /// Name of the intercepted entry point
    pub symbolic_name: String,
}

/// Sent after introspection and decoding complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEvent {
    pub timestamp: Timestamp,

    /// Debug description of the connection object
    pub connection_description: String,

    /// Debug description of the message, with decoded payloads spliced in
    pub message_description: String,
}

/// Either half of a traced call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    Symbol(SymbolEvent),
    Data(DataEvent),
}

impl TraceEvent {
    /// Get the correlation timestamp of either event
    pub fn timestamp(&self) -> Timestamp {
        match self {
            TraceEvent::Symbol(e) => e.timestamp,
            TraceEvent::Data(e) => e.timestamp,
        }
    }
}

/// Record delivered to the controlling process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "agent:hooks_installed")]
    HooksInstalled,

    #[serde(rename = "agent:trace:symbol")]
    Symbol(SymbolEvent),

    #[serde(rename = "agent:trace:data")]
    Data(DataEvent),
}

impl From<TraceEvent> for HostMessage {
    fn from(event: TraceEvent) -> Self {
        match event {
            TraceEvent::Symbol(e) => HostMessage::Symbol(e),
            TraceEvent::Data(e) => HostMessage::Data(e),
        }
    }
}

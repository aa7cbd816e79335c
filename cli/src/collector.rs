//! Host-side pairing of trace records
//!
//! The agent sends a call's symbol record on entry and its data record once
//! decoding finishes, both stamped with the same timestamp. Data records can
//! overtake each other, and two calls can share a timestamp, so pending symbol
//! names are queued per timestamp and handed out first-in first-out.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::warn;
use xpcspy_shared::types::events::{DataEvent, HostMessage, SymbolEvent, Timestamp};

/// One fully reassembled intercepted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub timestamp: Timestamp,
    pub symbol: String,
    pub connection_description: String,
    pub message_description: String,
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<Timestamp, VecDeque<String>>,
    hooks_installed: bool,
    unmatched: usize,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one record; returns an invocation once its data record arrives.
    pub fn feed(&mut self, message: HostMessage) -> Option<Invocation> {
        match message {
            HostMessage::HooksInstalled => {
                self.hooks_installed = true;
                None
            }
            HostMessage::Symbol(event) => {
                self.push_symbol(event);
                None
            }
            HostMessage::Data(event) => self.complete(event),
        }
    }

    fn push_symbol(&mut self, event: SymbolEvent) {
        self.pending
            .entry(event.timestamp)
            .or_default()
            .push_back(event.symbolic_name);
    }

    fn complete(&mut self, event: DataEvent) -> Option<Invocation> {
        let queue = self.pending.get_mut(&event.timestamp);
        let symbol = queue.and_then(|q| q.pop_front());

        let Some(symbol) = symbol else {
            warn!("Data record at {} has no matching symbol", event.timestamp);
            self.unmatched += 1;
            return None;
        };

        if self
            .pending
            .get(&event.timestamp)
            .is_some_and(|q| q.is_empty())
        {
            self.pending.remove(&event.timestamp);
        }

        Some(Invocation {
            timestamp: event.timestamp,
            symbol,
            connection_description: event.connection_description,
            message_description: event.message_description,
        })
    }

    pub fn hooks_installed(&self) -> bool {
        self.hooks_installed
    }

    /// Symbol records still waiting for data
    pub fn pending(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    /// Data records that arrived without a symbol
    pub fn unmatched(&self) -> usize {
        self.unmatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(timestamp: u64, name: &str) -> HostMessage {
        HostMessage::Symbol(SymbolEvent {
            timestamp,
            symbolic_name: name.to_string(),
        })
    }

    fn data(timestamp: u64, message: &str) -> HostMessage {
        HostMessage::Data(DataEvent {
            timestamp,
            connection_description: "<connection>".to_string(),
            message_description: message.to_string(),
        })
    }

    #[test]
    fn test_pairs_out_of_order_data() {
        let mut correlator = Correlator::new();
        assert!(correlator.feed(HostMessage::HooksInstalled).is_none());
        assert!(correlator.hooks_installed());

        correlator.feed(symbol(1, "send"));
        correlator.feed(symbol(2, "reply"));
        assert_eq!(correlator.pending(), 2);

        let second = correlator.feed(data(2, "b")).unwrap();
        assert_eq!(second.symbol, "reply");
        let first = correlator.feed(data(1, "a")).unwrap();
        assert_eq!(first.symbol, "send");
        assert_eq!(first.message_description, "a");
        assert_eq!(correlator.pending(), 0);
    }

    #[test]
    fn test_colliding_timestamps_are_fifo() {
        let mut correlator = Correlator::new();
        correlator.feed(symbol(5, "first"));
        correlator.feed(symbol(5, "second"));

        assert_eq!(correlator.feed(data(5, "x")).unwrap().symbol, "first");
        assert_eq!(correlator.feed(data(5, "y")).unwrap().symbol, "second");
    }

    #[test]
    fn test_orphan_data_is_counted() {
        let mut correlator = Correlator::new();
        assert!(correlator.feed(data(9, "lost")).is_none());
        assert_eq!(correlator.unmatched(), 1);
    }
}

//! Per-call handling
//!
//! Every installed probe funnels into [`CallHandler`]. For an admitted call
//! the symbol record goes out first, then the connection and message are
//! described, the message payload decoded and the data record sent with the
//! same timestamp.

use std::sync::Arc;

use tracing::{debug, warn};
use xpcspy_shared::types::events::{DataEvent, SymbolEvent, Timestamp, TraceEvent};
use xpcspy_shared::utils::time::monotonic_nanos;

use crate::decoder;
use crate::emitter::EventSink;
use crate::error::AgentError;
use crate::filter::ChannelMatcher;
use crate::formatter;
use crate::hooks::Probe;
use crate::runtime::{self, Handle, Kind, TargetRuntime};

/// The two arguments every intercepted entry point starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallArgs {
    pub connection: Handle,
    pub message: Handle,
}

impl CallArgs {
    /// Take the first two argument registers. Missing registers read as null.
    pub fn from_raw(args: &[u64]) -> Self {
        let arg = |i: usize| Handle(args.get(i).copied().unwrap_or(0));
        Self {
            connection: arg(0),
            message: arg(1),
        }
    }
}

/// Shared, immutable state behind every probe of a session
pub struct CallHandler {
    runtime: Arc<dyn TargetRuntime>,
    sink: Arc<dyn EventSink>,
    matcher: ChannelMatcher,
    should_decode: bool,
}

impl CallHandler {
    pub fn new(
        runtime: Arc<dyn TargetRuntime>,
        sink: Arc<dyn EventSink>,
        matcher: ChannelMatcher,
        should_decode: bool,
    ) -> Self {
        Self {
            runtime,
            sink,
            matcher,
            should_decode,
        }
    }

    /// Apply the channel filter and stamp the call.
    ///
    /// Connections without a name only pass a match-all pattern.
    pub fn admit(&self, symbol: &str, args: CallArgs) -> Result<Option<SymbolEvent>, AgentError> {
        if !self.matcher.matches_all() {
            let admitted = match self.runtime.connection_name(args.connection)? {
                Some(name) => self.matcher.matches(&name),
                None => false,
            };
            if !admitted {
                return Ok(None);
            }
        }

        Ok(Some(SymbolEvent {
            timestamp: monotonic_nanos(),
            symbolic_name: symbol.to_string(),
        }))
    }

    /// Describe the call's objects, splicing decoded payloads into the message.
    pub fn describe(&self, timestamp: Timestamp, args: CallArgs) -> Result<DataEvent, AgentError> {
        let connection_description = self.runtime.debug_description(args.connection)?;
        let message = runtime::classify(&*self.runtime, args.message)?;

        let mut message_description = message.description;
        if self.should_decode && message.kind == Kind::Dictionary {
            let results = decoder::decode_dictionary(&*self.runtime, args.message)?;
            if !results.is_empty() {
                debug!("Decoded {} payload(s) at {}", results.len(), timestamp);
                message_description = formatter::merge(&message_description, &results);
            }
        }

        Ok(DataEvent {
            timestamp,
            connection_description,
            message_description,
        })
    }

    /// Both records of a call, without emitting anything.
    pub fn process_call(
        &self,
        symbol: &str,
        args: CallArgs,
    ) -> Result<Option<(SymbolEvent, DataEvent)>, AgentError> {
        let Some(symbol_event) = self.admit(symbol, args)? else {
            return Ok(None);
        };
        let data_event = self.describe(symbol_event.timestamp, args)?;
        Ok(Some((symbol_event, data_event)))
    }

    /// Probe entry point. Failures are contained to this call.
    pub fn handle(&self, symbol: &str, args: CallArgs) {
        let symbol_event = match self.admit(symbol, args) {
            Ok(Some(event)) => TraceEvent::Symbol(event),
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping {} call on {}: {}", symbol, args.connection, e);
                return;
            }
        };

        let timestamp = symbol_event.timestamp();
        debug!("{} at {}", symbol, timestamp);
        self.sink.emit(symbol_event);

        match self.describe(timestamp, args) {
            Ok(data_event) => self.sink.emit(TraceEvent::Data(data_event)),
            Err(e) => warn!("No data for {} call at {}: {}", symbol, timestamp, e),
        }
    }
}

/// Probe bound to one intercepted symbol
pub struct HookProbe {
    symbol: &'static str,
    handler: Arc<CallHandler>,
}

impl HookProbe {
    pub fn new(symbol: &'static str, handler: Arc<CallHandler>) -> Self {
        Self { symbol, handler }
    }
}

impl Probe for HookProbe {
    fn on_enter(&self, args: &[u64]) {
        self.handler.handle(self.symbol, CallArgs::from_raw(args));
    }
}

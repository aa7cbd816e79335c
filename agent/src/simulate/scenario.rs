//! Recorded sessions
//!
//! A scenario describes a target's traffic as JSON: the connections, the
//! messages sent over them and the entry point each one went through.
//! Replaying it builds a [`SimulatedProcess`], installs the agent's hooks and
//! fires every call in order.
//!
//! ```json
//! {
//!   "filter": { "direction": "outgoing", "channelPattern": "com.example.*" },
//!   "calls": [{
//!     "symbol": "xpc_connection_send_message",
//!     "connection": { "name": "com.example.sync", "pid": 412 },
//!     "message": { "type": "dictionary", "entries": {
//!       "status": { "type": "string", "value": "ok" }
//!     }}
//!   }]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use xpcspy_shared::types::filter::Filter;
use xpcspy_shared::utils::hex_to_bytes;

use super::SimulatedProcess;
use crate::emitter::EventSink;
use crate::runtime::Handle;
use crate::session::InstrumentationSession;

/// A message value inside the simulated process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Value {
    Dictionary {
        #[serde(default)]
        entries: BTreeMap<String, Value>,
    },
    Data {
        /// Raw bytes in hex
        hex: String,
        /// What the bplist15 primitive returns for these bytes
        #[serde(default, rename = "decodesTo")]
        decodes_to: Option<String>,
    },
    String {
        value: String,
    },
    Int64 {
        value: i64,
    },
    Bool {
        value: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// Absent for peer connections
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub symbol: String,
    pub connection: ConnectionSpec,
    pub message: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Filter recorded with the session; callers may override it
    #[serde(default)]
    pub filter: Option<Filter>,

    #[serde(default)]
    pub calls: Vec<Call>,
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub installed: Vec<&'static str>,
    /// Calls that reached at least one probe
    pub intercepted: usize,
    pub total: usize,
}

/// Argument registers of one call, ready to fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub symbol: String,
    pub args: [u64; 2],
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse scenario")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid scenario: {}", path.display()))
    }

    /// Materialize every object into a fresh process.
    pub fn build(&self) -> Result<(SimulatedProcess, Vec<PreparedCall>)> {
        let mut process = SimulatedProcess::new();
        let mut connections: BTreeMap<(Option<String>, u32), Handle> = BTreeMap::new();
        let mut prepared = Vec::with_capacity(self.calls.len());

        for (i, call) in self.calls.iter().enumerate() {
            let id = (call.connection.name.clone(), call.connection.pid);
            let connection = *connections
                .entry(id)
                .or_insert_with(|| process.add_connection(call.connection.name.as_deref(), call.connection.pid));
            let message = add_value(&mut process, &call.message)
                .with_context(|| format!("call {} ({})", i, call.symbol))?;

            prepared.push(PreparedCall {
                symbol: call.symbol.clone(),
                args: [connection.0, message.0],
            });
        }

        Ok((process, prepared))
    }

    /// Install the agent's hooks in a simulated process and fire every call
    /// in order on the current thread.
    pub fn replay(
        &self,
        filter: &Filter,
        should_decode: bool,
        sink: Arc<dyn EventSink>,
    ) -> Result<ReplaySummary> {
        let (process, calls) = self.build()?;
        let process = Arc::new(process);

        let result = Self::fire_all(&process, &calls, filter, should_decode, sink);
        let detached = process.detach_all();
        debug!("Detached {} probes", detached);
        result
    }

    fn fire_all(
        process: &Arc<SimulatedProcess>,
        calls: &[PreparedCall],
        filter: &Filter,
        should_decode: bool,
        sink: Arc<dyn EventSink>,
    ) -> Result<ReplaySummary> {
        let session = InstrumentationSession::init(&**process, process.clone(), sink)
            .context("Failed to initialize instrumentation session")?;
        let installed = session
            .install_hooks(&**process, filter, should_decode)
            .context("Failed to install hooks")?;

        let mut intercepted = 0;
        for call in calls {
            let fired = process.fire(&call.symbol, &call.args);
            if fired == 0 {
                debug!("{} is not hooked, skipping", call.symbol);
            } else {
                intercepted += 1;
            }
        }

        info!("Replayed {} calls ({} intercepted)", calls.len(), intercepted);

        Ok(ReplaySummary {
            installed,
            intercepted,
            total: calls.len(),
        })
    }
}

fn add_value(process: &mut SimulatedProcess, value: &Value) -> Result<Handle> {
    Ok(match value {
        Value::Dictionary { entries } => {
            let mut children = Vec::with_capacity(entries.len());
            for (key, child) in entries {
                let handle = add_value(process, child).with_context(|| format!("key '{}'", key))?;
                children.push((key.clone(), handle));
            }
            process.add_dictionary(children)
        }
        Value::Data { hex, decodes_to } => {
            let bytes = hex_to_bytes(hex)?;
            if let Some(description) = decodes_to {
                process.register_plist15(&bytes, description);
            }
            process.add_data(&bytes)
        }
        Value::String { value } => process.add_string(value),
        Value::Int64 { value } => process.add_int64(*value),
        Value::Bool { value } => process.add_bool(*value),
    })
}

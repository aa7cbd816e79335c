//! Simulated target process
//!
//! An in-memory object graph standing in for a live XPC process. It plays all
//! three host roles at once (symbol lookup, interception, object runtime), so
//! the agent's real code path can run without an instrumentation toolkit.
//! Descriptions imitate the shape libxpc prints: one dictionary entry per line.

pub mod scenario;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use xpcspy_shared::types::filter::Direction;
use xpcspy_shared::utils::bytes_to_hex;

use crate::error::AgentError;
use crate::hooks::{hook_symbols, HookDescriptor, Interceptor, Probe, SymbolResolver, LIBXPC};
use crate::runtime::{
    ForeignBuffer, Handle, KnownTypes, MemoryReader, RuntimeError, TargetRuntime, TypeTag,
};

pub use scenario::Scenario;

const DICTIONARY_TAG: TypeTag = TypeTag(0x1f00_0001);
const DATA_TAG: TypeTag = TypeTag(0x1f00_0002);
const CONNECTION_TAG: TypeTag = TypeTag(0x1f00_0003);
const STRING_TAG: TypeTag = TypeTag(0x1f00_0004);
const INT64_TAG: TypeTag = TypeTag(0x1f00_0005);
const BOOL_TAG: TypeTag = TypeTag(0x1f00_0006);
const PLIST_TAG: TypeTag = TypeTag(0x1f00_0007);

const FIRST_HANDLE: u64 = 0x6000_0000_1000;
const HANDLE_STRIDE: u64 = 0x40;
const FIRST_ADDRESS: u64 = 0x7000_0000_0000;
const PAGE: u64 = 0x1000;
const FIRST_SYMBOL: u64 = 0x1_8000_0000;

/// Bytes of a data object shown before the description is elided
const DATA_PREVIEW: usize = 8;

#[derive(Debug, Clone)]
enum Object {
    Connection { name: Option<String>, pid: u32 },
    Dictionary(Vec<(String, Handle)>),
    Data(ForeignBuffer),
    String(String),
    Int64(i64),
    Bool(bool),
    /// Result of the bplist15 primitive; carries its own description
    Document(String),
}

#[derive(Debug)]
struct Region {
    address: u64,
    bytes: Vec<u8>,
}

type Attached = (&'static str, Arc<dyn Probe>);

pub struct SimulatedProcess {
    objects: HashMap<Handle, Object>,
    regions: Vec<Region>,
    plist15: HashMap<Vec<u8>, Handle>,
    exports: HashMap<&'static str, u64>,
    debug_symbols: HashMap<&'static str, u64>,
    attached: Mutex<Vec<Attached>>,
    next_handle: u64,
    next_address: u64,
}

impl fmt::Debug for SimulatedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedProcess")
            .field("objects", &self.objects.len())
            .field("regions", &self.regions.len())
            .field("attached", &self.attached_symbols())
            .finish()
    }
}

impl Default for SimulatedProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProcess {
    /// Empty process exporting every hooked symbol
    pub fn new() -> Self {
        let mut exports = HashMap::new();
        let mut debug_symbols = HashMap::new();
        for (i, (name, direction)) in hook_symbols().enumerate() {
            let address = FIRST_SYMBOL + i as u64 * HANDLE_STRIDE;
            match direction {
                Direction::Incoming => debug_symbols.insert(name, address),
                _ => exports.insert(name, address),
            };
        }

        Self {
            objects: HashMap::new(),
            regions: Vec::new(),
            plist15: HashMap::new(),
            exports,
            debug_symbols,
            attached: Mutex::new(Vec::new()),
            next_handle: FIRST_HANDLE,
            next_address: FIRST_ADDRESS,
        }
    }

    /// Drop a symbol, as if the target's libxpc lacked it
    pub fn without_symbol(mut self, name: &str) -> Self {
        self.exports.retain(|k, _| *k != name);
        self.debug_symbols.retain(|k, _| *k != name);
        self
    }

    fn insert(&mut self, object: Object) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += HANDLE_STRIDE;
        self.objects.insert(handle, object);
        handle
    }

    pub fn add_connection(&mut self, name: Option<&str>, pid: u32) -> Handle {
        self.insert(Object::Connection {
            name: name.map(str::to_string),
            pid,
        })
    }

    /// Entries must refer to objects that already exist, so the graph stays
    /// acyclic.
    pub fn add_dictionary(&mut self, entries: Vec<(String, Handle)>) -> Handle {
        self.insert(Object::Dictionary(entries))
    }

    pub fn add_data(&mut self, bytes: &[u8]) -> Handle {
        let address = self.next_address;
        let span = (bytes.len() as u64 / PAGE + 1) * PAGE;
        self.next_address += span;
        self.regions.push(Region {
            address,
            bytes: bytes.to_vec(),
        });
        self.insert(Object::Data(ForeignBuffer::new(address, bytes.len())))
    }

    pub fn add_string(&mut self, value: &str) -> Handle {
        self.insert(Object::String(value.to_string()))
    }

    pub fn add_int64(&mut self, value: i64) -> Handle {
        self.insert(Object::Int64(value))
    }

    pub fn add_bool(&mut self, value: bool) -> Handle {
        self.insert(Object::Bool(value))
    }

    /// Teach the bplist15 primitive what `bytes` decodes to. Unregistered
    /// payloads are rejected with a null result.
    pub fn register_plist15(&mut self, bytes: &[u8], description: &str) {
        let document = self.insert(Object::Document(description.to_string()));
        self.plist15.insert(bytes.to_vec(), document);
    }

    /// Run every probe attached to `symbol` on the calling thread; returns how
    /// many ran.
    pub fn fire(&self, symbol: &str, args: &[u64]) -> usize {
        let probes: Vec<Arc<dyn Probe>> = self
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(name, _)| *name == symbol)
            .map(|(_, probe)| Arc::clone(probe))
            .collect();

        for probe in &probes {
            probe.on_enter(args);
        }
        probes.len()
    }

    /// Symbols with at least one probe, in attachment order
    pub fn attached_symbols(&self) -> Vec<&'static str> {
        self.attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(name, _)| *name)
            .collect()
    }

    /// Remove every probe. Probes hold the session's handler, which holds
    /// this process, so a process that is never detached is never freed.
    pub fn detach_all(&self) -> usize {
        let mut attached = self
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = attached.len();
        attached.clear();
        count
    }

    fn object(&self, handle: Handle) -> Result<&Object, RuntimeError> {
        self.objects
            .get(&handle)
            .ok_or(RuntimeError::InvalidHandle(handle))
    }

    fn describe(&self, handle: Handle, depth: usize, out: &mut String) -> Result<(), RuntimeError> {
        match self.object(handle)? {
            Object::Connection { name, pid } => {
                out.push_str(&format!(
                    "<connection: {}> {{ name = {}, listener = false, pid = {}, euid = 501, egid = 20, asid = 100009 }}",
                    handle,
                    name.as_deref().unwrap_or("(anonymous)"),
                    pid
                ));
            }
            Object::Dictionary(entries) => {
                out.push_str(&format!(
                    "<dictionary: {}> {{ count = {}, transaction: 0, voucher = 0x0, contents =\n",
                    handle,
                    entries.len()
                ));
                for (key, value) in entries {
                    out.push_str(&"\t".repeat(depth + 1));
                    out.push_str(&format!("\"{}\" => ", key));
                    self.describe(*value, depth + 1, out)?;
                    out.push('\n');
                }
                out.push_str(&"\t".repeat(depth));
                out.push('}');
            }
            Object::Data(buffer) => {
                let bytes = buffer.to_vec(self)?;
                let shown = &bytes[..bytes.len().min(DATA_PREVIEW)];
                let ellipsis = if bytes.len() > DATA_PREVIEW { "..." } else { "" };
                out.push_str(&format!(
                    "<data: {}>: {{ length = {} bytes, contents = 0x{}{} }}",
                    handle,
                    bytes.len(),
                    bytes_to_hex(shown),
                    ellipsis
                ));
            }
            Object::String(value) => {
                out.push_str(&format!(
                    "<string: {}> {{ length = {}, contents = \"{}\" }}",
                    handle,
                    value.len(),
                    value
                ));
            }
            Object::Int64(value) => {
                out.push_str(&format!("<int64: {}>: {}", handle, value));
            }
            Object::Bool(value) => {
                out.push_str(&format!("<bool: {}>: {}", handle, value));
            }
            Object::Document(text) => out.push_str(text),
        }
        Ok(())
    }
}

impl MemoryReader for SimulatedProcess {
    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>, RuntimeError> {
        let fail = RuntimeError::MemoryRead { address, len };
        let region = self
            .regions
            .iter()
            .find(|r| address >= r.address && address - r.address < r.bytes.len() as u64)
            .ok_or(fail.clone())?;
        let start = (address - region.address) as usize;
        region
            .bytes
            .get(start..start.checked_add(len).ok_or(fail.clone())?)
            .map(<[u8]>::to_vec)
            .ok_or(fail)
    }
}

impl TargetRuntime for SimulatedProcess {
    fn known_types(&self) -> KnownTypes {
        KnownTypes {
            dictionary: DICTIONARY_TAG,
            data: DATA_TAG,
        }
    }

    fn type_of(&self, handle: Handle) -> Result<TypeTag, RuntimeError> {
        Ok(match self.object(handle)? {
            Object::Connection { .. } => CONNECTION_TAG,
            Object::Dictionary(_) => DICTIONARY_TAG,
            Object::Data(_) => DATA_TAG,
            Object::String(_) => STRING_TAG,
            Object::Int64(_) => INT64_TAG,
            Object::Bool(_) => BOOL_TAG,
            Object::Document(_) => PLIST_TAG,
        })
    }

    fn debug_description(&self, handle: Handle) -> Result<String, RuntimeError> {
        let mut out = String::new();
        self.describe(handle, 0, &mut out)?;
        Ok(match self.object(handle)? {
            Object::Connection { .. } => format!("<OS_xpc_connection: {}>", out),
            Object::Dictionary(_) => format!("<OS_xpc_dictionary: {}>", out),
            Object::Data(_) => format!("<OS_xpc_data: {}>", out),
            _ => out,
        })
    }

    fn connection_name(&self, connection: Handle) -> Result<Option<String>, RuntimeError> {
        match self.object(connection)? {
            Object::Connection { name, .. } => Ok(name.clone()),
            _ => Err(RuntimeError::WrongType {
                handle: connection,
                expected: "connection",
            }),
        }
    }

    fn dictionary_entries(&self, dictionary: Handle) -> Result<Vec<(String, Handle)>, RuntimeError> {
        match self.object(dictionary)? {
            Object::Dictionary(entries) => Ok(entries.clone()),
            _ => Err(RuntimeError::WrongType {
                handle: dictionary,
                expected: "dictionary",
            }),
        }
    }

    fn data_buffer(&self, data: Handle) -> Result<ForeignBuffer, RuntimeError> {
        match self.object(data)? {
            Object::Data(buffer) => Ok(*buffer),
            _ => Err(RuntimeError::WrongType {
                handle: data,
                expected: "data object",
            }),
        }
    }

    fn create_binary_plist15(
        &self,
        buffer: &ForeignBuffer,
        _options: Handle,
    ) -> Result<Handle, RuntimeError> {
        let bytes = buffer.to_vec(self)?;
        Ok(self.plist15.get(&bytes).copied().unwrap_or(Handle::NULL))
    }
}

impl SymbolResolver for SimulatedProcess {
    fn find_export(&self, module: &str, name: &str) -> Option<u64> {
        if module != LIBXPC {
            return None;
        }
        self.exports.get(name).copied()
    }

    fn find_debug_symbol(&self, name: &str) -> Option<u64> {
        self.debug_symbols.get(name).copied()
    }
}

impl Interceptor for SimulatedProcess {
    fn attach(&self, hook: &HookDescriptor, probe: Arc<dyn Probe>) -> Result<(), AgentError> {
        let known = self
            .exports
            .get(hook.symbol_name)
            .or_else(|| self.debug_symbols.get(hook.symbol_name));
        if known != Some(&hook.entry_address) {
            return Err(AgentError::Attach {
                symbol: hook.symbol_name.to_string(),
                reason: format!("no function at {:#x}", hook.entry_address),
            });
        }

        self.attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((hook.symbol_name, probe));
        Ok(())
    }
}

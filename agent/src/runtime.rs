//! Target runtime abstraction and object introspection
//!
//! The agent never dereferences target memory directly. Everything it learns
//! about an intercepted object goes through [`TargetRuntime`]: the runtime's own
//! debug description, a type tag compared against the two tags the agent
//! cares about, and bounds-checked copies of data buffers.

use std::fmt;

use thiserror::Error;

/// Opaque address of a runtime object inside the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Runtime type identity of an object (the address of its class/type object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub u64);

/// Coarse classification used to dispatch the payload walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Dictionary,
    BinaryBlob,
    Other,
}

/// The two type tags the agent compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownTypes {
    pub dictionary: TypeTag,
    pub data: TypeTag,
}

impl KnownTypes {
    pub fn kind_of(&self, tag: TypeTag) -> Kind {
        if tag == self.dictionary {
            Kind::Dictionary
        } else if tag == self.data {
            Kind::BinaryBlob
        } else {
            Kind::Other
        }
    }
}

/// Result of [`classify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: Kind,
    pub description: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("invalid object handle {0}")]
    InvalidHandle(Handle),

    #[error("object {handle} is not a {expected}")]
    WrongType {
        handle: Handle,
        expected: &'static str,
    },

    #[error("memory read of {len} bytes at {address:#x} failed")]
    MemoryRead { address: u64, len: usize },

    #[error("read of {len} bytes at offset {offset} exceeds buffer of {length} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        length: usize,
    },
}

/// Raw read access to target memory
pub trait MemoryReader {
    /// Copy `len` bytes starting at `address`.
    fn read_memory(&self, address: u64, len: usize) -> Result<Vec<u8>, RuntimeError>;
}

/// A byte range in target memory with bounds-checked reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignBuffer {
    address: u64,
    length: usize,
}

impl ForeignBuffer {
    pub fn new(address: u64, length: usize) -> Self {
        Self { address, length }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Copy `len` bytes starting `offset` bytes into the buffer.
    pub fn read(
        &self,
        memory: &(impl MemoryReader + ?Sized),
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, RuntimeError> {
        let out_of_bounds = RuntimeError::OutOfBounds {
            offset,
            len,
            length: self.length,
        };
        let end = offset.checked_add(len).ok_or(out_of_bounds.clone())?;
        if end > self.length {
            return Err(out_of_bounds);
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        memory.read_memory(self.address + offset as u64, len)
    }

    /// The first `len` bytes, or `None` when the buffer is shorter.
    pub fn prefix(
        &self,
        memory: &(impl MemoryReader + ?Sized),
        len: usize,
    ) -> Result<Option<Vec<u8>>, RuntimeError> {
        if self.length < len {
            return Ok(None);
        }
        self.read(memory, 0, len).map(Some)
    }

    /// Copy the whole buffer.
    pub fn to_vec(&self, memory: &(impl MemoryReader + ?Sized)) -> Result<Vec<u8>, RuntimeError> {
        self.read(memory, 0, self.length)
    }
}

/// Capabilities the instrumentation host exposes for the target's object model.
///
/// Implementations must be callable from any thread: probes run on whichever
/// thread triggered the intercepted call.
pub trait TargetRuntime: MemoryReader + Send + Sync {
    fn known_types(&self) -> KnownTypes;

    /// Type identity of an object
    fn type_of(&self, handle: Handle) -> Result<TypeTag, RuntimeError>;

    /// The runtime's own debug description of an object
    fn debug_description(&self, handle: Handle) -> Result<String, RuntimeError>;

    /// Service name of a connection; peer connections have none
    fn connection_name(&self, connection: Handle) -> Result<Option<String>, RuntimeError>;

    /// Key/value pairs of a dictionary in whatever order the runtime yields them
    fn dictionary_entries(&self, dictionary: Handle) -> Result<Vec<(String, Handle)>, RuntimeError>;

    /// Location and length of a data object's bytes
    fn data_buffer(&self, data: Handle) -> Result<ForeignBuffer, RuntimeError>;

    /// CoreFoundation's private `bplist15` reader. `options` is always
    /// [`Handle::NULL`]; a null result means the payload was rejected.
    fn create_binary_plist15(
        &self,
        buffer: &ForeignBuffer,
        options: Handle,
    ) -> Result<Handle, RuntimeError>;
}

/// Coarse kind of an object, without fetching its description
pub fn kind_of(runtime: &(impl TargetRuntime + ?Sized), handle: Handle) -> Result<Kind, RuntimeError> {
    let tag = runtime.type_of(handle)?;
    Ok(runtime.known_types().kind_of(tag))
}

/// Classify an object and fetch its debug description.
///
/// Errors propagate: an unusable handle aborts processing of the current call.
pub fn classify(
    runtime: &(impl TargetRuntime + ?Sized),
    handle: Handle,
) -> Result<Classified, RuntimeError> {
    let kind = kind_of(runtime, handle)?;
    let description = runtime.debug_description(handle)?;
    Ok(Classified { kind, description })
}

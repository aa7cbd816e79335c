//! Binary property-list decoding
//!
//! Parses `bplist00` documents into a [`Plist`] value tree. Rendering a tree
//! through `Display` yields the same OpenStep-style text Foundation prints for
//! a decoded property list, which is what the agent splices into message
//! descriptions.
//!
//! There is deliberately no writer here.

pub mod binary;
pub mod value;

pub use binary::from_bytes;
pub use value::Plist;

use thiserror::Error;

/// Errors raised while decoding a binary property list
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlistError {
    #[error("missing bplist00 header")]
    BadMagic,

    #[error("document too short ({0} bytes)")]
    TooShort(usize),

    #[error("invalid trailer: {0}")]
    InvalidTrailer(&'static str),

    #[error("read of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds { offset: usize, len: usize },

    #[error("object reference {index} out of range ({count} objects)")]
    BadObjectRef { index: u64, count: u64 },

    #[error("unknown object marker {marker:#04x} at offset {offset}")]
    UnknownMarker { marker: u8, offset: usize },

    #[error("invalid string encoding at offset {0}")]
    InvalidString(usize),

    #[error("dictionary key is not a string")]
    NonStringKey,

    #[error("object {0} references itself")]
    Cycle(u64),

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    #[error("more than {0} object visits")]
    TooLarge(usize),
}

//! Recursive payload decoder
//!
//! Walks an XPC dictionary depth-first looking for data values that carry a
//! binary property list, and turns each one into a [`ParseResult`] keyed by the
//! dictionary key it was stored under.

use thiserror::Error;
use tracing::{debug, trace};
use xpcspy_shared::plist;
use xpcspy_shared::types::payload::{ParseResult, PlistFormat};

use crate::runtime::{self, ForeignBuffer, Handle, Kind, RuntimeError, TargetRuntime};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected a dictionary, found {found:?}")]
    TypeMismatch { found: Kind },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Decode every recognised binary blob reachable from `dictionary`.
///
/// Results from nested dictionaries are appended after the point where the
/// nested dictionary was visited. Blobs with an unknown magic are skipped.
pub fn decode_dictionary(
    runtime: &(impl TargetRuntime + ?Sized),
    dictionary: Handle,
) -> Result<Vec<ParseResult>, DecodeError> {
    let kind = runtime::kind_of(runtime, dictionary)?;
    if kind != Kind::Dictionary {
        return Err(DecodeError::TypeMismatch { found: kind });
    }

    let mut results = Vec::new();
    walk(runtime, dictionary, &mut results)?;
    Ok(results)
}

fn walk(
    runtime: &(impl TargetRuntime + ?Sized),
    dictionary: Handle,
    results: &mut Vec<ParseResult>,
) -> Result<(), DecodeError> {
    for (key, value) in runtime.dictionary_entries(dictionary)? {
        match runtime::kind_of(runtime, value)? {
            Kind::Dictionary => walk(runtime, value, results)?,
            Kind::BinaryBlob => {
                if let Some(result) = decode_blob(runtime, value)? {
                    results.push(result.with_key(key));
                }
            }
            Kind::Other => {}
        }
    }
    Ok(())
}

/// Decode a single data object, or `None` when it is not a known plist.
pub fn decode_blob(
    runtime: &(impl TargetRuntime + ?Sized),
    data: Handle,
) -> Result<Option<ParseResult>, DecodeError> {
    let buffer = runtime.data_buffer(data)?;
    let Some(prefix) = buffer.prefix(runtime, PlistFormat::MAGIC_LEN)? else {
        trace!("Skipping {}-byte blob at {}", buffer.len(), data);
        return Ok(None);
    };

    let Some(format) = PlistFormat::sniff(&prefix) else {
        trace!(
            "Skipping blob at {} with unknown magic {:?}",
            data,
            String::from_utf8_lossy(&prefix)
        );
        return Ok(None);
    };

    let text = match format {
        PlistFormat::Binary15 => decode_binary15(runtime, &buffer)?,
        PlistFormat::Binary00 => decode_binary00(runtime, &buffer)?,
    };

    Ok(text.map(|text| ParseResult::new(format, text)))
}

fn decode_binary15(
    runtime: &(impl TargetRuntime + ?Sized),
    buffer: &ForeignBuffer,
) -> Result<Option<String>, DecodeError> {
    let object = runtime.create_binary_plist15(buffer, Handle::NULL)?;
    if object.is_null() {
        debug!("bplist15 payload of {} bytes was rejected", buffer.len());
        return Ok(None);
    }
    Ok(Some(runtime.debug_description(object)?))
}

fn decode_binary00(
    runtime: &(impl TargetRuntime + ?Sized),
    buffer: &ForeignBuffer,
) -> Result<Option<String>, DecodeError> {
    let bytes = buffer.to_vec(runtime)?;
    match plist::from_bytes(&bytes) {
        Ok(value) => Ok(Some(value.description())),
        Err(e) => {
            debug!("Malformed bplist00 payload of {} bytes: {}", bytes.len(), e);
            Ok(None)
        }
    }
}

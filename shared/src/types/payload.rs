//! Decoded payload types

use serde::{Deserialize, Serialize};

/// Binary property-list encodings the agent knows how to decode.
///
/// `bplist16` shares the `bplist` prefix but has no decoder; blobs carrying
/// it are skipped like any other unknown payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlistFormat {
    /// `bplist15`, decoded through the target's CoreFoundation primitive
    #[serde(rename = "bplist15")]
    Binary15,

    /// `bplist00`, decoded natively
    #[serde(rename = "bplist00")]
    Binary00,
}

impl PlistFormat {
    /// Length of every magic prefix
    pub const MAGIC_LEN: usize = 8;

    pub fn magic(self) -> &'static [u8; Self::MAGIC_LEN] {
        match self {
            PlistFormat::Binary15 => b"bplist15",
            PlistFormat::Binary00 => b"bplist00",
        }
    }

    /// Identify the format from the first eight bytes of a blob
    pub fn sniff(prefix: &[u8]) -> Option<Self> {
        let head = prefix.get(..Self::MAGIC_LEN)?;
        [PlistFormat::Binary15, PlistFormat::Binary00]
            .into_iter()
            .find(|format| head == format.magic())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlistFormat::Binary15 => "bplist15",
            PlistFormat::Binary00 => "bplist00",
        }
    }
}

impl std::fmt::Display for PlistFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded binary blob found while walking a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Dictionary key the blob was stored under (None until the walk fills it in)
    pub key: Option<String>,

    /// Textual description of the decoded document
    pub decoded_text: String,

    pub format: PlistFormat,
}

impl ParseResult {
    pub fn new(format: PlistFormat, decoded_text: impl Into<String>) -> Self {
        Self {
            key: None,
            decoded_text: decoded_text.into(),
            format,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

//! `bplist00` reader
//!
//! Layout: an 8 byte header, the object table, an offset table, and a 32 byte
//! trailer describing the other two. Every read is bounds-checked against the
//! input slice; nothing here trusts lengths or offsets found in the document.

use std::collections::BTreeMap;

use super::value::Plist;
use super::PlistError;

const HEADER: &[u8; 8] = b"bplist00";
const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 32;

/// Containers nested deeper than this are rejected
pub const MAX_DEPTH: usize = 512;

/// Upper bound on object visits, so shared references cannot fan out
/// exponentially
pub const MAX_OBJECT_READS: usize = 1 << 20;

/// Decode a complete `bplist00` document.
pub fn from_bytes(bytes: &[u8]) -> Result<Plist, PlistError> {
    let mut reader = Reader::new(bytes)?;
    let top = reader.trailer.top_object;
    reader.read_object(top, 0)
}

#[derive(Debug, Clone, Copy)]
struct Trailer {
    offset_int_size: usize,
    object_ref_size: usize,
    num_objects: u64,
    top_object: u64,
    offset_table_offset: usize,
}

impl Trailer {
    fn parse(bytes: &[u8]) -> Result<Self, PlistError> {
        let start = bytes.len() - TRAILER_LEN;
        let t = &bytes[start..];

        let offset_int_size = t[6] as usize;
        let object_ref_size = t[7] as usize;
        let num_objects = be_uint(&t[8..16]);
        let top_object = be_uint(&t[16..24]);
        let offset_table_offset = be_uint(&t[24..32]);

        if !(1..=8).contains(&offset_int_size) {
            return Err(PlistError::InvalidTrailer("offset size must be 1-8 bytes"));
        }
        if !(1..=8).contains(&object_ref_size) {
            return Err(PlistError::InvalidTrailer("object reference size must be 1-8 bytes"));
        }
        if num_objects == 0 {
            return Err(PlistError::InvalidTrailer("no objects"));
        }
        if top_object >= num_objects {
            return Err(PlistError::InvalidTrailer("top object out of range"));
        }

        let table_len = num_objects
            .checked_mul(offset_int_size as u64)
            .ok_or(PlistError::InvalidTrailer("offset table overflows"))?;
        let table_end = offset_table_offset
            .checked_add(table_len)
            .ok_or(PlistError::InvalidTrailer("offset table overflows"))?;
        if offset_table_offset < HEADER_LEN as u64 || table_end > start as u64 {
            return Err(PlistError::InvalidTrailer("offset table outside document"));
        }

        Ok(Self {
            offset_int_size,
            object_ref_size,
            num_objects,
            top_object,
            offset_table_offset: offset_table_offset as usize,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    trailer: Trailer,
    /// Objects currently being decoded, for cycle detection
    in_progress: Vec<u64>,
    reads: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self, PlistError> {
        if bytes.len() < HEADER_LEN + TRAILER_LEN {
            return Err(PlistError::TooShort(bytes.len()));
        }
        if &bytes[..HEADER_LEN] != HEADER {
            return Err(PlistError::BadMagic);
        }
        let trailer = Trailer::parse(bytes)?;
        Ok(Self {
            bytes,
            trailer,
            in_progress: Vec::new(),
            reads: 0,
        })
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], PlistError> {
        let end = offset
            .checked_add(len)
            .ok_or(PlistError::OutOfBounds { offset, len })?;
        // Objects may not run into the offset table.
        if end > self.trailer.offset_table_offset {
            return Err(PlistError::OutOfBounds { offset, len });
        }
        self.bytes
            .get(offset..end)
            .ok_or(PlistError::OutOfBounds { offset, len })
    }

    fn byte(&self, offset: usize) -> Result<u8, PlistError> {
        Ok(self.slice(offset, 1)?[0])
    }

    fn object_offset(&self, index: u64) -> Result<usize, PlistError> {
        if index >= self.trailer.num_objects {
            return Err(PlistError::BadObjectRef {
                index,
                count: self.trailer.num_objects,
            });
        }
        let size = self.trailer.offset_int_size;
        let entry = self.trailer.offset_table_offset + index as usize * size;
        let offset = be_uint(&self.bytes[entry..entry + size]) as usize;
        if offset < HEADER_LEN || offset >= self.trailer.offset_table_offset {
            return Err(PlistError::OutOfBounds { offset, len: 1 });
        }
        Ok(offset)
    }

    /// Length of a variable-size object and where its payload starts.
    ///
    /// Counts below 15 live in the marker's low nibble; otherwise an integer
    /// object follows the marker.
    fn count(&self, marker_offset: usize, low: u8) -> Result<(usize, usize), PlistError> {
        if low != 0x0F {
            return Ok((low as usize, marker_offset + 1));
        }
        let int_marker = self.byte(marker_offset + 1)?;
        if int_marker >> 4 != 0x1 {
            return Err(PlistError::UnknownMarker {
                marker: int_marker,
                offset: marker_offset + 1,
            });
        }
        let size = 1usize << (int_marker & 0x0F);
        if size > 8 {
            return Err(PlistError::UnknownMarker {
                marker: int_marker,
                offset: marker_offset + 1,
            });
        }
        let value = be_uint(self.slice(marker_offset + 2, size)?);
        Ok((value as usize, marker_offset + 2 + size))
    }

    fn refs(&self, start: usize, count: usize) -> Result<Vec<u64>, PlistError> {
        let size = self.trailer.object_ref_size;
        let len = count
            .checked_mul(size)
            .ok_or(PlistError::OutOfBounds { offset: start, len: usize::MAX })?;
        let raw = self.slice(start, len)?;
        Ok(raw.chunks_exact(size).map(be_uint).collect())
    }

    fn read_object(&mut self, index: u64, depth: usize) -> Result<Plist, PlistError> {
        if depth > MAX_DEPTH {
            return Err(PlistError::TooDeep(MAX_DEPTH));
        }
        if self.in_progress.contains(&index) {
            return Err(PlistError::Cycle(index));
        }
        self.reads += 1;
        if self.reads > MAX_OBJECT_READS {
            return Err(PlistError::TooLarge(MAX_OBJECT_READS));
        }

        self.in_progress.push(index);
        let result = self.decode_at(index, depth);
        self.in_progress.pop();
        result
    }

    fn decode_at(&mut self, index: u64, depth: usize) -> Result<Plist, PlistError> {
        let offset = self.object_offset(index)?;
        let marker = self.byte(offset)?;
        let (high, low) = (marker >> 4, marker & 0x0F);
        let unknown = PlistError::UnknownMarker { marker, offset };

        match high {
            0x0 => match low {
                0x0 | 0xF => Ok(Plist::Null),
                0x8 => Ok(Plist::Boolean(false)),
                0x9 => Ok(Plist::Boolean(true)),
                _ => Err(unknown),
            },
            0x1 => {
                let size = 1usize << low;
                let raw = self.slice(offset + 1, size)?;
                let value = match size {
                    1 | 2 | 4 => be_uint(raw) as i128,
                    8 => be_uint(raw) as i64 as i128,
                    16 => i128::from_be_bytes(raw.try_into().map_err(|_| unknown)?),
                    _ => return Err(unknown),
                };
                Ok(Plist::Integer(value))
            }
            0x2 => Ok(Plist::Real(self.real(offset, low)?)),
            0x3 if low == 0x3 => Ok(Plist::Date(self.real(offset, low)?)),
            0x4 => {
                let (len, start) = self.count(offset, low)?;
                Ok(Plist::Data(self.slice(start, len)?.to_vec()))
            }
            0x5 => {
                let (len, start) = self.count(offset, low)?;
                let raw = self.slice(start, len)?;
                if !raw.is_ascii() {
                    return Err(PlistError::InvalidString(offset));
                }
                Ok(Plist::String(raw.iter().map(|&b| b as char).collect()))
            }
            0x6 => {
                let (units, start) = self.count(offset, low)?;
                let byte_len = units
                    .checked_mul(2)
                    .ok_or(PlistError::OutOfBounds { offset: start, len: usize::MAX })?;
                let raw = self.slice(start, byte_len)?;
                let code_units: Vec<u16> = raw
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&code_units)
                    .map(Plist::String)
                    .map_err(|_| PlistError::InvalidString(offset))
            }
            0x8 => {
                let raw = self.slice(offset + 1, low as usize + 1)?;
                if raw.len() > 8 {
                    return Err(unknown);
                }
                Ok(Plist::Uid(be_uint(raw)))
            }
            0xA | 0xC => {
                let (count, start) = self.count(offset, low)?;
                let items = self
                    .refs(start, count)?
                    .into_iter()
                    .map(|r| self.read_object(r, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                if high == 0xA {
                    Ok(Plist::Array(items))
                } else {
                    Ok(Plist::Set(items))
                }
            }
            0xD => {
                let (count, start) = self.count(offset, low)?;
                let refs = self.refs(start, count.checked_mul(2).ok_or(unknown)?)?;
                let (key_refs, value_refs) = refs.split_at(count);

                let mut dict = BTreeMap::new();
                for (&k, &v) in key_refs.iter().zip(value_refs) {
                    let key = match self.read_object(k, depth + 1)? {
                        Plist::String(s) => s,
                        _ => return Err(PlistError::NonStringKey),
                    };
                    let value = self.read_object(v, depth + 1)?;
                    dict.insert(key, value);
                }
                Ok(Plist::Dictionary(dict))
            }
            _ => Err(unknown),
        }
    }

    fn real(&self, offset: usize, low: u8) -> Result<f64, PlistError> {
        match low {
            0x2 => {
                let raw = self.slice(offset + 1, 4)?;
                Ok(f32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64)
            }
            0x3 => {
                let raw = self.slice(offset + 1, 8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                Ok(f64::from_be_bytes(buf))
            }
            _ => Err(PlistError::UnknownMarker {
                marker: self.byte(offset)?,
                offset,
            }),
        }
    }
}

/// Big-endian unsigned integer of 1 to 8 bytes
fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

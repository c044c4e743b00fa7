//! EVM callscript codec.
//!
//! Layout: 4-byte spec id `0x00000001`, then zero or more segments, each
//! `to (20 bytes) || len(data) (u32 big-endian) || data`. No terminator; the end of the
//! buffer ends the script. The layout is what deployed forwarders execute, so encodings
//! must stay byte-for-byte identical.

mod forward;

use alloy_primitives::{Address, Bytes};
use dao_txpath_types::CALLSCRIPT_SPEC_ID;
use serde::Serialize;

use crate::{
    errors::ScriptError,
    utils::bytes::{read_address, read_slice, read_u32_be},
};

pub use forward::{decode_forward_call, is_forward_call};

const SEGMENT_HEADER_LEN: usize = 20 + 4;

/// Forward calls nested deeper than this are not expanded into `children`.
pub const MAX_NESTING_DEPTH: usize = 32;

/// One call inside a script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub to: Address,
    pub data: Bytes,
    /// Decoded script when `data` is a `forward(bytes)` call wrapping another callscript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Segment>>,
}

impl Segment {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            children: None,
        }
    }
}

/// Encode calls into a callscript. `children` are ignored; they are derived from `data`.
///
/// Fails if a segment's data does not fit the 4-byte length field.
pub fn encode(segments: &[Segment]) -> Result<Bytes, ScriptError> {
    let len = 4 + segments
        .iter()
        .map(|s| SEGMENT_HEADER_LEN + s.data.len())
        .sum::<usize>();
    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(&CALLSCRIPT_SPEC_ID);
    for (index, segment) in segments.iter().enumerate() {
        buf.extend_from_slice(segment.to.as_slice());
        buf.extend_from_slice(&segment_len(index, segment.data.len())?.to_be_bytes());
        buf.extend_from_slice(&segment.data);
    }
    Ok(buf.into())
}

fn segment_len(index: usize, len: usize) -> Result<u32, ScriptError> {
    u32::try_from(len).map_err(|_| ScriptError::SegmentTooLong { index, len })
}

pub fn is_call_script(bytes: &[u8]) -> bool {
    bytes.starts_with(&CALLSCRIPT_SPEC_ID)
}

/// Decode a callscript, expanding nested forward calls into `children`.
///
/// Nested payloads that fail to decode, or sit deeper than [`MAX_NESTING_DEPTH`], are
/// left as plain data.
pub fn decode(bytes: &[u8]) -> Result<Vec<Segment>, ScriptError> {
    decode_bytes(&Bytes::copy_from_slice(bytes))
}

/// Like [`decode`] without copying: the data of every segment, nested ones included, is a
/// view into `script`.
pub fn decode_bytes(script: &Bytes) -> Result<Vec<Segment>, ScriptError> {
    decode_nested(script, 0)
}

fn decode_nested(script: &Bytes, depth: usize) -> Result<Vec<Segment>, ScriptError> {
    let mut segments = decode_flat(script)?;
    if depth >= MAX_NESTING_DEPTH {
        return Ok(segments);
    }
    for segment in &mut segments {
        let payload = decode_forward_call(&segment.data)
            .filter(|payload| is_call_script(payload))
            .map(|payload| Bytes(segment.data.0.slice_ref(payload)));
        segment.children = payload.and_then(|payload| decode_nested(&payload, depth + 1).ok());
    }
    Ok(segments)
}

/// Decode one level of a callscript without looking inside forward calls.
pub fn decode_flat(bytes: &Bytes) -> Result<Vec<Segment>, ScriptError> {
    let mut i = 0usize;
    let spec_id = read_slice(bytes, &mut i, 4).ok_or(ScriptError::MissingSpecId)?;
    if spec_id != CALLSCRIPT_SPEC_ID {
        let mut found = [0u8; 4];
        found.copy_from_slice(spec_id);
        return Err(ScriptError::InvalidSpecId(found));
    }

    let mut segments = Vec::new();
    while i < bytes.len() {
        let offset = i;
        let (to, len) = match (read_address(bytes, &mut i), read_u32_be(bytes, &mut i)) {
            (Some(to), Some(len)) => (to, len as usize),
            _ => return Err(ScriptError::TruncatedSegment { offset }),
        };
        let available = bytes.len() - i;
        let start = i;
        read_slice(bytes, &mut i, len).ok_or(ScriptError::LengthOverrun {
            offset,
            declared: len,
            available,
        })?;
        segments.push(Segment::new(to, Bytes(bytes.0.slice(start..i))));
    }
    Ok(segments)
}

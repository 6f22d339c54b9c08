//! 8-byte wire form of [`Value`].
//!
//! Byte 7 holds the tag; the payload is little-endian in bytes 0..=6.
//! Encoding always emits the zero-padded form.

use thiserror::Error;

use super::types::ValueType;
use super::value::{NumRange, Value, ValueId};

pub const VALUE_SIZE: usize = 8;

const TAG_BYTE: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown value tag {0}")]
    UnknownTag(u8),
    #[error("invalid bool byte {0}")]
    InvalidBool(u8),
    #[error("opaque id must be non-zero")]
    ZeroId,
}

/// Number of payload bytes used by each tag.
fn payload_len(ty: ValueType) -> usize {
    match ty {
        ValueType::Null => 0,
        ValueType::Num | ValueType::Str => 4,
        ValueType::NumRange => 6,
        ValueType::Bool => 1,
        ValueType::Id => 7,
    }
}

pub fn encode(value: Value) -> [u8; VALUE_SIZE] {
    let mut out = [0u8; VALUE_SIZE];
    match value {
        Value::Null => {}
        Value::Num(n) => out[..4].copy_from_slice(&n.to_le_bytes()),
        Value::NumRange(r) => {
            out[..4].copy_from_slice(&r.base().to_le_bytes());
            out[4..6].copy_from_slice(&r.extent().to_le_bytes());
        }
        Value::Bool(b) => out[0] = b as u8,
        Value::Str(h) => out[..4].copy_from_slice(&h.to_le_bytes()),
        Value::Id(id) => out[..7].copy_from_slice(&id.get().to_le_bytes()[..7]),
    }
    out[TAG_BYTE] = value.ty() as u8;
    out
}

pub fn decode(raw: [u8; VALUE_SIZE]) -> Result<Value, CodecError> {
    let tag = raw[TAG_BYTE];
    let ty = ValueType::from_u8(tag).ok_or(CodecError::UnknownTag(tag))?;
    let word = |at: usize| i32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);

    let value = match ty {
        ValueType::Null => Value::Null,
        ValueType::Num => Value::Num(word(0)),
        ValueType::NumRange => {
            let extent = u16::from_le_bytes([raw[4], raw[5]]);
            Value::NumRange(NumRange::new(word(0), extent))
        }
        ValueType::Bool => match raw[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(CodecError::InvalidBool(other)),
        },
        ValueType::Str => Value::Str(word(0) as u32),
        ValueType::Id => {
            let mut wide = [0u8; 8];
            wide[..7].copy_from_slice(&raw[..7]);
            let id = ValueId::new(u64::from_le_bytes(wide)).ok_or(CodecError::ZeroId)?;
            Value::Id(id)
        }
    };
    Ok(value)
}

/// Canonical form of `raw`: raw inputs that decode to the same value pad
/// to the same bytes.
///
/// Decodable input is re-encoded, which also saturates range extents.
/// Otherwise the unused payload bytes are cleared; unknown tags are
/// returned unchanged.
pub fn zero_pad(raw: [u8; VALUE_SIZE]) -> [u8; VALUE_SIZE] {
    if let Ok(value) = decode(raw) {
        return encode(value);
    }
    let Some(ty) = ValueType::from_u8(raw[TAG_BYTE]) else {
        return raw;
    };
    let mut out = [0u8; VALUE_SIZE];
    let used = payload_len(ty);
    out[..used].copy_from_slice(&raw[..used]);
    out[TAG_BYTE] = raw[TAG_BYTE];
    out
}

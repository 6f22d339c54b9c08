use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::{self, CodecError};
use super::hash::{StringHash, fnv1a_32, hash_combine, string_hash};
use super::strings::StringTable;
use super::types::{TypeMask, ValueType};

/// Largest opaque id representable in the 7 payload bytes.
pub const ID_MAX: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// Opaque 56-bit identifier, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u64);

impl ValueId {
    /// `None` for zero (reserved as "absent") and for ids wider than 56 bits.
    pub fn new(raw: u64) -> Option<Self> {
        if raw == 0 || raw > ID_MAX {
            None
        } else {
            Some(ValueId(raw))
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Inclusive integer interval `[base, base + extent]`.
///
/// The extent is stored saturated so the maximum never exceeds `i32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumRange {
    base: i32,
    extent: u16,
}

impl NumRange {
    pub fn new(base: i32, extent: u16) -> Self {
        let headroom = i32::MAX as i64 - base as i64;
        let extent = (extent as i64).min(headroom) as u16;
        NumRange { base, extent }
    }

    /// Range between two bounds in either order; the extent saturates at `u16::MAX`.
    pub fn from_to(a: i32, b: i32) -> Self {
        let (min, max) = if a > b { (b, a) } else { (a, b) };
        let extent = (max as i64 - min as i64).min(u16::MAX as i64) as u16;
        NumRange::new(min, extent)
    }

    pub fn base(self) -> i32 {
        self.base
    }

    pub fn extent(self) -> u16 {
        self.extent
    }

    pub fn min(self) -> i32 {
        self.base
    }

    pub fn max(self) -> i32 {
        clamp_to_i32(self.base as i64 + self.extent as i64)
    }

    pub fn contains(self, x: i32) -> bool {
        x >= self.min() && x <= self.max()
    }
}

/// Runtime value scripts operate on.
///
/// Values are 8 bytes on the wire (see [`codec`]); serde uses that form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "[u8; 8]", try_from = "[u8; 8]")]
pub enum Value {
    #[default]
    Null,
    Num(i32),
    NumRange(NumRange),
    Bool(bool),
    /// Handle into a [`StringTable`]; only the hash is stored.
    Str(StringHash),
    Id(ValueId),
}

fn clamp_to_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Value {
    // =========================================================================
    // Construction
    // =========================================================================

    pub fn num(v: i32) -> Value {
        Value::Num(v)
    }

    pub fn num_range(base: i32, extent: u16) -> Value {
        Value::NumRange(NumRange::new(base, extent))
    }

    pub fn num_range_from_to(a: i32, b: i32) -> Value {
        Value::NumRange(NumRange::from_to(a, b))
    }

    pub fn bool(v: bool) -> Value {
        Value::Bool(v)
    }

    pub fn str(hash: StringHash) -> Value {
        Value::Str(hash)
    }

    pub fn str_empty() -> Value {
        Value::Str(string_hash(""))
    }

    /// Null for the zero hash.
    pub fn str_or_null(hash: StringHash) -> Value {
        if hash == 0 { Value::Null } else { Value::Str(hash) }
    }

    pub fn id(id: ValueId) -> Value {
        Value::Id(id)
    }

    pub fn id_or_null(raw: u64) -> Value {
        ValueId::new(raw).map_or(Value::Null, Value::Id)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn ty(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Num(_) => ValueType::Num,
            Value::NumRange(_) => ValueType::NumRange,
            Value::Bool(_) => ValueType::Bool,
            Value::Str(_) => ValueType::Str,
            Value::Id(_) => ValueType::Id,
        }
    }

    pub fn type_check(&self, mask: TypeMask) -> bool {
        mask.contains(self.ty())
    }

    pub fn get_num(&self, fallback: i32) -> i32 {
        match self {
            Value::Num(n) => *n,
            _ => fallback,
        }
    }

    pub fn get_num_range(&self) -> Option<NumRange> {
        match self {
            Value::NumRange(r) => Some(*r),
            _ => None,
        }
    }

    pub fn get_bool(&self, fallback: bool) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => fallback,
        }
    }

    pub fn get_str(&self, fallback: StringHash) -> StringHash {
        match self {
            Value::Str(h) => *h,
            _ => fallback,
        }
    }

    pub fn get_id(&self, fallback: u64) -> u64 {
        match self {
            Value::Id(id) => id.get(),
            _ => fallback,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(_) | Value::NumRange(_) | Value::Str(_) | Value::Id(_) => true,
        }
    }

    pub fn falsy(&self) -> bool {
        !self.truthy()
    }

    pub fn non_null(&self) -> bool {
        !matches!(self, Value::Null)
    }

    pub fn truthy_as_val(&self) -> Value {
        Value::Bool(self.truthy())
    }

    pub fn falsy_as_val(&self) -> Value {
        Value::Bool(self.falsy())
    }

    pub fn non_null_as_val(&self) -> Value {
        Value::Bool(self.non_null())
    }

    /// `self` unless it is null.
    pub fn or(self, fallback: Value) -> Value {
        if self.non_null() { self } else { fallback }
    }

    /// 32-bit hash: the type hash combined with the payload bytes.
    pub fn hash32(&self) -> u32 {
        let type_hash = self.ty().type_hash();
        let bytes = codec::encode(*self);
        match self {
            Value::Null => type_hash,
            Value::Num(_) => hash_combine(type_hash, fnv1a_32(&bytes[..4])),
            Value::NumRange(_) => hash_combine(type_hash, fnv1a_32(&bytes[..6])),
            Value::Bool(_) => hash_combine(type_hash, fnv1a_32(&bytes[..1])),
            Value::Str(h) => hash_combine(type_hash, *h),
            Value::Id(id) => {
                let lo = (id.get() & 0xFFFF_FFFF) as u32;
                let hi = (id.get() >> 32) as u32;
                hash_combine(type_hash, hash_combine(lo, hi))
            }
        }
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    pub fn equal(&self, other: &Value) -> bool {
        self == other
    }

    pub fn less(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a < b,
            (Value::NumRange(a), Value::NumRange(b)) => a.min() < b.min() && a.max() < b.max(),
            // Kept for compatibility; not extended to other orderings.
            (Value::Bool(a), Value::Bool(b)) => !a & b,
            _ => false,
        }
    }

    pub fn greater(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a > b,
            (Value::NumRange(a), Value::NumRange(b)) => a.min() > b.min() && a.max() > b.max(),
            (Value::Bool(a), Value::Bool(b)) => a & !b,
            _ => false,
        }
    }

    pub fn equal_as_val(&self, other: &Value) -> Value {
        Value::Bool(self.equal(other))
    }

    pub fn less_as_val(&self, other: &Value) -> Value {
        Value::Bool(self.less(other))
    }

    pub fn greater_as_val(&self, other: &Value) -> Value {
        Value::Bool(self.greater(other))
    }

    // =========================================================================
    // Arithmetic (total: nonsense input yields null)
    // =========================================================================

    /// String handle of the type name.
    pub fn type_of(&self) -> Value {
        Value::Str(self.ty().type_hash())
    }

    pub fn hash_of(&self) -> Value {
        Value::Num(self.hash32() as i32)
    }

    pub fn neg(&self) -> Value {
        match self {
            Value::Num(n) => Value::Num(n.saturating_neg()),
            // Mirrored about the base: [base - extent, base].
            Value::NumRange(r) => {
                let min = clamp_to_i32(r.base() as i64 - r.extent() as i64);
                Value::num_range_from_to(min, r.base())
            }
            _ => Value::Null,
        }
    }

    pub fn inv(&self) -> Value {
        Value::Bool(self.falsy())
    }

    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => Value::Num(a.saturating_add(*b)),
            (Value::NumRange(a), Value::NumRange(b)) => {
                let min = clamp_to_i32(a.min() as i64 + b.min() as i64);
                let max = clamp_to_i32(a.max() as i64 + b.max() as i64);
                Value::num_range_from_to(min, max)
            }
            _ => Value::Null,
        }
    }

    pub fn sub(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => Value::Num(a.saturating_sub(*b)),
            (Value::NumRange(a), Value::NumRange(b)) => {
                let min = clamp_to_i32(a.min() as i64 - b.min() as i64);
                let max = clamp_to_i32(a.max() as i64 - b.max() as i64);
                Value::num_range_from_to(min, max)
            }
            _ => Value::Null,
        }
    }

    pub fn mul(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => Value::Num(a.saturating_mul(*b)),
            _ => Value::Null,
        }
    }

    /// Truncating division; null when dividing by zero.
    pub fn div(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Num(_), Value::Num(0)) => Value::Null,
            (Value::Num(a), Value::Num(b)) => Value::Num(clamp_to_i32(*a as i64 / *b as i64)),
            _ => Value::Null,
        }
    }

    /// Truncating remainder (sign follows the dividend); null for a zero divisor.
    pub fn rem(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Num(_), Value::Num(0)) => Value::Null,
            (Value::Num(a), Value::Num(b)) => Value::Num(a.wrapping_rem(*b)),
            _ => Value::Null,
        }
    }

    pub fn abs(&self) -> Value {
        match self {
            Value::Num(n) => Value::Num(n.saturating_abs()),
            _ => Value::Null,
        }
    }

    /// Eager; short-circuiting is up to the caller.
    pub fn logic_and(&self, other: &Value) -> Value {
        Value::Bool(self.truthy() && other.truthy())
    }

    pub fn logic_or(&self, other: &Value) -> Value {
        Value::Bool(self.truthy() || other.truthy())
    }

    pub fn clamp(&self, range: &Value) -> Value {
        let Value::NumRange(range) = range else {
            return Value::Null;
        };
        let (min, max) = (range.min(), range.max());
        match self {
            Value::Num(n) => Value::Num((*n).clamp(min, max)),
            Value::NumRange(v) => {
                Value::num_range_from_to(v.min().clamp(min, max), v.max().clamp(min, max))
            }
            _ => Value::Null,
        }
    }

    pub fn contains(&self, range: &Value) -> Value {
        let Value::NumRange(range) = range else {
            return Value::Null;
        };
        match self {
            Value::Num(n) => Value::Bool(range.contains(*n)),
            Value::NumRange(v) => Value::Bool(v.min() >= range.min() && v.max() <= range.max()),
            _ => Value::Null,
        }
    }

    pub fn min(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => Value::Num(*a.min(b)),
            _ => Value::Null,
        }
    }

    pub fn max(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => Value::Num(*a.max(b)),
            _ => Value::Null,
        }
    }

    pub fn range_min(&self) -> Value {
        match self {
            Value::NumRange(r) => Value::Num(r.min()),
            _ => Value::Null,
        }
    }

    pub fn range_max(&self) -> Value {
        match self {
            Value::NumRange(r) => Value::Num(r.max()),
            _ => Value::Null,
        }
    }

    pub fn range_from_to(from: &Value, to: &Value) -> Value {
        match (from, to) {
            (Value::Num(a), Value::Num(b)) => Value::num_range_from_to(*a, *b),
            _ => Value::Null,
        }
    }

    // =========================================================================
    // Formatting
    // =========================================================================

    /// Display adapter that resolves string handles through `strings`.
    pub fn display<'a>(&self, strings: &'a StringTable) -> ValueDisplay<'a> {
        ValueDisplay {
            value: *self,
            strings: Some(strings),
        }
    }
}

impl From<Value> for [u8; 8] {
    fn from(value: Value) -> Self {
        codec::encode(value)
    }
}

impl TryFrom<[u8; 8]> for Value {
    type Error = CodecError;

    fn try_from(bytes: [u8; 8]) -> Result<Self, Self::Error> {
        codec::decode(bytes)
    }
}

pub struct ValueDisplay<'a> {
    value: Value,
    strings: Option<&'a StringTable>,
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Null => f.write_str("null"),
            Value::Num(n) => write!(f, "{}", n),
            Value::NumRange(r) => write!(f, "{} to {}", r.min(), r.max()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(h) => match self.strings.and_then(|s| s.lookup(h)) {
                Some(text) => f.write_str(text),
                None => write!(f, "#{:08x}", h),
            },
            Value::Id(id) => write!(f, "{}", id.get()),
        }
    }
}

/// Without a string table, string handles render as `#<hash>`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ValueDisplay {
            value: *self,
            strings: None,
        }
        .fmt(f)
    }
}

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use super::hash::{StringHash, string_hash};

/// Tag of a [`Value`](super::value::Value).
///
/// Discriminants are the tag byte of the 8-byte wire form and must not change.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    Null = 0,
    Num = 1,
    NumRange = 2,
    Bool = 3,
    Str = 4,
    Id = 5,
}

impl ValueType {
    pub const COUNT: usize = 6;

    pub const ALL: [ValueType; Self::COUNT] = [
        ValueType::Null,
        ValueType::Num,
        ValueType::NumRange,
        ValueType::Bool,
        ValueType::Str,
        ValueType::Id,
    ];

    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Num => "num",
            ValueType::NumRange => "range",
            ValueType::Bool => "bool",
            ValueType::Str => "str",
            ValueType::Id => "id",
        }
    }

    /// String hash of the type name; what the `type` operation yields.
    pub fn type_hash(self) -> StringHash {
        string_hash(self.name())
    }

    pub fn from_hash(hash: StringHash) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_hash() == hash)
    }

    pub fn mask(self) -> TypeMask {
        TypeMask(1 << self as u16)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Set of accepted value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TypeMask(pub u16);

impl TypeMask {
    pub const NONE: TypeMask = TypeMask(0);
    pub const ANY: TypeMask = TypeMask((1 << ValueType::COUNT as u16) - 1);
    pub const NULL: TypeMask = TypeMask(1 << ValueType::Null as u16);
    pub const NUM: TypeMask = TypeMask(1 << ValueType::Num as u16);
    pub const NUM_RANGE: TypeMask = TypeMask(1 << ValueType::NumRange as u16);
    pub const BOOL: TypeMask = TypeMask(1 << ValueType::Bool as u16);
    pub const STR: TypeMask = TypeMask(1 << ValueType::Str as u16);
    pub const ID: TypeMask = TypeMask(1 << ValueType::Id as u16);

    pub fn contains(self, ty: ValueType) -> bool {
        self.0 & (1 << ty as u16) != 0
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn types(self) -> impl Iterator<Item = ValueType> {
        ValueType::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TypeMask {
    fn bitor_assign(&mut self, rhs: TypeMask) {
        self.0 |= rhs.0;
    }
}

impl From<ValueType> for TypeMask {
    fn from(ty: ValueType) -> Self {
        ty.mask()
    }
}

impl fmt::Display for TypeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TypeMask::ANY {
            return f.write_str("any");
        }
        if self.is_empty() {
            return f.write_str("none");
        }
        if self.contains(ValueType::Null) && self.0.count_ones() == 2 {
            // Single type plus null: `num?`.
            let rest = TypeMask(self.0 & !TypeMask::NULL.0);
            if let Some(ty) = rest.types().next() {
                return write!(f, "{}?", ty);
            }
        }
        for (i, ty) in self.types().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(ty.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(ValueType::Null.name(), "null");
        assert_eq!(ValueType::Num.name(), "num");
        assert_eq!(ValueType::NumRange.name(), "range");
        assert_eq!(ValueType::Bool.name(), "bool");
        assert_eq!(ValueType::Str.name(), "str");
        assert_eq!(ValueType::Id.name(), "id");
    }

    #[test]
    fn test_type_from_hash() {
        for ty in ValueType::ALL {
            assert_eq!(ValueType::from_hash(string_hash(ty.name())), Some(ty));
        }
        assert_eq!(ValueType::from_hash(string_hash("")), None);
        assert_eq!(ValueType::from_hash(string_hash("hello-world")), None);
    }

    #[test]
    fn test_type_from_u8_rejects_unknown_tags() {
        assert_eq!(ValueType::from_u8(5), Some(ValueType::Id));
        assert_eq!(ValueType::from_u8(6), None);
        assert_eq!(ValueType::from_u8(0xFF), None);
    }

    #[test]
    fn test_mask_display() {
        let cases = [
            (TypeMask::NONE, "none"),
            (TypeMask::ANY, "any"),
            (TypeMask::NULL, "null"),
            (TypeMask::NUM, "num"),
            (TypeMask::NUM_RANGE, "range"),
            (TypeMask::BOOL, "bool"),
            (TypeMask::STR, "str"),
            (TypeMask::NULL | TypeMask::NUM, "num?"),
            (TypeMask::NULL | TypeMask::NUM | TypeMask::STR, "null | num | str"),
            (
                TypeMask::NULL | TypeMask::NUM | TypeMask::STR | TypeMask::NUM_RANGE,
                "null | num | range | str",
            ),
        ];
        for (mask, expected) in cases {
            assert_eq!(mask.to_string(), expected, "mask {:#06b}", mask.0);
        }
    }

    #[test]
    fn test_mask_contains() {
        let mask = TypeMask::NUM | TypeMask::NULL;
        assert!(mask.contains(ValueType::Num));
        assert!(mask.contains(ValueType::Null));
        assert!(!mask.contains(ValueType::Str));
        assert!(TypeMask::ANY.types().eq(ValueType::ALL));
    }
}

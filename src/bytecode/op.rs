//! Opcode numbering and operand widths.
//!
//! Opcode values are baked into compiled programs and must not change.

use std::fmt;

/// Number of slots in the register file.
pub const REGISTER_COUNT: usize = 38;

/// Register index as stored in an instruction.
///
/// Decoding accepts any byte; validation rejects indices outside the
/// register file, so the VM can index with it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u8);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self.index() < REGISTER_COUNT
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

// =============================================================================
// OPCODE
// =============================================================================

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // control
    Fail = 0,
    Assert = 1,
    Return = 2,
    ReturnNull = 3,
    Move = 4,
    Jump = 5,
    JumpIfTruthy = 6,
    JumpIfFalsy = 7,
    JumpIfNonNull = 8,

    // loads
    Value = 9,
    ValueNull = 10,
    ValueBool = 11,
    ValueSmallInt = 12,

    // memory
    MemLoad = 13,
    MemStore = 14,
    MemLoadDyn = 15,
    MemStoreDyn = 16,

    Extern = 17,

    // predicates (d)
    Truthy = 18,
    Falsy = 19,
    NonNull = 20,
    Type = 21,
    Hash = 22,

    // binary (d, s)
    Equal = 23,
    Less = 24,
    Greater = 25,
    Add = 26,
    Sub = 27,
    Mul = 28,
    Div = 29,
    Mod = 30,

    // unary (d)
    Negate = 31,
    Invert = 32,
    Absolute = 33,
    RangeMin = 34,
    RangeMax = 35,

    // binary (x, y)
    RangeFromTo = 36,
    Clamp = 37,
    Contains = 38,
    Min = 39,
    Max = 40,
}

impl OpCode {
    pub const COUNT: usize = 41;

    pub const ALL: [OpCode; Self::COUNT] = [
        OpCode::Fail,
        OpCode::Assert,
        OpCode::Return,
        OpCode::ReturnNull,
        OpCode::Move,
        OpCode::Jump,
        OpCode::JumpIfTruthy,
        OpCode::JumpIfFalsy,
        OpCode::JumpIfNonNull,
        OpCode::Value,
        OpCode::ValueNull,
        OpCode::ValueBool,
        OpCode::ValueSmallInt,
        OpCode::MemLoad,
        OpCode::MemStore,
        OpCode::MemLoadDyn,
        OpCode::MemStoreDyn,
        OpCode::Extern,
        OpCode::Truthy,
        OpCode::Falsy,
        OpCode::NonNull,
        OpCode::Type,
        OpCode::Hash,
        OpCode::Equal,
        OpCode::Less,
        OpCode::Greater,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Negate,
        OpCode::Invert,
        OpCode::Absolute,
        OpCode::RangeMin,
        OpCode::RangeMax,
        OpCode::RangeFromTo,
        OpCode::Clamp,
        OpCode::Contains,
        OpCode::Min,
        OpCode::Max,
    ];

    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Encoded size in bytes, opcode included.
    pub fn size(self) -> usize {
        use OpCode::*;
        match self {
            Fail | ReturnNull => 1,
            Assert | Return | ValueNull | MemLoadDyn => 2,
            Truthy | Falsy | NonNull | Type | Hash => 2,
            Negate | Invert | Absolute | RangeMin | RangeMax => 2,
            Move | Jump | Value | ValueBool | ValueSmallInt | MemStoreDyn => 3,
            Equal | Less | Greater | Add | Sub | Mul | Div | Mod => 3,
            RangeFromTo | Clamp | Contains | Min | Max => 3,
            JumpIfTruthy | JumpIfFalsy | JumpIfNonNull => 4,
            MemLoad | MemStore | Extern => 6,
        }
    }

    pub fn is_memory_access(self) -> bool {
        matches!(
            self,
            OpCode::MemLoad | OpCode::MemStore | OpCode::MemLoadDyn | OpCode::MemStoreDyn
        )
    }

    /// Instructions after which execution never falls through.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            OpCode::Fail | OpCode::Return | OpCode::ReturnNull | OpCode::Jump
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Fail => "FAIL",
            OpCode::Assert => "ASSERT",
            OpCode::Return => "RETURN",
            OpCode::ReturnNull => "RETURN_NULL",
            OpCode::Move => "MOVE",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfTruthy => "JUMP_IF_TRUTHY",
            OpCode::JumpIfFalsy => "JUMP_IF_FALSY",
            OpCode::JumpIfNonNull => "JUMP_IF_NON_NULL",
            OpCode::Value => "VALUE",
            OpCode::ValueNull => "VALUE_NULL",
            OpCode::ValueBool => "VALUE_BOOL",
            OpCode::ValueSmallInt => "VALUE_SMALL_INT",
            OpCode::MemLoad => "MEM_LOAD",
            OpCode::MemStore => "MEM_STORE",
            OpCode::MemLoadDyn => "MEM_LOAD_DYN",
            OpCode::MemStoreDyn => "MEM_STORE_DYN",
            OpCode::Extern => "EXTERN",
            OpCode::Truthy => "TRUTHY",
            OpCode::Falsy => "FALSY",
            OpCode::NonNull => "NON_NULL",
            OpCode::Type => "TYPE",
            OpCode::Hash => "HASH",
            OpCode::Equal => "EQUAL",
            OpCode::Less => "LESS",
            OpCode::Greater => "GREATER",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Negate => "NEGATE",
            OpCode::Invert => "INVERT",
            OpCode::Absolute => "ABSOLUTE",
            OpCode::RangeMin => "RANGE_MIN",
            OpCode::RangeMax => "RANGE_MAX",
            OpCode::RangeFromTo => "RANGE_FROM_TO",
            OpCode::Clamp => "CLAMP",
            OpCode::Contains => "CONTAINS",
            OpCode::Min => "MIN",
            OpCode::Max => "MAX",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_numbering_is_dense() {
        for (i, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(OpCode::from_u8(i as u8), Some(*op));
        }
        assert_eq!(OpCode::from_u8(41), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(OpCode::Fail.size(), 1);
        assert_eq!(OpCode::Jump.size(), 3);
        assert_eq!(OpCode::JumpIfFalsy.size(), 4);
        assert_eq!(OpCode::MemLoad.size(), 6);
        assert_eq!(OpCode::Extern.size(), 6);
        assert_eq!(OpCode::Max.size(), 3);
    }

    #[test]
    fn test_register_bounds() {
        assert!(Reg(0).is_valid());
        assert!(Reg(37).is_valid());
        assert!(!Reg(38).is_valid());
        assert_eq!(Reg(5).to_string(), "r5");
    }
}

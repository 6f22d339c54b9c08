use std::fmt;

use thiserror::Error;

use super::op::{OpCode, Reg};

/// In-place single register operations (`d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Truthy,
    Falsy,
    NonNull,
    Type,
    Hash,
    Negate,
    Invert,
    Absolute,
    RangeMin,
    RangeMax,
}

impl UnaryOp {
    pub fn opcode(self) -> OpCode {
        match self {
            UnaryOp::Truthy => OpCode::Truthy,
            UnaryOp::Falsy => OpCode::Falsy,
            UnaryOp::NonNull => OpCode::NonNull,
            UnaryOp::Type => OpCode::Type,
            UnaryOp::Hash => OpCode::Hash,
            UnaryOp::Negate => OpCode::Negate,
            UnaryOp::Invert => OpCode::Invert,
            UnaryOp::Absolute => OpCode::Absolute,
            UnaryOp::RangeMin => OpCode::RangeMin,
            UnaryOp::RangeMax => OpCode::RangeMax,
        }
    }

    fn from_opcode(op: OpCode) -> Option<Self> {
        Some(match op {
            OpCode::Truthy => UnaryOp::Truthy,
            OpCode::Falsy => UnaryOp::Falsy,
            OpCode::NonNull => UnaryOp::NonNull,
            OpCode::Type => UnaryOp::Type,
            OpCode::Hash => UnaryOp::Hash,
            OpCode::Negate => UnaryOp::Negate,
            OpCode::Invert => UnaryOp::Invert,
            OpCode::Absolute => UnaryOp::Absolute,
            OpCode::RangeMin => UnaryOp::RangeMin,
            OpCode::RangeMax => UnaryOp::RangeMax,
            _ => return None,
        })
    }
}

/// Two register operations; the result overwrites the first operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    Less,
    Greater,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    RangeFromTo,
    Clamp,
    Contains,
    Min,
    Max,
}

impl BinaryOp {
    pub fn opcode(self) -> OpCode {
        match self {
            BinaryOp::Equal => OpCode::Equal,
            BinaryOp::Less => OpCode::Less,
            BinaryOp::Greater => OpCode::Greater,
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Mod => OpCode::Mod,
            BinaryOp::RangeFromTo => OpCode::RangeFromTo,
            BinaryOp::Clamp => OpCode::Clamp,
            BinaryOp::Contains => OpCode::Contains,
            BinaryOp::Min => OpCode::Min,
            BinaryOp::Max => OpCode::Max,
        }
    }

    fn from_opcode(op: OpCode) -> Option<Self> {
        Some(match op {
            OpCode::Equal => BinaryOp::Equal,
            OpCode::Less => BinaryOp::Less,
            OpCode::Greater => BinaryOp::Greater,
            OpCode::Add => BinaryOp::Add,
            OpCode::Sub => BinaryOp::Sub,
            OpCode::Mul => BinaryOp::Mul,
            OpCode::Div => BinaryOp::Div,
            OpCode::Mod => BinaryOp::Mod,
            OpCode::RangeFromTo => BinaryOp::RangeFromTo,
            OpCode::Clamp => BinaryOp::Clamp,
            OpCode::Contains => BinaryOp::Contains,
            OpCode::Min => BinaryOp::Min,
            OpCode::Max => BinaryOp::Max,
            _ => return None,
        })
    }
}

// =============================================================================
// INSTR - Decoded instruction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Fail,
    Assert { src: Reg },
    Return { src: Reg },
    ReturnNull,
    Move { dst: Reg, src: Reg },
    Jump { target: u16 },
    JumpIfTruthy { cond: Reg, target: u16 },
    JumpIfFalsy { cond: Reg, target: u16 },
    JumpIfNonNull { cond: Reg, target: u16 },
    Value { dst: Reg, literal: u8 },
    ValueNull { dst: Reg },
    ValueBool { dst: Reg, value: bool },
    ValueSmallInt { dst: Reg, value: u8 },
    MemLoad { dst: Reg, key: u32 },
    MemStore { src: Reg, key: u32 },
    /// `dst` holds the key on entry and the loaded value on exit.
    MemLoadDyn { dst: Reg },
    MemStoreDyn { src: Reg, key: Reg },
    /// Calls binder function `func` with registers `[args, args + count)`.
    Extern { dst: Reg, func: u16, args: Reg, count: u8 },
    Unary { op: UnaryOp, dst: Reg },
    Binary { op: BinaryOp, dst: Reg, src: Reg },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {opcode} at offset {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },
    #[error("truncated {opcode} at offset {offset}")]
    Truncated { offset: usize, opcode: OpCode },
    #[error("invalid bool operand {value} at offset {offset}")]
    InvalidBool { offset: usize, value: u8 },
}

impl Instr {
    pub fn opcode(&self) -> OpCode {
        match self {
            Instr::Fail => OpCode::Fail,
            Instr::Assert { .. } => OpCode::Assert,
            Instr::Return { .. } => OpCode::Return,
            Instr::ReturnNull => OpCode::ReturnNull,
            Instr::Move { .. } => OpCode::Move,
            Instr::Jump { .. } => OpCode::Jump,
            Instr::JumpIfTruthy { .. } => OpCode::JumpIfTruthy,
            Instr::JumpIfFalsy { .. } => OpCode::JumpIfFalsy,
            Instr::JumpIfNonNull { .. } => OpCode::JumpIfNonNull,
            Instr::Value { .. } => OpCode::Value,
            Instr::ValueNull { .. } => OpCode::ValueNull,
            Instr::ValueBool { .. } => OpCode::ValueBool,
            Instr::ValueSmallInt { .. } => OpCode::ValueSmallInt,
            Instr::MemLoad { .. } => OpCode::MemLoad,
            Instr::MemStore { .. } => OpCode::MemStore,
            Instr::MemLoadDyn { .. } => OpCode::MemLoadDyn,
            Instr::MemStoreDyn { .. } => OpCode::MemStoreDyn,
            Instr::Extern { .. } => OpCode::Extern,
            Instr::Unary { op, .. } => op.opcode(),
            Instr::Binary { op, .. } => op.opcode(),
        }
    }

    pub fn size(&self) -> usize {
        self.opcode().size()
    }

    /// Jump target, for instructions that have one.
    pub fn target(&self) -> Option<u16> {
        match self {
            Instr::Jump { target }
            | Instr::JumpIfTruthy { target, .. }
            | Instr::JumpIfFalsy { target, .. }
            | Instr::JumpIfNonNull { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Every register operand, in encoding order.
    pub fn registers(&self) -> Vec<Reg> {
        match *self {
            Instr::Fail | Instr::ReturnNull | Instr::Jump { .. } => Vec::new(),
            Instr::Assert { src } | Instr::Return { src } | Instr::MemStore { src, .. } => {
                vec![src]
            }
            Instr::JumpIfTruthy { cond, .. }
            | Instr::JumpIfFalsy { cond, .. }
            | Instr::JumpIfNonNull { cond, .. } => vec![cond],
            Instr::Value { dst, .. }
            | Instr::ValueNull { dst }
            | Instr::ValueBool { dst, .. }
            | Instr::ValueSmallInt { dst, .. }
            | Instr::MemLoad { dst, .. }
            | Instr::MemLoadDyn { dst }
            | Instr::Unary { dst, .. } => vec![dst],
            Instr::Move { dst, src } | Instr::Binary { dst, src, .. } => vec![dst, src],
            Instr::MemStoreDyn { src, key } => vec![src, key],
            Instr::Extern { dst, args, .. } => vec![dst, args],
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);
        match *self {
            Instr::Fail | Instr::ReturnNull => {}
            Instr::Assert { src } | Instr::Return { src } => out.push(src.0),
            Instr::Move { dst, src } | Instr::Binary { dst, src, .. } => {
                out.push(dst.0);
                out.push(src.0);
            }
            Instr::Jump { target } => out.extend_from_slice(&target.to_le_bytes()),
            Instr::JumpIfTruthy { cond, target }
            | Instr::JumpIfFalsy { cond, target }
            | Instr::JumpIfNonNull { cond, target } => {
                out.push(cond.0);
                out.extend_from_slice(&target.to_le_bytes());
            }
            Instr::Value { dst, literal } => {
                out.push(dst.0);
                out.push(literal);
            }
            Instr::ValueNull { dst } | Instr::MemLoadDyn { dst } | Instr::Unary { dst, .. } => {
                out.push(dst.0)
            }
            Instr::ValueBool { dst, value } => {
                out.push(dst.0);
                out.push(value as u8);
            }
            Instr::ValueSmallInt { dst, value } => {
                out.push(dst.0);
                out.push(value);
            }
            Instr::MemLoad { dst: reg, key } | Instr::MemStore { src: reg, key } => {
                out.push(reg.0);
                out.extend_from_slice(&key.to_le_bytes());
            }
            Instr::MemStoreDyn { src, key } => {
                out.push(src.0);
                out.push(key.0);
            }
            Instr::Extern {
                dst,
                func,
                args,
                count,
            } => {
                out.push(dst.0);
                out.extend_from_slice(&func.to_le_bytes());
                out.push(args.0);
                out.push(count);
            }
        }
    }

    /// Decodes the instruction starting at `offset`.
    pub fn decode_at(code: &[u8], offset: usize) -> Result<Instr, DecodeError> {
        let byte = code
            .get(offset)
            .copied()
            .ok_or(DecodeError::UnknownOpcode { offset, opcode: 0 })?;
        let opcode =
            OpCode::from_u8(byte).ok_or(DecodeError::UnknownOpcode { offset, opcode: byte })?;
        let bytes = code
            .get(offset + 1..offset + opcode.size())
            .ok_or(DecodeError::Truncated { offset, opcode })?;

        let reg = |i: usize| Reg(bytes[i]);
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        if let Some(op) = UnaryOp::from_opcode(opcode) {
            return Ok(Instr::Unary { op, dst: reg(0) });
        }
        if let Some(op) = BinaryOp::from_opcode(opcode) {
            return Ok(Instr::Binary {
                op,
                dst: reg(0),
                src: reg(1),
            });
        }

        let instr = match opcode {
            OpCode::Fail => Instr::Fail,
            OpCode::Assert => Instr::Assert { src: reg(0) },
            OpCode::Return => Instr::Return { src: reg(0) },
            OpCode::ReturnNull => Instr::ReturnNull,
            OpCode::Move => Instr::Move {
                dst: reg(0),
                src: reg(1),
            },
            OpCode::Jump => Instr::Jump { target: u16_at(0) },
            OpCode::JumpIfTruthy => Instr::JumpIfTruthy {
                cond: reg(0),
                target: u16_at(1),
            },
            OpCode::JumpIfFalsy => Instr::JumpIfFalsy {
                cond: reg(0),
                target: u16_at(1),
            },
            OpCode::JumpIfNonNull => Instr::JumpIfNonNull {
                cond: reg(0),
                target: u16_at(1),
            },
            OpCode::Value => Instr::Value {
                dst: reg(0),
                literal: bytes[1],
            },
            OpCode::ValueNull => Instr::ValueNull { dst: reg(0) },
            OpCode::ValueBool => {
                let value = match bytes[1] {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(DecodeError::InvalidBool {
                            offset,
                            value: other,
                        });
                    }
                };
                Instr::ValueBool { dst: reg(0), value }
            }
            OpCode::ValueSmallInt => Instr::ValueSmallInt {
                dst: reg(0),
                value: bytes[1],
            },
            OpCode::MemLoad => Instr::MemLoad {
                dst: reg(0),
                key: u32_at(1),
            },
            OpCode::MemStore => Instr::MemStore {
                src: reg(0),
                key: u32_at(1),
            },
            OpCode::MemLoadDyn => Instr::MemLoadDyn { dst: reg(0) },
            OpCode::MemStoreDyn => Instr::MemStoreDyn {
                src: reg(0),
                key: reg(1),
            },
            OpCode::Extern => Instr::Extern {
                dst: reg(0),
                func: u16_at(1),
                args: reg(3),
                count: bytes[4],
            },
            // Covered by the unary/binary lookups above.
            _ => return Err(DecodeError::UnknownOpcode { offset, opcode: byte }),
        };
        Ok(instr)
    }
}

/// Walks a code stream instruction by instruction.
pub struct Instrs<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Instrs<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Instrs {
            code,
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for Instrs<'_> {
    type Item = Result<(usize, Instr), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let offset = self.offset;
        match Instr::decode_at(self.code, offset) {
            Ok(instr) => {
                self.offset += instr.size();
                Some(Ok((offset, instr)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().name();
        match *self {
            Instr::Fail | Instr::ReturnNull => write!(f, "{}", name),
            Instr::Assert { src } | Instr::Return { src } => write!(f, "{:<16} {}", name, src),
            Instr::Move { dst, src } | Instr::Binary { dst, src, .. } => {
                write!(f, "{:<16} {}, {}", name, dst, src)
            }
            Instr::Jump { target } => write!(f, "{:<16} @{:04}", name, target),
            Instr::JumpIfTruthy { cond, target }
            | Instr::JumpIfFalsy { cond, target }
            | Instr::JumpIfNonNull { cond, target } => {
                write!(f, "{:<16} {}, @{:04}", name, cond, target)
            }
            Instr::Value { dst, literal } => write!(f, "{:<16} {}, lit[{}]", name, dst, literal),
            Instr::ValueNull { dst } | Instr::MemLoadDyn { dst } | Instr::Unary { dst, .. } => {
                write!(f, "{:<16} {}", name, dst)
            }
            Instr::ValueBool { dst, value } => write!(f, "{:<16} {}, {}", name, dst, value),
            Instr::ValueSmallInt { dst, value } => write!(f, "{:<16} {}, {}", name, dst, value),
            Instr::MemLoad { dst: reg, key } | Instr::MemStore { src: reg, key } => {
                write!(f, "{:<16} {}, key#{:08x}", name, reg, key)
            }
            Instr::MemStoreDyn { src, key } => write!(f, "{:<16} {}, [{}]", name, src, key),
            Instr::Extern {
                dst,
                func,
                args,
                count,
            } => write!(f, "{:<16} {}, fn#{}, {}..+{}", name, dst, func, args, count),
        }
    }
}

//! Assembler for programs.
//!
//! Emits already chosen instructions, resolves labels and interns literals.
//! Errors are collected and reported by [`ProgramBuilder::build`] so emission
//! calls can be chained.

use thiserror::Error;

use crate::lang::value::Value;

use super::instr::{BinaryOp, Instr, UnaryOp};
use super::op::Reg;
use super::program::{Program, ProgramLoc, SourceRange};

/// Jump target handle; placed with [`ProgramBuilder::place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("label {0} placed twice")]
    LabelPlacedTwice(usize),
    #[error("label {0} never placed")]
    LabelNotPlaced(usize),
    #[error("label {0} was not created by this builder")]
    UnknownLabel(usize),
    #[error("more than 256 literals")]
    TooManyLiterals,
    #[error("code size {0} exceeds 65535 bytes")]
    CodeTooLarge(usize),
}

#[derive(Debug)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    literals: Vec<Value>,
    locations: Vec<ProgramLoc>,
    labels: Vec<Option<usize>>,
    /// Positions of 2-byte jump targets waiting for a label.
    fixups: Vec<(usize, Label)>,
    binder_hash: u64,
    error: Option<BuildError>,
}

impl ProgramBuilder {
    pub fn new(binder_hash: u64) -> Self {
        ProgramBuilder {
            code: Vec::new(),
            literals: Vec::new(),
            locations: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            binder_hash,
            error: None,
        }
    }

    fn fail_with(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn place(&mut self, label: Label) -> &mut Self {
        let offset = self.code.len();
        match self.labels.get(label.0).copied() {
            Some(Some(_)) => self.fail_with(BuildError::LabelPlacedTwice(label.0)),
            Some(None) => self.labels[label.0] = Some(offset),
            None => self.fail_with(BuildError::UnknownLabel(label.0)),
        }
        self
    }

    /// Source range for the instructions emitted from here on.
    pub fn location(&mut self, range: SourceRange) -> &mut Self {
        let offset = self.code.len().min(u16::MAX as usize) as u16;
        match self.locations.last_mut() {
            Some(last) if last.offset == offset => last.range = range,
            _ => self.locations.push(ProgramLoc { offset, range }),
        }
        self
    }

    pub fn emit(&mut self, instr: Instr) -> &mut Self {
        instr.encode(&mut self.code);
        self
    }

    fn emit_jump(&mut self, instr: Instr, label: Label) -> &mut Self {
        self.emit(instr);
        let at = self.code.len() - 2;
        self.fixups.push((at, label));
        self
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    pub fn fail(&mut self) -> &mut Self {
        self.emit(Instr::Fail)
    }

    pub fn assert(&mut self, src: Reg) -> &mut Self {
        self.emit(Instr::Assert { src })
    }

    pub fn ret(&mut self, src: Reg) -> &mut Self {
        self.emit(Instr::Return { src })
    }

    pub fn ret_null(&mut self) -> &mut Self {
        self.emit(Instr::ReturnNull)
    }

    pub fn mov(&mut self, dst: Reg, src: Reg) -> &mut Self {
        self.emit(Instr::Move { dst, src })
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.emit_jump(Instr::Jump { target: 0 }, label)
    }

    pub fn jump_if_truthy(&mut self, cond: Reg, label: Label) -> &mut Self {
        self.emit_jump(Instr::JumpIfTruthy { cond, target: 0 }, label)
    }

    pub fn jump_if_falsy(&mut self, cond: Reg, label: Label) -> &mut Self {
        self.emit_jump(Instr::JumpIfFalsy { cond, target: 0 }, label)
    }

    pub fn jump_if_non_null(&mut self, cond: Reg, label: Label) -> &mut Self {
        self.emit_jump(Instr::JumpIfNonNull { cond, target: 0 }, label)
    }

    /// Loads `value` using the cheapest encoding: null, bool and small
    /// non-negative numbers are immediates, the rest go to the literal pool.
    pub fn value(&mut self, dst: Reg, value: Value) -> &mut Self {
        match value {
            Value::Null => self.emit(Instr::ValueNull { dst }),
            Value::Bool(b) => self.emit(Instr::ValueBool { dst, value: b }),
            Value::Num(n) if (0..=u8::MAX as i32).contains(&n) => self.emit(Instr::ValueSmallInt {
                dst,
                value: n as u8,
            }),
            _ => match self.literal(value) {
                Some(literal) => self.emit(Instr::Value { dst, literal }),
                None => {
                    self.fail_with(BuildError::TooManyLiterals);
                    self
                }
            },
        }
    }

    /// Index of `value` in the literal pool, added when first seen.
    fn literal(&mut self, value: Value) -> Option<u8> {
        if let Some(i) = self.literals.iter().position(|v| *v == value) {
            return Some(i as u8);
        }
        if self.literals.len() > u8::MAX as usize {
            return None;
        }
        self.literals.push(value);
        Some((self.literals.len() - 1) as u8)
    }

    pub fn mem_load(&mut self, dst: Reg, key: u32) -> &mut Self {
        self.emit(Instr::MemLoad { dst, key })
    }

    pub fn mem_store(&mut self, src: Reg, key: u32) -> &mut Self {
        self.emit(Instr::MemStore { src, key })
    }

    pub fn mem_load_dyn(&mut self, dst: Reg) -> &mut Self {
        self.emit(Instr::MemLoadDyn { dst })
    }

    pub fn mem_store_dyn(&mut self, src: Reg, key: Reg) -> &mut Self {
        self.emit(Instr::MemStoreDyn { src, key })
    }

    pub fn extern_call(&mut self, dst: Reg, func: u16, args: Reg, count: u8) -> &mut Self {
        self.emit(Instr::Extern {
            dst,
            func,
            args,
            count,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, dst: Reg) -> &mut Self {
        self.emit(Instr::Unary { op, dst })
    }

    pub fn binary(&mut self, op: BinaryOp, dst: Reg, src: Reg) -> &mut Self {
        self.emit(Instr::Binary { op, dst, src })
    }

    pub fn build(self) -> Result<Program, BuildError> {
        let ProgramBuilder {
            mut code,
            literals,
            locations,
            labels,
            fixups,
            binder_hash,
            error,
        } = self;

        if let Some(error) = error {
            return Err(error);
        }
        if code.len() > u16::MAX as usize {
            return Err(BuildError::CodeTooLarge(code.len()));
        }
        for (at, label) in fixups {
            let target = labels
                .get(label.0)
                .ok_or(BuildError::UnknownLabel(label.0))?
                .ok_or(BuildError::LabelNotPlaced(label.0))?;
            code[at..at + 2].copy_from_slice(&(target as u16).to_le_bytes());
        }
        Ok(Program::new(code, literals, locations, binder_hash))
    }
}

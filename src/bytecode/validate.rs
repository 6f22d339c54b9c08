//! Structural validation of a [`Program`] against a [`Binder`].
//!
//! Everything the VM relies on without re-checking is verified here once:
//! every instruction decodes, register operands fit the register file, jump
//! targets land on instruction starts and execution can never run past the
//! end of the code.

use thiserror::Error;
use tracing::debug;

use crate::runtime::binder::{Binder, BinderFlags};

use super::instr::{DecodeError, Instr, Instrs};
use super::op::{REGISTER_COUNT, Reg};
use super::program::Program;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("binder hash mismatch: program {program:016x}, binder {binder:016x}")]
    BinderHashMismatch { program: u64, binder: u64 },
    #[error("program has no code")]
    EmptyCode,
    #[error("code size {0} exceeds 65535 bytes")]
    CodeTooLarge(usize),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("register {reg} out of bounds at offset {offset}")]
    InvalidRegister { offset: usize, reg: u8 },
    #[error("extern argument window {args}..+{count} out of bounds at offset {offset}")]
    InvalidArgWindow { offset: usize, args: u8, count: u8 },
    #[error("literal {index} out of bounds ({count} literals) at offset {offset}")]
    LiteralOutOfBounds {
        offset: usize,
        index: u8,
        count: usize,
    },
    #[error("jump target {target} out of bounds at offset {offset}")]
    JumpOutOfBounds { offset: usize, target: u16 },
    #[error("jump target {target} is not an instruction start at offset {offset}")]
    JumpMisaligned { offset: usize, target: u16 },
    #[error("unknown binder function {func} at offset {offset}")]
    UnknownFunction { offset: usize, func: u16 },
    #[error("memory access not allowed by binder at offset {offset}")]
    MemoryAccessDisallowed { offset: usize },
    #[error("execution can run past the end of the code (last instruction at {offset})")]
    MissingTerminator { offset: usize },
    #[error("location table not sorted at entry {index}")]
    LocationsUnsorted { index: usize },
}

/// A program that passed validation against `binder`.
///
/// The only way to obtain one is [`validate`]; the VM only runs these.
pub struct ValidProgram<'a, C> {
    program: &'a Program,
    binder: &'a Binder<C>,
}

impl<'a, C> ValidProgram<'a, C> {
    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn binder(&self) -> &'a Binder<C> {
        self.binder
    }
}

impl<C> Clone for ValidProgram<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ValidProgram<'_, C> {}

impl<C> std::fmt::Debug for ValidProgram<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidProgram")
            .field("code_size", &self.program.code().len())
            .field("binder", &self.binder.name())
            .finish()
    }
}

pub fn validate<'a, C>(
    program: &'a Program,
    binder: &'a Binder<C>,
) -> Result<ValidProgram<'a, C>, ValidateError> {
    match check(program, binder) {
        Ok(()) => Ok(ValidProgram { program, binder }),
        Err(e) => {
            debug!(binder = binder.name(), error = %e, "program validation failed");
            Err(e)
        }
    }
}

fn check<C>(program: &Program, binder: &Binder<C>) -> Result<(), ValidateError> {
    if program.binder_hash() != binder.hash() {
        return Err(ValidateError::BinderHashMismatch {
            program: program.binder_hash(),
            binder: binder.hash(),
        });
    }

    let code = program.code();
    if code.is_empty() {
        return Err(ValidateError::EmptyCode);
    }
    if code.len() > u16::MAX as usize {
        return Err(ValidateError::CodeTooLarge(code.len()));
    }

    for (index, pair) in program.locations().windows(2).enumerate() {
        if pair[1].offset < pair[0].offset {
            return Err(ValidateError::LocationsUnsorted { index: index + 1 });
        }
    }

    let memory_allowed = !binder.flags().contains(BinderFlags::DISALLOW_MEMORY_ACCESS);
    let mut starts = vec![false; code.len()];
    let mut jumps = Vec::new();
    let mut last = None;

    for item in Instrs::new(code) {
        let (offset, instr) = item?;
        starts[offset] = true;
        last = Some((offset, instr));

        check_registers(offset, &instr)?;

        if !memory_allowed && instr.opcode().is_memory_access() {
            return Err(ValidateError::MemoryAccessDisallowed { offset });
        }
        if let Some(target) = instr.target() {
            jumps.push((offset, target));
        }

        match instr {
            Instr::Value { literal, .. } if literal as usize >= program.literals().len() => {
                return Err(ValidateError::LiteralOutOfBounds {
                    offset,
                    index: literal,
                    count: program.literals().len(),
                });
            }
            Instr::Extern {
                func, args, count, ..
            } => {
                if args.index() + count as usize > REGISTER_COUNT {
                    return Err(ValidateError::InvalidArgWindow {
                        offset,
                        args: args.0,
                        count,
                    });
                }
                if binder.func(func).is_none() {
                    return Err(ValidateError::UnknownFunction { offset, func });
                }
            }
            _ => {}
        }
    }

    for (offset, target) in jumps {
        match starts.get(target as usize) {
            None => return Err(ValidateError::JumpOutOfBounds { offset, target }),
            Some(false) => return Err(ValidateError::JumpMisaligned { offset, target }),
            Some(true) => {}
        }
    }

    match last {
        Some((_, instr)) if instr.opcode().is_terminator() => Ok(()),
        Some((offset, _)) => Err(ValidateError::MissingTerminator { offset }),
        None => Err(ValidateError::EmptyCode),
    }
}

fn check_registers(offset: usize, instr: &Instr) -> Result<(), ValidateError> {
    match instr.registers().into_iter().find(|r: &Reg| !r.is_valid()) {
        Some(reg) => Err(ValidateError::InvalidRegister { offset, reg: reg.0 }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instr::BinaryOp;
    use crate::bytecode::op::OpCode;
    use crate::bytecode::program::{ProgramLoc, SourceRange};
    use crate::lang::types::TypeMask;
    use crate::lang::value::Value;
    use crate::runtime::binder::{BinderBuilder, BinderSig};

    fn empty_binder() -> Binder<()> {
        BinderBuilder::new("empty").finalize().unwrap()
    }

    fn one_func_binder(flags: BinderFlags) -> Binder<()> {
        let mut b = BinderBuilder::new("one").flags(flags);
        b.declare("f", "", BinderSig::new(TypeMask::ANY), |_, _| Ok(Value::Null));
        b.finalize().unwrap()
    }

    fn program(binder: &Binder<()>, instrs: &[Instr], literals: Vec<Value>) -> Program {
        let mut code = Vec::new();
        for instr in instrs {
            instr.encode(&mut code);
        }
        Program::new(code, literals, Vec::new(), binder.hash())
    }

    fn assert_invalid(program: &Program, binder: &Binder<()>, expected: ValidateError) {
        match validate(program, binder) {
            Err(e) => assert_eq!(e, expected),
            Ok(_) => panic!("expected {:?}", expected),
        }
    }

    #[test]
    fn test_valid_program() {
        let binder = empty_binder();
        let p = program(
            &binder,
            &[
                Instr::ValueSmallInt {
                    dst: Reg(0),
                    value: 1,
                },
                Instr::Return { src: Reg(0) },
            ],
            vec![],
        );
        assert!(validate(&p, &binder).is_ok());
    }

    #[test]
    fn test_hash_mismatch() {
        let binder = empty_binder();
        let other = one_func_binder(BinderFlags::NONE);
        let p = program(&other, &[Instr::ReturnNull], vec![]);
        assert_invalid(
            &p,
            &binder,
            ValidateError::BinderHashMismatch {
                program: other.hash(),
                binder: binder.hash(),
            },
        );
    }

    #[test]
    fn test_empty_code() {
        let binder = empty_binder();
        let p = program(&binder, &[], vec![]);
        assert_invalid(&p, &binder, ValidateError::EmptyCode);
    }

    #[test]
    fn test_invalid_register() {
        let binder = empty_binder();
        let p = program(
            &binder,
            &[
                Instr::Binary {
                    op: BinaryOp::Add,
                    dst: Reg(0),
                    src: Reg(38),
                },
                Instr::ReturnNull,
            ],
            vec![],
        );
        assert_invalid(
            &p,
            &binder,
            ValidateError::InvalidRegister { offset: 0, reg: 38 },
        );
    }

    #[test]
    fn test_literal_out_of_bounds() {
        let binder = empty_binder();
        let p = program(
            &binder,
            &[
                Instr::Value {
                    dst: Reg(0),
                    literal: 1,
                },
                Instr::Return { src: Reg(0) },
            ],
            vec![Value::num(1)],
        );
        assert_invalid(
            &p,
            &binder,
            ValidateError::LiteralOutOfBounds {
                offset: 0,
                index: 1,
                count: 1,
            },
        );
    }

    #[test]
    fn test_jump_targets() {
        let binder = empty_binder();
        let out_of_bounds = program(&binder, &[Instr::Jump { target: 3 }], vec![]);
        assert_invalid(
            &out_of_bounds,
            &binder,
            ValidateError::JumpOutOfBounds {
                offset: 0,
                target: 3,
            },
        );

        // Target 1 is inside the jump itself.
        let misaligned = program(
            &binder,
            &[Instr::Jump { target: 1 }, Instr::ReturnNull],
            vec![],
        );
        assert_invalid(
            &misaligned,
            &binder,
            ValidateError::JumpMisaligned {
                offset: 0,
                target: 1,
            },
        );

        let looping = program(&binder, &[Instr::Jump { target: 0 }], vec![]);
        assert!(validate(&looping, &binder).is_ok());
    }

    #[test]
    fn test_extern_checks() {
        let binder = one_func_binder(BinderFlags::NONE);
        let unknown = program(
            &binder,
            &[
                Instr::Extern {
                    dst: Reg(0),
                    func: 1,
                    args: Reg(0),
                    count: 0,
                },
                Instr::ReturnNull,
            ],
            vec![],
        );
        assert_invalid(
            &unknown,
            &binder,
            ValidateError::UnknownFunction { offset: 0, func: 1 },
        );

        let window = program(
            &binder,
            &[
                Instr::Extern {
                    dst: Reg(0),
                    func: 0,
                    args: Reg(30),
                    count: 9,
                },
                Instr::ReturnNull,
            ],
            vec![],
        );
        assert_invalid(
            &window,
            &binder,
            ValidateError::InvalidArgWindow {
                offset: 0,
                args: 30,
                count: 9,
            },
        );
    }

    #[test]
    fn test_memory_access_disallowed() {
        let instrs = [
            Instr::MemLoad {
                dst: Reg(0),
                key: 1,
            },
            Instr::Return { src: Reg(0) },
        ];

        let open = one_func_binder(BinderFlags::NONE);
        assert!(validate(&program(&open, &instrs, vec![]), &open).is_ok());

        let locked = one_func_binder(BinderFlags::DISALLOW_MEMORY_ACCESS);
        assert_invalid(
            &program(&locked, &instrs, vec![]),
            &locked,
            ValidateError::MemoryAccessDisallowed { offset: 0 },
        );
    }

    #[test]
    fn test_missing_terminator() {
        let binder = empty_binder();
        let p = program(&binder, &[Instr::ValueNull { dst: Reg(0) }], vec![]);
        assert_invalid(&p, &binder, ValidateError::MissingTerminator { offset: 0 });
    }

    #[test]
    fn test_decode_errors_surface() {
        let binder = empty_binder();
        let p = Program::new(vec![OpCode::Return as u8], vec![], vec![], binder.hash());
        assert_invalid(
            &p,
            &binder,
            ValidateError::Decode(DecodeError::Truncated {
                offset: 0,
                opcode: OpCode::Return,
            }),
        );
    }

    #[test]
    fn test_unsorted_locations() {
        let binder = empty_binder();
        let range = SourceRange::default();
        let p = Program::new(
            vec![OpCode::ReturnNull as u8],
            vec![],
            vec![
                ProgramLoc { offset: 4, range },
                ProgramLoc { offset: 2, range },
            ],
            binder.hash(),
        );
        assert_invalid(&p, &binder, ValidateError::LocationsUnsorted { index: 1 });
    }
}

//! Register machine that evaluates validated programs.
//!
//! One evaluation owns a fresh register file and borrows the memory store
//! and the host context. A [`Panic`] raised anywhere during dispatch ends
//! the evaluation; [`Vm::step`] is the single place that catches it.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::bytecode::instr::{BinaryOp, Instr, UnaryOp};
use crate::bytecode::op::{REGISTER_COUNT, Reg};
use crate::bytecode::validate::ValidProgram;
use crate::lang::value::Value;

use super::memory::{Memory, dyn_key};
use super::panic::{Panic, PanicKind};

/// What `Fail` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailPolicy {
    /// Panic with `ExecutionFailed`.
    #[default]
    Panic,
    /// Return null as if the program ended with `ReturnNull`.
    ReturnNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub max_executed_ops: u32,
    pub fail_policy: FailPolicy,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_executed_ops: 25_000,
            fail_policy: FailPolicy::Panic,
        }
    }
}

/// Terminal result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalResult {
    Returned { value: Value, executed_ops: u32 },
    Panicked { panic: Panic, executed_ops: u32 },
}

impl EvalResult {
    pub fn executed_ops(&self) -> u32 {
        match self {
            EvalResult::Returned { executed_ops, .. } | EvalResult::Panicked { executed_ops, .. } => {
                *executed_ops
            }
        }
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            EvalResult::Returned { value, .. } => Some(*value),
            EvalResult::Panicked { .. } => None,
        }
    }

    pub fn panic(&self) -> Option<&Panic> {
        match self {
            EvalResult::Panicked { panic, .. } => Some(panic),
            EvalResult::Returned { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<Value, Panic> {
        match self {
            EvalResult::Returned { value, .. } => Ok(value),
            EvalResult::Panicked { panic, .. } => Err(panic),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmState {
    Ready,
    Running,
    Returned { value: Value, executed_ops: u32 },
    Panicked { panic: Panic, executed_ops: u32 },
}

impl VmState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VmState::Returned { .. } | VmState::Panicked { .. })
    }
}

// =============================================================================
// VM
// =============================================================================

pub struct Vm<'p, 'r, C, M: Memory + ?Sized> {
    program: ValidProgram<'p, C>,
    mem: &'r mut M,
    ctx: &'r mut C,
    config: VmConfig,
    regs: [Value; REGISTER_COUNT],
    ip: usize,
    executed_ops: u32,
    state: VmState,
}

impl<'p, 'r, C, M: Memory + ?Sized> Vm<'p, 'r, C, M> {
    pub fn new(
        program: ValidProgram<'p, C>,
        mem: &'r mut M,
        ctx: &'r mut C,
        config: VmConfig,
    ) -> Self {
        Vm {
            program,
            mem,
            ctx,
            config,
            regs: [Value::Null; REGISTER_COUNT],
            ip: 0,
            executed_ops: 0,
            state: VmState::Ready,
        }
    }

    pub fn state(&self) -> &VmState {
        &self.state
    }

    pub fn registers(&self) -> &[Value] {
        &self.regs
    }

    /// Offset of the next instruction.
    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn executed_ops(&self) -> u32 {
        self.executed_ops
    }

    /// Executes one instruction. Does nothing once the state is terminal.
    pub fn step(&mut self) -> &VmState {
        match self.state {
            VmState::Ready => {
                debug!(
                    binder = self.program.binder().name(),
                    code_size = self.program.program().code().len(),
                    max_ops = self.config.max_executed_ops,
                    "evaluation started"
                );
                self.state = VmState::Running;
            }
            VmState::Running => {}
            VmState::Returned { .. } | VmState::Panicked { .. } => return &self.state,
        }

        let offset = self.ip;
        match self.dispatch() {
            Ok(None) => {}
            Ok(Some(value)) => {
                debug!(executed_ops = self.executed_ops, "evaluation returned");
                self.state = VmState::Returned {
                    value,
                    executed_ops: self.executed_ops,
                };
            }
            Err(mut panic) => {
                if panic.range.is_none() {
                    panic.range = self.program.program().location(offset);
                }
                warn!(
                    offset,
                    executed_ops = self.executed_ops,
                    panic = %panic.render(true),
                    "evaluation panicked"
                );
                self.state = VmState::Panicked {
                    panic,
                    executed_ops: self.executed_ops,
                };
            }
        }
        &self.state
    }

    pub fn run(mut self) -> EvalResult {
        loop {
            match self.step() {
                VmState::Returned {
                    value,
                    executed_ops,
                } => {
                    return EvalResult::Returned {
                        value: *value,
                        executed_ops: *executed_ops,
                    };
                }
                VmState::Panicked {
                    panic,
                    executed_ops,
                } => {
                    return EvalResult::Panicked {
                        panic: panic.clone(),
                        executed_ops: *executed_ops,
                    };
                }
                VmState::Ready | VmState::Running => {}
            }
        }
    }

    fn reg(&self, r: Reg) -> Value {
        self.regs[r.index()]
    }

    fn set(&mut self, r: Reg, value: Value) {
        self.regs[r.index()] = value;
    }

    /// Returns `Some` when the program returned.
    fn dispatch(&mut self) -> Result<Option<Value>, Panic> {
        if self.executed_ops >= self.config.max_executed_ops {
            return Err(Panic::new(PanicKind::ExecutionLimitExceeded));
        }
        self.executed_ops += 1;

        let program = self.program.program();
        let offset = self.ip;
        let instr = Instr::decode_at(program.code(), offset)
            .map_err(|_| Panic::new(PanicKind::ExecutionFailed))?;
        trace!(offset, op = %instr.opcode(), "dispatch");
        self.ip = offset + instr.size();

        match instr {
            Instr::Fail => {
                return match self.config.fail_policy {
                    FailPolicy::Panic => Err(Panic::new(PanicKind::ExecutionFailed)),
                    FailPolicy::ReturnNull => Ok(Some(Value::Null)),
                };
            }
            Instr::Assert { src } => {
                if self.reg(src).falsy() {
                    return Err(Panic::new(PanicKind::AssertionFailed));
                }
            }
            Instr::Return { src } => return Ok(Some(self.reg(src))),
            Instr::ReturnNull => return Ok(Some(Value::Null)),
            Instr::Move { dst, src } => {
                let value = self.reg(src);
                self.set(dst, value);
            }

            Instr::Jump { target } => self.ip = target as usize,
            Instr::JumpIfTruthy { cond, target } => {
                if self.reg(cond).truthy() {
                    self.ip = target as usize;
                }
            }
            Instr::JumpIfFalsy { cond, target } => {
                if self.reg(cond).falsy() {
                    self.ip = target as usize;
                }
            }
            Instr::JumpIfNonNull { cond, target } => {
                if self.reg(cond).non_null() {
                    self.ip = target as usize;
                }
            }

            Instr::Value { dst, literal } => {
                let value = program
                    .literals()
                    .get(literal as usize)
                    .copied()
                    .ok_or(Panic::new(PanicKind::ExecutionFailed))?;
                self.set(dst, value);
            }
            Instr::ValueNull { dst } => self.set(dst, Value::Null),
            Instr::ValueBool { dst, value } => self.set(dst, Value::bool(value)),
            Instr::ValueSmallInt { dst, value } => self.set(dst, Value::num(value as i32)),

            Instr::MemLoad { dst, key } => {
                let value = self.mem.load(key);
                self.set(dst, value);
            }
            Instr::MemStore { src, key } => {
                let value = self.reg(src);
                self.mem.store(key, value);
            }
            Instr::MemLoadDyn { dst } => {
                let value = match dyn_key(self.reg(dst)) {
                    Some(key) => self.mem.load(key),
                    None => Value::Null,
                };
                self.set(dst, value);
            }
            Instr::MemStoreDyn { src, key } => {
                let value = self.reg(src);
                if let Some(key) = dyn_key(self.reg(key)) {
                    self.mem.store(key, value);
                }
            }

            Instr::Extern {
                dst,
                func,
                args,
                count,
            } => {
                let window = args.index()..args.index() + count as usize;
                let binder = self.program.binder();
                let window = &mut self.regs[window];
                let result = binder.invoke(self.ctx, func, window, offset as u32)?;
                self.set(dst, result);
            }

            Instr::Unary { op, dst } => {
                let value = unary(op, self.reg(dst));
                self.set(dst, value);
            }
            Instr::Binary { op, dst, src } => {
                let value = binary(op, self.reg(dst), self.reg(src));
                self.set(dst, value);
            }
        }
        Ok(None)
    }
}

fn unary(op: UnaryOp, v: Value) -> Value {
    match op {
        UnaryOp::Truthy => v.truthy_as_val(),
        UnaryOp::Falsy => v.falsy_as_val(),
        UnaryOp::NonNull => v.non_null_as_val(),
        UnaryOp::Type => v.type_of(),
        UnaryOp::Hash => v.hash_of(),
        UnaryOp::Negate => v.neg(),
        UnaryOp::Invert => v.inv(),
        UnaryOp::Absolute => v.abs(),
        UnaryOp::RangeMin => v.range_min(),
        UnaryOp::RangeMax => v.range_max(),
    }
}

fn binary(op: BinaryOp, a: Value, b: Value) -> Value {
    match op {
        BinaryOp::Equal => a.equal_as_val(&b),
        BinaryOp::Less => a.less_as_val(&b),
        BinaryOp::Greater => a.greater_as_val(&b),
        BinaryOp::Add => a.add(&b),
        BinaryOp::Sub => a.sub(&b),
        BinaryOp::Mul => a.mul(&b),
        BinaryOp::Div => a.div(&b),
        BinaryOp::Mod => a.rem(&b),
        BinaryOp::RangeFromTo => Value::range_from_to(&a, &b),
        BinaryOp::Clamp => a.clamp(&b),
        BinaryOp::Contains => a.contains(&b),
        BinaryOp::Min => a.min(&b),
        BinaryOp::Max => a.max(&b),
    }
}

/// Runs `program` to completion.
pub fn eval<C, M: Memory + ?Sized>(
    program: ValidProgram<'_, C>,
    mem: &mut M,
    ctx: &mut C,
    config: VmConfig,
) -> EvalResult {
    Vm::new(program, mem, ctx, config).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::builder::ProgramBuilder;
    use crate::bytecode::program::{Program, SourceRange};
    use crate::bytecode::validate::validate;
    use crate::lang::hash::string_hash;
    use crate::lang::types::{TypeMask, ValueType};
    use crate::runtime::binder::{Binder, BinderBuilder, BinderSig};
    use crate::runtime::memory::ScriptMem;

    #[derive(Default)]
    struct Calls {
        seen: Vec<(Vec<Value>, u32)>,
    }

    fn test_binder() -> Binder<Calls> {
        let mut b = BinderBuilder::new("vm-test");
        b.declare(
            "record",
            "",
            BinderSig::new(TypeMask::NUM).arg("values", TypeMask::ANY),
            |ctx: &mut Calls, call| {
                ctx.seen.push((call.args().to_vec(), call.call_id()));
                Ok(Value::num(call.count() as i32))
            },
        );
        b.declare(
            "need_num",
            "",
            BinderSig::new(TypeMask::NUM).arg("n", TypeMask::NUM),
            |_, call| Ok(Value::num(call.num(0)?)),
        );
        b.finalize().unwrap()
    }

    fn run_with(program: &Program, mem: &mut ScriptMem, config: VmConfig) -> EvalResult {
        let binder = test_binder();
        let valid = validate(program, &binder).unwrap();
        eval(valid, mem, &mut Calls::default(), config)
    }

    fn run(program: &Program) -> EvalResult {
        run_with(program, &mut ScriptMem::new(), VmConfig::default())
    }

    fn builder() -> ProgramBuilder {
        ProgramBuilder::new(test_binder().hash())
    }

    #[test]
    fn test_add_and_return() {
        let mut b = builder();
        b.value(Reg(0), Value::num(41))
            .value(Reg(1), Value::num(1))
            .binary(BinaryOp::Add, Reg(0), Reg(1))
            .ret(Reg(0));
        let result = run(&b.build().unwrap());
        assert_eq!(
            result,
            EvalResult::Returned {
                value: Value::num(42),
                executed_ops: 4
            }
        );
    }

    #[test]
    fn test_countdown_loop() {
        let mut b = builder();
        let top = b.label();
        let done = b.label();
        b.value(Reg(0), Value::num(5))
            .value(Reg(1), Value::num(0))
            .value(Reg(2), Value::num(1))
            .place(top)
            .mov(Reg(3), Reg(0))
            .jump_if_falsy(Reg(3), done)
            .binary(BinaryOp::Sub, Reg(0), Reg(2))
            .binary(BinaryOp::Add, Reg(1), Reg(2))
            .jump(top)
            .place(done)
            .ret(Reg(1));
        assert_eq!(run(&b.build().unwrap()).value(), Some(Value::num(5)));
    }

    #[test]
    fn test_fail_policy() {
        let mut b = builder();
        b.fail();
        let program = b.build().unwrap();

        let result = run(&program);
        assert_eq!(result.panic().map(|p| p.kind), Some(PanicKind::ExecutionFailed));

        let config = VmConfig {
            fail_policy: FailPolicy::ReturnNull,
            ..VmConfig::default()
        };
        let result = run_with(&program, &mut ScriptMem::new(), config);
        assert_eq!(result.value(), Some(Value::Null));
    }

    #[test]
    fn test_assert() {
        let mut b = builder();
        b.value(Reg(0), Value::bool(true))
            .assert(Reg(0))
            .value(Reg(0), Value::Null)
            .assert(Reg(0))
            .ret_null();
        let result = run(&b.build().unwrap());
        assert_eq!(result.panic().map(|p| p.kind), Some(PanicKind::AssertionFailed));
        assert_eq!(result.executed_ops(), 4);
    }

    #[test]
    fn test_execution_limit() {
        let mut b = builder();
        let top = b.label();
        b.place(top).jump(top);
        let config = VmConfig {
            max_executed_ops: 100,
            ..VmConfig::default()
        };
        let result = run_with(&b.build().unwrap(), &mut ScriptMem::new(), config);

        assert_eq!(
            result.panic().map(|p| p.kind),
            Some(PanicKind::ExecutionLimitExceeded)
        );
        assert_eq!(result.executed_ops(), 100);
    }

    #[test]
    fn test_budget_counts_the_returning_op() {
        let mut b = builder();
        b.value(Reg(0), Value::num(1)).ret(Reg(0));
        let program = b.build().unwrap();

        let exact = VmConfig {
            max_executed_ops: 2,
            ..VmConfig::default()
        };
        assert_eq!(
            run_with(&program, &mut ScriptMem::new(), exact).value(),
            Some(Value::num(1))
        );

        let short = VmConfig {
            max_executed_ops: 1,
            ..VmConfig::default()
        };
        let result = run_with(&program, &mut ScriptMem::new(), short);
        assert_eq!(
            result.panic().map(|p| p.kind),
            Some(PanicKind::ExecutionLimitExceeded)
        );
    }

    #[test]
    fn test_static_memory() {
        let key = string_hash("hp");
        let mut mem = ScriptMem::new();
        mem.store(key, Value::num(10));

        let mut b = builder();
        b.mem_load(Reg(0), key)
            .value(Reg(1), Value::num(5))
            .binary(BinaryOp::Sub, Reg(0), Reg(1))
            .mem_store(Reg(0), key)
            .ret(Reg(0));
        let result = run_with(&b.build().unwrap(), &mut mem, VmConfig::default());

        assert_eq!(result.value(), Some(Value::num(5)));
        assert_eq!(mem.load(key), Value::num(5));
    }

    #[test]
    fn test_dynamic_memory() {
        let key = string_hash("score");
        let mut mem = ScriptMem::new();

        let mut b = builder();
        b.value(Reg(0), Value::num(7))
            .value(Reg(1), Value::str(key))
            .mem_store_dyn(Reg(0), Reg(1))
            .mem_load_dyn(Reg(1))
            .ret(Reg(1));
        let result = run_with(&b.build().unwrap(), &mut mem, VmConfig::default());

        assert_eq!(result.value(), Some(Value::num(7)));
        assert_eq!(mem.load(key), Value::num(7));
    }

    #[test]
    fn test_dynamic_memory_without_key() {
        let mut mem = ScriptMem::new();
        let mut b = builder();
        b.value(Reg(0), Value::num(7))
            .value(Reg(1), Value::num(3))
            .mem_store_dyn(Reg(0), Reg(1))
            .mem_load_dyn(Reg(1))
            .ret(Reg(1));
        let result = run_with(&b.build().unwrap(), &mut mem, VmConfig::default());

        assert_eq!(result.value(), Some(Value::Null));
        assert!(mem.is_empty());
    }

    #[test]
    fn test_extern_sees_argument_window() {
        let binder = test_binder();
        let record = binder.lookup("record").unwrap();

        let mut b = ProgramBuilder::new(binder.hash());
        b.value(Reg(4), Value::num(1))
            .value(Reg(5), Value::bool(false))
            .value(Reg(6), Value::num(9));
        let call_offset = b.offset();
        b.extern_call(Reg(0), record, Reg(4), 2).ret(Reg(0));
        let program = b.build().unwrap();

        let mut calls = Calls::default();
        let valid = validate(&program, &binder).unwrap();
        let result = eval(valid, &mut ScriptMem::new(), &mut calls, VmConfig::default());

        assert_eq!(result.value(), Some(Value::num(2)));
        assert_eq!(
            calls.seen,
            vec![(vec![Value::num(1), Value::bool(false)], call_offset as u32)]
        );
    }

    #[test]
    fn test_extern_panic_gets_location() {
        let binder = test_binder();
        let need_num = binder.lookup("need_num").unwrap();

        let mut b = ProgramBuilder::new(binder.hash());
        b.value(Reg(1), Value::bool(true))
            .location(SourceRange::new((2, 4), (2, 16)))
            .extern_call(Reg(0), need_num, Reg(1), 1)
            .ret(Reg(0));
        let result = run(&b.build().unwrap());
        let panic = result.panic().unwrap();

        assert_eq!(panic.kind, PanicKind::ArgumentTypeMismatch);
        assert_eq!(panic.arg_index, Some(0));
        assert_eq!(panic.type_actual, Some(ValueType::Bool));
        assert_eq!(panic.range, Some(SourceRange::new((2, 4), (2, 16))));
        assert_eq!(
            panic.render(true),
            "3:5-3:17: Argument 0 expected 'num' got 'bool'"
        );
    }

    #[test]
    fn test_unary_and_range_ops() {
        let mut b = builder();
        b.value(Reg(0), Value::num(2))
            .value(Reg(1), Value::num(8))
            .binary(BinaryOp::RangeFromTo, Reg(0), Reg(1))
            .value(Reg(2), Value::num(20))
            .binary(BinaryOp::Clamp, Reg(2), Reg(0))
            .unary(UnaryOp::Negate, Reg(2))
            .ret(Reg(2));
        assert_eq!(run(&b.build().unwrap()).value(), Some(Value::num(-8)));
    }

    #[test]
    fn test_step_transitions() {
        let binder = test_binder();
        let mut b = ProgramBuilder::new(binder.hash());
        b.value(Reg(0), Value::num(3)).ret(Reg(0));
        let program = b.build().unwrap();
        let valid = validate(&program, &binder).unwrap();

        let mut mem = ScriptMem::new();
        let mut ctx = Calls::default();
        let mut vm = Vm::new(valid, &mut mem, &mut ctx, VmConfig::default());
        assert_eq!(vm.state(), &VmState::Ready);

        assert_eq!(vm.step(), &VmState::Running);
        assert_eq!(vm.registers()[0], Value::num(3));
        assert_eq!(vm.ip(), 3);

        let done = VmState::Returned {
            value: Value::num(3),
            executed_ops: 2,
        };
        assert_eq!(vm.step(), &done);
        assert_eq!(vm.step(), &done);
        assert_eq!(vm.executed_ops(), 2);
    }

    #[test]
    fn test_registers_start_null() {
        let mut b = builder();
        b.ret(Reg(37));
        assert_eq!(run(&b.build().unwrap()).value(), Some(Value::Null));
    }

    #[test]
    fn test_config_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.max_executed_ops, 25_000);
        assert_eq!(config.fail_policy, FailPolicy::Panic);
    }
}

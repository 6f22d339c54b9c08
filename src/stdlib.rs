//! Stock binder used by the `cinder` command line tool.
//!
//! Small on purpose: enough host functions to exercise every accessor
//! family, plus a demo program compiled against it.

use thiserror::Error;

use crate::bytecode::builder::{BuildError, ProgramBuilder};
use crate::bytecode::instr::BinaryOp;
use crate::bytecode::op::Reg;
use crate::bytecode::program::{Program, SourceRange};
use crate::lang::hash::string_hash;
use crate::lang::strings::StringTable;
use crate::lang::types::TypeMask;
use crate::lang::value::Value;
use crate::runtime::args::BinderCall;
use crate::runtime::binder::{Binder, BinderBuilder, BinderError, BinderFlags, BinderSig};
use crate::runtime::enums::ScriptEnum;
use crate::runtime::panic::{Panic, PanicKind};

/// Strings the stock binder and the demo program refer to.
const KNOWN_STRINGS: &[&str] = &["x", "y", "z", "counter", "total"];

/// Host state handed to every stock function.
#[derive(Debug)]
pub struct StdContext {
    pub strings: StringTable,
    /// Lines written by `print`, in call order.
    pub output: Vec<String>,
    axes: ScriptEnum,
}

impl StdContext {
    pub fn new() -> Self {
        StdContext {
            strings: std_strings(),
            output: Vec::new(),
            axes: ScriptEnum::new().with("x", 0).with("y", 1).with("z", 2),
        }
    }
}

impl Default for StdContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn std_strings() -> StringTable {
    let mut strings = StringTable::new();
    for s in KNOWN_STRINGS {
        strings.intern(s);
    }
    strings
}

#[derive(Debug, Error)]
pub enum StdError {
    #[error("stock binder has no function `{0}`")]
    MissingFunction(&'static str),
    #[error(transparent)]
    Build(#[from] BuildError),
}

// =============================================================================
// Functions
// =============================================================================

fn print(ctx: &mut StdContext, call: &mut BinderCall<'_>) -> Result<Value, Panic> {
    let line = call
        .args()
        .iter()
        .map(|v| v.display(&ctx.strings).to_string())
        .collect::<Vec<_>>()
        .join(" ");
    ctx.output.push(line);
    Ok(Value::Null)
}

fn expect_eq(_: &mut StdContext, call: &mut BinderCall<'_>) -> Result<Value, Panic> {
    let expected = call.any(0)?;
    let actual = call.any(1)?;
    if !expected.equal(&actual) {
        return Err(Panic::new(PanicKind::ArgumentInvalid).with_arg(1));
    }
    Ok(Value::Null)
}

/// Percentage interpolation between two numbers.
fn lerp(_: &mut StdContext, call: &mut BinderCall<'_>) -> Result<Value, Panic> {
    let a = call.num(0)? as i64;
    let b = call.num(1)? as i64;
    let t = call.opt_num_clamped(2, 0, 100, 50)? as i64;
    Ok(Value::num((a + (b - a) * t / 100) as i32))
}

fn range_len(_: &mut StdContext, call: &mut BinderCall<'_>) -> Result<Value, Panic> {
    let range = call.num_range(0)?;
    Ok(Value::num(range.extent() as i32))
}

fn axis(ctx: &mut StdContext, call: &mut BinderCall<'_>) -> Result<Value, Panic> {
    Ok(Value::num(call.enum_value(0, &ctx.axes)?))
}

fn pick(_: &mut StdContext, call: &mut BinderCall<'_>) -> Result<Value, Panic> {
    let cond = call.any(0)?;
    let index = if cond.truthy() { 1 } else { 2 };
    Ok(call.opt_any(index, Value::Null))
}

/// Sums every numeric argument; other types count as zero.
fn sum(_: &mut StdContext, call: &mut BinderCall<'_>) -> Result<Value, Panic> {
    let mut total = Value::num(0);
    while call.count() > 0 {
        total = total.add(&Value::num(call.maybe_num(0, 0)));
        call.shift();
    }
    Ok(total)
}

pub fn std_binder() -> Result<Binder<StdContext>, BinderError> {
    std_binder_with(BinderFlags::NONE)
}

pub fn std_binder_with(flags: BinderFlags) -> Result<Binder<StdContext>, BinderError> {
    let mut b = BinderBuilder::new("std").flags(flags);
    b.declare(
        "print",
        "Write all arguments to the output, separated by spaces.",
        BinderSig::new(TypeMask::NULL).arg("values", TypeMask::ANY),
        print,
    )
    .declare(
        "expect_eq",
        "Panic unless both arguments are equal.",
        BinderSig::new(TypeMask::NULL)
            .arg("expected", TypeMask::ANY)
            .arg("actual", TypeMask::ANY),
        expect_eq,
    )
    .declare(
        "lerp",
        "Interpolate from a to b by t percent (default 50).",
        BinderSig::new(TypeMask::NUM)
            .arg("a", TypeMask::NUM)
            .arg("b", TypeMask::NUM)
            .arg("t", TypeMask::NUM | TypeMask::NULL),
        lerp,
    )
    .declare(
        "range_len",
        "Number of steps between the range bounds.",
        BinderSig::new(TypeMask::NUM).arg("range", TypeMask::NUM_RANGE),
        range_len,
    )
    .declare(
        "axis",
        "Index of the named axis: x, y or z.",
        BinderSig::new(TypeMask::NUM).arg("name", TypeMask::STR),
        axis,
    )
    .declare(
        "pick",
        "Second argument when the first is truthy, third otherwise.",
        BinderSig::new(TypeMask::ANY)
            .arg("cond", TypeMask::ANY)
            .arg("then", TypeMask::ANY)
            .arg("else", TypeMask::ANY),
        pick,
    )
    .declare(
        "sum",
        "Add up all numeric arguments.",
        BinderSig::new(TypeMask::NUM).arg("values", TypeMask::ANY),
        sum,
    )
    .declare_unimplemented(
        "spawn",
        "Create an entity of the given kind.",
        BinderSig::new(TypeMask::ID).arg("kind", TypeMask::STR),
    );
    b.finalize()
}

// =============================================================================
// Demo
// =============================================================================

/// Increments `counter` in memory, prints it and returns it plus the index
/// of axis `y`.
pub fn demo_program(binder: &Binder<StdContext>) -> Result<Program, StdError> {
    let func = |name: &'static str| binder.lookup(name).ok_or(StdError::MissingFunction(name));
    let print = func("print")?;
    let axis = func("axis")?;

    let counter = string_hash("counter");
    let mut b = ProgramBuilder::new(binder.hash());
    let have = b.label();

    b.location(SourceRange::new((0, 0), (0, 22)))
        .mem_load(Reg(0), counter)
        .jump_if_non_null(Reg(0), have)
        .value(Reg(0), Value::num(0))
        .place(have)
        .location(SourceRange::new((1, 0), (1, 24)))
        .value(Reg(1), Value::num(1))
        .binary(BinaryOp::Add, Reg(0), Reg(1))
        .mem_store(Reg(0), counter)
        .location(SourceRange::new((2, 0), (2, 21)))
        .value(Reg(2), Value::str(string_hash("total")))
        .mov(Reg(3), Reg(0))
        .extern_call(Reg(4), print, Reg(2), 2)
        .location(SourceRange::new((3, 0), (3, 18)))
        .value(Reg(5), Value::str(string_hash("y")))
        .extern_call(Reg(5), axis, Reg(5), 1)
        .binary(BinaryOp::Add, Reg(0), Reg(5))
        .ret(Reg(0));
    Ok(b.build()?)
}

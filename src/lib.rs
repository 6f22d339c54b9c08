//! # Cinder
//!
//! Embeddable runtime for small compiled scripts: a compact value model,
//! a register bytecode VM with an instruction budget, and a binder through
//! which the host exposes native functions.
//!
//! A typical host builds a [`Binder`](runtime::binder::Binder), validates a
//! [`Program`](bytecode::program::Program) against it and evaluates the
//! result:
//!
//! ```ignore
//! let valid = validate(&program, &binder)?;
//! let result = eval(valid, &mut mem, &mut ctx, VmConfig::default());
//! ```

pub mod bytecode;
pub mod lang;
pub mod runtime;
pub mod stdlib;

pub use bytecode::{Program, ProgramBuilder, ValidProgram, validate};
pub use lang::strings::StringTable;
pub use lang::types::{TypeMask, ValueType};
pub use lang::value::Value;
pub use runtime::{Binder, BinderBuilder, EvalResult, Panic, PanicKind, ScriptMem, VmConfig, eval};

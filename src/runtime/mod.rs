pub mod args;
pub mod binder;
pub mod enums;
pub mod memory;
pub mod panic;
pub mod vm;

pub use args::BinderCall;
pub use binder::{Binder, BinderBuilder, BinderFlags, BinderSig};
pub use memory::{Memory, ScriptMem};
pub use panic::{Panic, PanicKind};
pub use vm::{EvalResult, FailPolicy, Vm, VmConfig, VmState, eval};

//! Program container, instruction encoding, validation, assembly and
//! disassembly.

pub mod builder;
pub mod disasm;
pub mod instr;
pub mod intrinsic;
pub mod op;
pub mod program;
pub mod validate;

pub use builder::{BuildError, Label, ProgramBuilder};
pub use instr::{BinaryOp, Instr, UnaryOp};
pub use op::{OpCode, REGISTER_COUNT, Reg};
pub use program::{LoadError, Program, SourceRange};
pub use validate::{ValidProgram, ValidateError, validate};

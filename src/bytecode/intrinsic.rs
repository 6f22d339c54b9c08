//! Catalog of operator-like constructs a compiler lowers into bytecode.
//!
//! Read-only metadata: arity, how many arguments are evaluated
//! unconditionally, and whether evaluation is free of side effects.

use std::fmt;

use super::op::OpCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Continue,
    Break,
    Return,
    Type,
    Hash,
    Assert,
    MemLoadDynamic,
    MemStoreDynamic,
    Select,
    NullCoalescing,
    LogicAnd,
    LogicOr,
    Loop,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Invert,
    Absolute,
    RangeMin,
    RangeMax,
    RangeFromTo,
    Clamp,
    Contains,
    Min,
    Max,
}

/// How the opcode set expresses an intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lowering {
    /// A single instruction.
    Op(OpCode),
    /// The instruction followed by `Invert`.
    OpInvert(OpCode),
    /// Conditional and unconditional jumps.
    ControlFlow,
}

impl Intrinsic {
    pub const COUNT: usize = 34;

    pub const ALL: [Intrinsic; Self::COUNT] = [
        Intrinsic::Continue,
        Intrinsic::Break,
        Intrinsic::Return,
        Intrinsic::Type,
        Intrinsic::Hash,
        Intrinsic::Assert,
        Intrinsic::MemLoadDynamic,
        Intrinsic::MemStoreDynamic,
        Intrinsic::Select,
        Intrinsic::NullCoalescing,
        Intrinsic::LogicAnd,
        Intrinsic::LogicOr,
        Intrinsic::Loop,
        Intrinsic::Equal,
        Intrinsic::NotEqual,
        Intrinsic::Less,
        Intrinsic::LessOrEqual,
        Intrinsic::Greater,
        Intrinsic::GreaterOrEqual,
        Intrinsic::Add,
        Intrinsic::Sub,
        Intrinsic::Mul,
        Intrinsic::Div,
        Intrinsic::Mod,
        Intrinsic::Negate,
        Intrinsic::Invert,
        Intrinsic::Absolute,
        Intrinsic::RangeMin,
        Intrinsic::RangeMax,
        Intrinsic::RangeFromTo,
        Intrinsic::Clamp,
        Intrinsic::Contains,
        Intrinsic::Min,
        Intrinsic::Max,
    ];

    pub fn arg_count(self) -> u32 {
        use Intrinsic::*;
        match self {
            Continue | Break => 0,
            Return | Assert | MemLoadDynamic | Invert | Absolute | Negate | Type | Hash
            | RangeMin | RangeMax => 1,
            MemStoreDynamic | Add | Div | Equal | Greater | GreaterOrEqual | Less | LessOrEqual
            | LogicAnd | LogicOr | Mod | Mul | NotEqual | NullCoalescing | Sub | Min | Max
            | Clamp | Contains | RangeFromTo => 2,
            Select => 3,
            Loop => 4,
        }
    }

    /// Arguments evaluated on every path; the rest may be skipped.
    pub fn arg_count_always_reached(self) -> u32 {
        match self {
            // condition / lhs
            Intrinsic::Select
            | Intrinsic::NullCoalescing
            | Intrinsic::LogicAnd
            | Intrinsic::LogicOr => 1,
            // setup, condition
            Intrinsic::Loop => 2,
            _ => self.arg_count(),
        }
    }

    pub fn deterministic(self) -> bool {
        !matches!(
            self,
            Intrinsic::Continue
                | Intrinsic::Break
                | Intrinsic::Return
                | Intrinsic::Assert
                | Intrinsic::MemLoadDynamic
                | Intrinsic::MemStoreDynamic
        )
    }

    pub fn lowering(self) -> Lowering {
        use Intrinsic::*;
        match self {
            Continue | Break | Select | NullCoalescing | LogicAnd | LogicOr | Loop => {
                Lowering::ControlFlow
            }
            Return => Lowering::Op(OpCode::Return),
            Assert => Lowering::Op(OpCode::Assert),
            Type => Lowering::Op(OpCode::Type),
            Hash => Lowering::Op(OpCode::Hash),
            MemLoadDynamic => Lowering::Op(OpCode::MemLoadDyn),
            MemStoreDynamic => Lowering::Op(OpCode::MemStoreDyn),
            Equal => Lowering::Op(OpCode::Equal),
            NotEqual => Lowering::OpInvert(OpCode::Equal),
            Less => Lowering::Op(OpCode::Less),
            LessOrEqual => Lowering::OpInvert(OpCode::Greater),
            Greater => Lowering::Op(OpCode::Greater),
            GreaterOrEqual => Lowering::OpInvert(OpCode::Less),
            Add => Lowering::Op(OpCode::Add),
            Sub => Lowering::Op(OpCode::Sub),
            Mul => Lowering::Op(OpCode::Mul),
            Div => Lowering::Op(OpCode::Div),
            Mod => Lowering::Op(OpCode::Mod),
            Negate => Lowering::Op(OpCode::Negate),
            Invert => Lowering::Op(OpCode::Invert),
            Absolute => Lowering::Op(OpCode::Absolute),
            RangeMin => Lowering::Op(OpCode::RangeMin),
            RangeMax => Lowering::Op(OpCode::RangeMax),
            RangeFromTo => Lowering::Op(OpCode::RangeFromTo),
            Clamp => Lowering::Op(OpCode::Clamp),
            Contains => Lowering::Op(OpCode::Contains),
            Min => Lowering::Op(OpCode::Min),
            Max => Lowering::Op(OpCode::Max),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Continue => "continue",
            Intrinsic::Break => "break",
            Intrinsic::Return => "return",
            Intrinsic::Type => "type",
            Intrinsic::Hash => "hash",
            Intrinsic::Assert => "assert",
            Intrinsic::MemLoadDynamic => "mem-load-dynamic",
            Intrinsic::MemStoreDynamic => "mem-store-dynamic",
            Intrinsic::Select => "select",
            Intrinsic::NullCoalescing => "null-coalescing",
            Intrinsic::LogicAnd => "logic-and",
            Intrinsic::LogicOr => "logic-or",
            Intrinsic::Loop => "loop",
            Intrinsic::Equal => "equal",
            Intrinsic::NotEqual => "not-equal",
            Intrinsic::Less => "less",
            Intrinsic::LessOrEqual => "less-or-equal",
            Intrinsic::Greater => "greater",
            Intrinsic::GreaterOrEqual => "greater-or-equal",
            Intrinsic::Add => "add",
            Intrinsic::Sub => "sub",
            Intrinsic::Mul => "mul",
            Intrinsic::Div => "div",
            Intrinsic::Mod => "mod",
            Intrinsic::Negate => "negate",
            Intrinsic::Invert => "invert",
            Intrinsic::Absolute => "absolute",
            Intrinsic::RangeMin => "range-min",
            Intrinsic::RangeMax => "range-max",
            Intrinsic::RangeFromTo => "range-from-to",
            Intrinsic::Clamp => "clamp",
            Intrinsic::Contains => "contains",
            Intrinsic::Min => "min",
            Intrinsic::Max => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<Intrinsic> {
        Self::ALL.into_iter().find(|i| i.name() == name)
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_reached_never_exceeds_arg_count() {
        for i in Intrinsic::ALL {
            assert!(i.arg_count_always_reached() <= i.arg_count(), "{}", i);
        }
    }

    #[test]
    fn test_short_circuit_counts() {
        assert_eq!(Intrinsic::Select.arg_count(), 3);
        assert_eq!(Intrinsic::Select.arg_count_always_reached(), 1);
        assert_eq!(Intrinsic::NullCoalescing.arg_count_always_reached(), 1);
        assert_eq!(Intrinsic::LogicAnd.arg_count_always_reached(), 1);
        assert_eq!(Intrinsic::LogicOr.arg_count_always_reached(), 1);
        assert_eq!(Intrinsic::Loop.arg_count(), 4);
        assert_eq!(Intrinsic::Loop.arg_count_always_reached(), 2);
        assert_eq!(Intrinsic::Add.arg_count_always_reached(), 2);
    }

    #[test]
    fn test_determinism() {
        let impure: Vec<_> = Intrinsic::ALL
            .into_iter()
            .filter(|i| !i.deterministic())
            .collect();
        assert_eq!(
            impure,
            vec![
                Intrinsic::Continue,
                Intrinsic::Break,
                Intrinsic::Return,
                Intrinsic::Assert,
                Intrinsic::MemLoadDynamic,
                Intrinsic::MemStoreDynamic,
            ]
        );
    }

    #[test]
    fn test_names_round_trip() {
        for i in Intrinsic::ALL {
            assert_eq!(Intrinsic::from_name(i.name()), Some(i));
        }
        assert_eq!(Intrinsic::from_name("pow"), None);
    }

    #[test]
    fn test_lowered_opcodes_match_arity() {
        for i in Intrinsic::ALL {
            let op = match i.lowering() {
                Lowering::Op(op) | Lowering::OpInvert(op) => op,
                Lowering::ControlFlow => continue,
            };
            // One register operand per argument.
            let registers = if op.size() == 2 { 1 } else { 2 };
            assert_eq!(registers, i.arg_count(), "{} -> {}", i, op);
        }
    }
}

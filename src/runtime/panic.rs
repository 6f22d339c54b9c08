//! Script panics.
//!
//! A panic aborts the whole evaluation. Native functions raise one by
//! returning `Err(Panic)`; the VM is the only place that catches it.

use std::fmt;

use thiserror::Error;

use crate::bytecode::program::SourceRange;
use crate::lang::types::{TypeMask, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanicKind {
    AssertionFailed,
    ExecutionFailed,
    ExecutionLimitExceeded,
    ArgumentInvalid,
    ArgumentTypeMismatch,
    ArgumentIdTypeMismatch,
    ArgumentIdExpired,
    ArgumentMissing,
    ArgumentOutOfRange,
    ArgumentCountExceedsMaximum,
    EnumInvalidEntry,
    UnimplementedBinding,
    EventAlreadyFinished,
    EventInvalidParent,
    AttributeUnitNotFound,
    AttributePowerNotFound,
    AttributePropulsionNotFound,
    AttributeNotFound,
    ArrayLimitReached,
    ArrayIndexOutOfRange,
    ArrayElementTypeMismatch,
    ArrayElementIdTypeMismatch,
    IteratorLimitReached,
    IteratorFilterLimitReached,
}

impl PanicKind {
    /// Message template; `{...}` placeholders are filled from the panic.
    pub fn template(self) -> &'static str {
        match self {
            PanicKind::AssertionFailed => "Script assertion failed",
            PanicKind::ExecutionFailed => "Script execution failed",
            PanicKind::ExecutionLimitExceeded => "Script execution limit exceeded",
            PanicKind::ArgumentInvalid => "Argument {arg-index} invalid",
            PanicKind::ArgumentTypeMismatch => {
                "Argument {arg-index} expected '{type-mask}' got '{type-actual}'"
            }
            PanicKind::ArgumentIdTypeMismatch => "Argument {arg-index} mismatching id type",
            PanicKind::ArgumentIdExpired => "Argument {arg-index} id expired",
            PanicKind::ArgumentMissing => "Argument {arg-index} missing",
            PanicKind::ArgumentOutOfRange => "Argument {arg-index} out of range",
            PanicKind::ArgumentCountExceedsMaximum => "Argument count exceeds maximum",
            PanicKind::EnumInvalidEntry => "Invalid enum entry",
            PanicKind::UnimplementedBinding => "Unimplemented binding",
            PanicKind::EventAlreadyFinished => "Event already finished",
            PanicKind::EventInvalidParent => "Event parent invalid",
            PanicKind::AttributeUnitNotFound => "Unit not found in attributes",
            PanicKind::AttributePowerNotFound => "Power not found in attributes",
            PanicKind::AttributePropulsionNotFound => "Propulsion not found in attributes",
            PanicKind::AttributeNotFound => "Attribute not found",
            PanicKind::ArrayLimitReached => "Array limit reached",
            PanicKind::ArrayIndexOutOfRange => "Array index {context-int} is out of range",
            PanicKind::ArrayElementTypeMismatch => {
                "Array element {arg-index} expected '{type-mask}' got '{type-actual}'"
            }
            PanicKind::ArrayElementIdTypeMismatch => {
                "Array element {arg-index} mismatching id type"
            }
            PanicKind::IteratorLimitReached => "Iterator limit reached",
            PanicKind::IteratorFilterLimitReached => "Iterator filter limit reached",
        }
    }
}

// =============================================================================
// PANIC
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.render(false))]
pub struct Panic {
    pub kind: PanicKind,
    pub arg_index: Option<usize>,
    pub type_mask: Option<TypeMask>,
    pub type_actual: Option<ValueType>,
    pub context_int: Option<i64>,
    pub range: Option<SourceRange>,
}

impl Panic {
    pub fn new(kind: PanicKind) -> Self {
        Panic {
            kind,
            arg_index: None,
            type_mask: None,
            type_actual: None,
            context_int: None,
            range: None,
        }
    }

    pub fn with_arg(mut self, index: usize) -> Self {
        self.arg_index = Some(index);
        self
    }

    pub fn with_types(mut self, mask: TypeMask, actual: ValueType) -> Self {
        self.type_mask = Some(mask);
        self.type_actual = Some(actual);
        self
    }

    pub fn with_context(mut self, value: i64) -> Self {
        self.context_int = Some(value);
        self
    }

    pub fn with_range(mut self, range: SourceRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Formats the message; with `include_range` and a known range it is
    /// prefixed with `line:col-line:col: `.
    pub fn render(&self, include_range: bool) -> String {
        let mut out = String::new();
        if include_range && let Some(range) = self.range {
            out.push_str(&format!("{}: ", range));
        }

        let mut rest = self.kind.template();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            let name = &rest[start + 1..start + len];
            self.write_placeholder(&mut out, name);
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        out
    }

    fn write_placeholder(&self, out: &mut String, name: &str) {
        let text = match name {
            "arg-index" => self.arg_index.map(|i| i.to_string()),
            "type-mask" => self.type_mask.map(|m| m.to_string()),
            "type-actual" => self.type_actual.map(|t| t.name().to_string()),
            "context-int" => self.context_int.map(|i| i.to_string()),
            _ => None,
        };
        out.push_str(text.as_deref().unwrap_or("?"));
    }
}

impl fmt::Display for PanicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

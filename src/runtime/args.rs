//! Argument access for native functions.
//!
//! Three strengths:
//! - strict (`num`, `str`, ...): missing or mistyped arguments panic.
//! - optional (`opt_*`): absent or null yields the default; other types panic.
//! - lenient (`maybe_*`): anything that does not match yields the default.

use crate::lang::hash::StringHash;
use crate::lang::types::{TypeMask, ValueType};
use crate::lang::value::{NumRange, Value};

use super::enums::ScriptEnum;
use super::panic::{Panic, PanicKind};

/// Window over the caller's argument registers for one native call.
///
/// Writes through [`BinderCall::set`] land in the caller's registers.
#[derive(Debug)]
pub struct BinderCall<'a> {
    args: &'a mut [Value],
    call_id: u32,
}

fn missing(i: usize) -> Panic {
    Panic::new(PanicKind::ArgumentMissing).with_arg(i)
}

fn mismatch(i: usize, mask: TypeMask, actual: ValueType) -> Panic {
    Panic::new(PanicKind::ArgumentTypeMismatch)
        .with_arg(i)
        .with_types(mask, actual)
}

fn out_of_range(i: usize) -> Panic {
    Panic::new(PanicKind::ArgumentOutOfRange).with_arg(i)
}

impl<'a> BinderCall<'a> {
    pub fn new(args: &'a mut [Value], call_id: u32) -> Self {
        BinderCall { args, call_id }
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn count(&self) -> usize {
        self.args.len()
    }

    /// Code offset of the calling instruction.
    pub fn call_id(&self) -> u32 {
        self.call_id
    }

    /// Present and non-null.
    pub fn has(&self, i: usize) -> bool {
        self.args.get(i).is_some_and(|v| v.non_null())
    }

    /// Drops the first argument; later indices are relative to the rest.
    pub fn shift(&mut self) {
        let args = std::mem::take(&mut self.args);
        self.args = if args.is_empty() { args } else { &mut args[1..] };
    }

    /// Overwrites argument `i` in the caller's register.
    pub fn set(&mut self, i: usize, value: Value) -> Result<(), Panic> {
        let slot = self.args.get_mut(i).ok_or_else(|| missing(i))?;
        *slot = value;
        Ok(())
    }

    // =========================================================================
    // Strict
    // =========================================================================

    pub fn any(&self, i: usize) -> Result<Value, Panic> {
        self.args.get(i).copied().ok_or_else(|| missing(i))
    }

    pub fn check(&self, i: usize, mask: TypeMask) -> Result<Value, Panic> {
        let value = self.any(i)?;
        if !value.type_check(mask) {
            return Err(mismatch(i, mask, value.ty()));
        }
        Ok(value)
    }

    pub fn num(&self, i: usize) -> Result<i32, Panic> {
        Ok(self.check(i, TypeMask::NUM)?.get_num(0))
    }

    pub fn num_clamped(&self, i: usize, min: i32, max: i32) -> Result<i32, Panic> {
        let n = self.num(i)?;
        if n < min || n > max {
            return Err(out_of_range(i));
        }
        Ok(n)
    }

    pub fn num_range(&self, i: usize) -> Result<NumRange, Panic> {
        match self.check(i, TypeMask::NUM_RANGE)? {
            Value::NumRange(r) => Ok(r),
            other => Err(mismatch(i, TypeMask::NUM_RANGE, other.ty())),
        }
    }

    pub fn bool(&self, i: usize) -> Result<bool, Panic> {
        Ok(self.check(i, TypeMask::BOOL)?.get_bool(false))
    }

    pub fn str(&self, i: usize) -> Result<StringHash, Panic> {
        Ok(self.check(i, TypeMask::STR)?.get_str(0))
    }

    pub fn id(&self, i: usize) -> Result<u64, Panic> {
        Ok(self.check(i, TypeMask::ID)?.get_id(0))
    }

    pub fn enum_value(&self, i: usize, table: &ScriptEnum) -> Result<i32, Panic> {
        table.resolve(self.str(i)?, i)
    }

    // =========================================================================
    // Optional
    // =========================================================================

    /// Type of the argument; null when absent.
    pub fn opt_type(&self, i: usize) -> ValueType {
        self.args.get(i).map_or(ValueType::Null, |v| v.ty())
    }

    pub fn opt_any(&self, i: usize, default: Value) -> Value {
        match self.args.get(i) {
            Some(v) if v.non_null() => *v,
            _ => default,
        }
    }

    /// Present, non-null argument of one of `mask`, or `None`.
    fn opt_check(&self, i: usize, mask: TypeMask) -> Result<Option<Value>, Panic> {
        match self.args.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(v) if v.type_check(mask) => Ok(Some(*v)),
            Some(v) => Err(mismatch(i, mask | TypeMask::NULL, v.ty())),
        }
    }

    pub fn opt_num(&self, i: usize, default: i32) -> Result<i32, Panic> {
        Ok(self
            .opt_check(i, TypeMask::NUM)?
            .map_or(default, |v| v.get_num(default)))
    }

    pub fn opt_num_clamped(&self, i: usize, min: i32, max: i32, default: i32) -> Result<i32, Panic> {
        match self.opt_check(i, TypeMask::NUM)? {
            None => Ok(default),
            Some(v) => {
                let n = v.get_num(default);
                if n < min || n > max {
                    return Err(out_of_range(i));
                }
                Ok(n)
            }
        }
    }

    pub fn opt_num_range(&self, i: usize, default: NumRange) -> Result<NumRange, Panic> {
        Ok(self
            .opt_check(i, TypeMask::NUM_RANGE)?
            .and_then(|v| v.get_num_range())
            .unwrap_or(default))
    }

    pub fn opt_bool(&self, i: usize, default: bool) -> Result<bool, Panic> {
        Ok(self
            .opt_check(i, TypeMask::BOOL)?
            .map_or(default, |v| v.get_bool(default)))
    }

    pub fn opt_str(&self, i: usize, default: StringHash) -> Result<StringHash, Panic> {
        Ok(self
            .opt_check(i, TypeMask::STR)?
            .map_or(default, |v| v.get_str(default)))
    }

    pub fn opt_id(&self, i: usize, default: u64) -> Result<u64, Panic> {
        Ok(self
            .opt_check(i, TypeMask::ID)?
            .map_or(default, |v| v.get_id(default)))
    }

    pub fn opt_enum(&self, i: usize, table: &ScriptEnum, default: i32) -> Result<i32, Panic> {
        match self.opt_check(i, TypeMask::STR)? {
            None => Ok(default),
            Some(v) => table.resolve(v.get_str(0), i),
        }
    }

    // =========================================================================
    // Lenient
    // =========================================================================

    pub fn maybe_num(&self, i: usize, default: i32) -> i32 {
        self.args.get(i).map_or(default, |v| v.get_num(default))
    }

    pub fn maybe_bool(&self, i: usize, default: bool) -> bool {
        self.args.get(i).map_or(default, |v| v.get_bool(default))
    }

    pub fn maybe_str(&self, i: usize, default: StringHash) -> StringHash {
        self.args.get(i).map_or(default, |v| v.get_str(default))
    }

    pub fn maybe_id(&self, i: usize, default: u64) -> u64 {
        self.args.get(i).map_or(default, |v| v.get_id(default))
    }

    pub fn maybe_enum(&self, i: usize, table: &ScriptEnum, default: i32) -> i32 {
        match self.args.get(i) {
            Some(Value::Str(hash)) => table.lookup_or(*hash, default),
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::hash::string_hash;

    fn call(args: &mut [Value]) -> BinderCall<'_> {
        BinderCall::new(args, 0)
    }

    fn assert_panic<T: std::fmt::Debug>(result: Result<T, Panic>, kind: PanicKind, arg: usize) {
        match result {
            Err(panic) => {
                assert_eq!(panic.kind, kind);
                assert_eq!(panic.arg_index, Some(arg));
            }
            Ok(v) => panic!("expected {:?}, got Ok({:?})", kind, v),
        }
    }

    fn levels() -> ScriptEnum {
        ScriptEnum::new().with("low", 1).with("high", 2)
    }

    #[test]
    fn test_strict_missing() {
        let mut args = [Value::num(1)];
        let c = call(&mut args);
        assert_panic(c.num(1), PanicKind::ArgumentMissing, 1);
        assert_panic(c.any(3), PanicKind::ArgumentMissing, 3);
        let mut none: [Value; 0] = [];
        assert_panic(call(&mut none).str(0), PanicKind::ArgumentMissing, 0);
    }

    #[test]
    fn test_strict_type_mismatch_carries_mask_and_actual() {
        let mut args = [Value::bool(true)];
        let panic = call(&mut args).num(0).unwrap_err();
        assert_eq!(panic.kind, PanicKind::ArgumentTypeMismatch);
        assert_eq!(panic.arg_index, Some(0));
        assert_eq!(panic.type_mask, Some(TypeMask::NUM));
        assert_eq!(panic.type_actual, Some(ValueType::Bool));
    }

    #[test]
    fn test_strict_values() {
        let mut args = [
            Value::num(7),
            Value::num_range(1, 4),
            Value::bool(true),
            Value::str(string_hash("low")),
            Value::id_or_null(9),
        ];
        let c = call(&mut args);
        assert_eq!(c.num(0), Ok(7));
        assert_eq!(c.num_range(1).map(|r| (r.min(), r.max())), Ok((1, 5)));
        assert_eq!(c.bool(2), Ok(true));
        assert_eq!(c.str(3), Ok(string_hash("low")));
        assert_eq!(c.id(4), Ok(9));
        assert_eq!(c.enum_value(3, &levels()), Ok(1));
        assert_eq!(c.check(0, TypeMask::NUM | TypeMask::STR), Ok(Value::num(7)));
    }

    #[test]
    fn test_strict_clamped() {
        let mut args = [Value::num(5)];
        let c = call(&mut args);
        assert_eq!(c.num_clamped(0, 0, 5), Ok(5));
        assert_panic(c.num_clamped(0, 0, 4), PanicKind::ArgumentOutOfRange, 0);
        assert_panic(c.num_clamped(0, 6, 10), PanicKind::ArgumentOutOfRange, 0);
    }

    #[test]
    fn test_strict_enum_unknown_entry() {
        let mut args = [Value::str(string_hash("medium"))];
        assert_panic(
            call(&mut args).enum_value(0, &levels()),
            PanicKind::EnumInvalidEntry,
            0,
        );
    }

    #[test]
    fn test_optional_defaults() {
        let mut args = [Value::Null];
        let c = call(&mut args);
        assert_eq!(c.opt_num(0, 42), Ok(42));
        assert_eq!(c.opt_num(1, 42), Ok(42));
        assert_eq!(c.opt_bool(0, true), Ok(true));
        assert_eq!(c.opt_str(5, 3), Ok(3));
        assert_eq!(c.opt_id(0, 11), Ok(11));
        assert_eq!(c.opt_enum(0, &levels(), -1), Ok(-1));
        assert_eq!(c.opt_num_clamped(0, 0, 1, 9), Ok(9));
        assert_eq!(c.opt_any(0, Value::num(2)), Value::num(2));
        assert_eq!(c.opt_type(0), ValueType::Null);
        assert_eq!(c.opt_type(1), ValueType::Null);
    }

    #[test]
    fn test_optional_present() {
        let mut args = [Value::num(3), Value::num_range(0, 2), Value::str(string_hash("high"))];
        let c = call(&mut args);
        assert_eq!(c.opt_num(0, 42), Ok(3));
        let fallback = NumRange::new(9, 0);
        assert_eq!(c.opt_num_range(1, fallback), Ok(NumRange::new(0, 2)));
        assert_eq!(c.opt_enum(2, &levels(), -1), Ok(2));
        assert_eq!(c.opt_type(1), ValueType::NumRange);
        assert_eq!(c.opt_any(0, Value::Null), Value::num(3));
    }

    #[test]
    fn test_optional_mismatch_includes_null_in_mask() {
        let mut args = [Value::str(1)];
        let panic = call(&mut args).opt_num(0, 0).unwrap_err();
        assert_eq!(panic.kind, PanicKind::ArgumentTypeMismatch);
        assert_eq!(panic.type_mask, Some(TypeMask::NUM | TypeMask::NULL));
        assert_eq!(panic.type_actual, Some(ValueType::Str));
        assert_eq!(panic.to_string(), "Argument 0 expected 'num?' got 'str'");
    }

    #[test]
    fn test_optional_clamped_out_of_range() {
        let mut args = [Value::num(-1)];
        assert_panic(
            call(&mut args).opt_num_clamped(0, 0, 10, 5),
            PanicKind::ArgumentOutOfRange,
            0,
        );
    }

    #[test]
    fn test_lenient_never_panics() {
        let mut args = [Value::bool(true), Value::Null, Value::str(string_hash("nope"))];
        let c = call(&mut args);
        assert_eq!(c.maybe_num(0, 1), 1);
        assert_eq!(c.maybe_num(1, 2), 2);
        assert_eq!(c.maybe_num(9, 3), 3);
        assert!(c.maybe_bool(0, false));
        assert_eq!(c.maybe_str(0, 4), 4);
        assert_eq!(c.maybe_id(2, 5), 5);
        assert_eq!(c.maybe_enum(2, &levels(), 6), 6);
        assert_eq!(c.maybe_enum(0, &levels(), 7), 7);
    }

    #[test]
    fn test_has() {
        let mut args = [Value::num(0), Value::Null];
        let c = call(&mut args);
        assert!(c.has(0));
        assert!(!c.has(1));
        assert!(!c.has(2));
    }

    #[test]
    fn test_shift_moves_window() {
        let mut args = [Value::str(1), Value::num(2), Value::num(3)];
        let mut c = call(&mut args);
        c.shift();
        assert_eq!(c.count(), 2);
        assert_eq!(c.num(0), Ok(2));
        assert_panic(c.num(2), PanicKind::ArgumentMissing, 2);

        let mut none: [Value; 0] = [];
        let mut empty = call(&mut none);
        empty.shift();
        assert_eq!(empty.count(), 0);
    }

    #[test]
    fn test_set_writes_through_shifted_window() {
        let mut args = [Value::num(1), Value::num(2)];
        let mut c = call(&mut args);
        c.shift();
        assert_eq!(c.set(0, Value::bool(true)), Ok(()));
        assert_panic(c.set(1, Value::Null), PanicKind::ArgumentMissing, 1);
        assert_eq!(c.any(0), Ok(Value::bool(true)));
        assert_eq!(args, [Value::num(1), Value::bool(true)]);
    }
}

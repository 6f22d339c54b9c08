//! Native function tables.
//!
//! A [`BinderBuilder`] collects declarations; [`BinderBuilder::finalize`]
//! sorts them by name, assigns function ids and computes the schema hash
//! programs are compiled against. The finalized [`Binder`] is immutable.

use std::fmt;
use std::ops::BitOr;

use thiserror::Error;
use tracing::{debug, warn};

use crate::bytecode::op::REGISTER_COUNT;
use crate::lang::hash::Fnv64;
use crate::lang::types::TypeMask;
use crate::lang::value::Value;

use super::args::BinderCall;
use super::panic::{Panic, PanicKind};

/// Native handler; `C` is the host context passed to every call.
pub type NativeFn<C> = dyn Fn(&mut C, &mut BinderCall<'_>) -> Result<Value, Panic> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinderFlags(u8);

impl BinderFlags {
    pub const NONE: BinderFlags = BinderFlags(0);
    /// Programs using memory opcodes fail validation.
    pub const DISALLOW_MEMORY_ACCESS: BinderFlags = BinderFlags(1 << 0);
    /// Keep docs around and check return types at call time.
    pub const DEV_SUPPORT: BinderFlags = BinderFlags(1 << 1);

    pub fn contains(self, other: BinderFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BinderFlags {
    type Output = BinderFlags;

    fn bitor(self, rhs: BinderFlags) -> BinderFlags {
        BinderFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderArg {
    pub name: String,
    pub mask: TypeMask,
}

/// Declared signature: return mask plus named argument masks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinderSig {
    pub ret: TypeMask,
    pub args: Vec<BinderArg>,
}

impl BinderSig {
    pub fn new(ret: TypeMask) -> Self {
        BinderSig {
            ret,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &str, mask: TypeMask) -> Self {
        self.args.push(BinderArg {
            name: name.to_string(),
            mask,
        });
        self
    }
}

impl fmt::Display for BinderSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", arg.name, arg.mask)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

pub struct BinderFunc<C> {
    name: String,
    doc: String,
    sig: BinderSig,
    handler: Option<Box<NativeFn<C>>>,
}

impl<C> BinderFunc<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn sig(&self) -> &BinderSig {
        &self.sig
    }

    pub fn is_implemented(&self) -> bool {
        self.handler.is_some()
    }
}

impl<C> fmt::Debug for BinderFunc<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinderFunc")
            .field("name", &self.name)
            .field("sig", &self.sig)
            .field("implemented", &self.is_implemented())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinderError {
    #[error("duplicate binder function '{0}'")]
    DuplicateName(String),
    #[error("binder function name must not be empty")]
    EmptyName,
    #[error("binder function '{name}' declares {count} arguments, at most 38 allowed")]
    TooManyArgs { name: String, count: usize },
    #[error("binder declares {0} functions, at most 65535 allowed")]
    TooManyFuncs(usize),
}

// =============================================================================
// BUILDER
// =============================================================================

pub struct BinderBuilder<C> {
    name: String,
    flags: BinderFlags,
    funcs: Vec<BinderFunc<C>>,
}

impl<C> BinderBuilder<C> {
    pub fn new(name: &str) -> Self {
        BinderBuilder {
            name: name.to_string(),
            flags: BinderFlags::NONE,
            funcs: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: BinderFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn declare<F>(&mut self, name: &str, doc: &str, sig: BinderSig, handler: F) -> &mut Self
    where
        F: Fn(&mut C, &mut BinderCall<'_>) -> Result<Value, Panic> + Send + Sync + 'static,
    {
        self.funcs.push(BinderFunc {
            name: name.to_string(),
            doc: doc.to_string(),
            sig,
            handler: Some(Box::new(handler)),
        });
        self
    }

    /// Declares a function that is part of the schema but panics
    /// `UnimplementedBinding` when called.
    pub fn declare_unimplemented(&mut self, name: &str, doc: &str, sig: BinderSig) -> &mut Self {
        self.funcs.push(BinderFunc {
            name: name.to_string(),
            doc: doc.to_string(),
            sig,
            handler: None,
        });
        self
    }

    pub fn finalize(self) -> Result<Binder<C>, BinderError> {
        let BinderBuilder {
            name,
            flags,
            mut funcs,
        } = self;

        if funcs.len() > u16::MAX as usize {
            return Err(BinderError::TooManyFuncs(funcs.len()));
        }
        for func in &funcs {
            if func.name.is_empty() {
                return Err(BinderError::EmptyName);
            }
            if func.sig.args.len() > REGISTER_COUNT {
                return Err(BinderError::TooManyArgs {
                    name: func.name.clone(),
                    count: func.sig.args.len(),
                });
            }
        }

        funcs.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = funcs.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(BinderError::DuplicateName(pair[0].name.clone()));
        }

        if !flags.contains(BinderFlags::DEV_SUPPORT) {
            for func in &mut funcs {
                func.doc.clear();
            }
        }

        let hash = schema_hash(&funcs);
        debug!(binder = %name, funcs = funcs.len(), hash = %format_args!("{:016x}", hash), "binder finalized");

        Ok(Binder {
            name,
            flags,
            funcs,
            hash,
        })
    }
}

/// Hash over the sorted name/signature table. Docs and argument names do
/// not take part.
fn schema_hash<C>(funcs: &[BinderFunc<C>]) -> u64 {
    let mut hasher = Fnv64::new();
    hasher.write_u32(funcs.len() as u32);
    for func in funcs {
        hasher.write_u32(func.name.len() as u32);
        hasher.write(func.name.as_bytes());
        hasher.write_u16(func.sig.ret.bits());
        hasher.write_u16(func.sig.args.len() as u16);
        for arg in &func.sig.args {
            hasher.write_u16(arg.mask.bits());
        }
    }
    hasher.finish()
}

// =============================================================================
// BINDER
// =============================================================================

pub struct Binder<C> {
    name: String,
    flags: BinderFlags,
    /// Sorted by name; the index is the function id.
    funcs: Vec<BinderFunc<C>>,
    hash: u64,
}

impl<C> Binder<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> BinderFlags {
        self.flags
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn count(&self) -> usize {
        self.funcs.len()
    }

    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.funcs
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|i| i as u16)
    }

    pub fn func(&self, id: u16) -> Option<&BinderFunc<C>> {
        self.funcs.get(id as usize)
    }

    pub fn funcs(&self) -> impl Iterator<Item = (u16, &BinderFunc<C>)> {
        self.funcs.iter().enumerate().map(|(i, f)| (i as u16, f))
    }

    /// Invokes function `id`; `call_id` is the offset of the calling
    /// instruction.
    pub fn invoke(
        &self,
        ctx: &mut C,
        id: u16,
        args: &mut [Value],
        call_id: u32,
    ) -> Result<Value, Panic> {
        let Some(func) = self.func(id) else {
            return Err(Panic::new(PanicKind::UnimplementedBinding));
        };
        let Some(handler) = &func.handler else {
            return Err(Panic::new(PanicKind::UnimplementedBinding));
        };

        let mut call = BinderCall::new(args, call_id);
        let result = handler(ctx, &mut call)?;

        if self.flags.contains(BinderFlags::DEV_SUPPORT) && !result.type_check(func.sig.ret) {
            warn!(
                func = %func.name,
                expected = %func.sig.ret,
                actual = %result.ty(),
                "binder function returned undeclared type"
            );
        }
        Ok(result)
    }
}

impl<C> fmt::Debug for Binder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("funcs", &self.funcs)
            .field("hash", &format_args!("{:016x}", self.hash))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret_num(_: &mut (), call: &mut BinderCall<'_>) -> Result<Value, Panic> {
        Ok(Value::num(call.num(0)?))
    }

    fn builder() -> BinderBuilder<()> {
        let mut b = BinderBuilder::new("test");
        b.declare(
            "zeta",
            "Last.",
            BinderSig::new(TypeMask::NUM).arg("x", TypeMask::NUM),
            ret_num,
        );
        b.declare(
            "alpha",
            "First.",
            BinderSig::new(TypeMask::NUM).arg("x", TypeMask::NUM),
            ret_num,
        );
        b
    }

    #[test]
    fn test_finalize_sorts_by_name() {
        let binder = builder().finalize().unwrap();
        assert_eq!(binder.count(), 2);
        assert_eq!(binder.lookup("alpha"), Some(0));
        assert_eq!(binder.lookup("zeta"), Some(1));
        assert_eq!(binder.lookup("missing"), None);
    }

    #[test]
    fn test_hash_ignores_declaration_order_and_docs() {
        let a = builder().finalize().unwrap();

        let mut b = BinderBuilder::<()>::new("other");
        b.declare(
            "alpha",
            "",
            BinderSig::new(TypeMask::NUM).arg("renamed", TypeMask::NUM),
            ret_num,
        );
        b.declare(
            "zeta",
            "",
            BinderSig::new(TypeMask::NUM).arg("x", TypeMask::NUM),
            ret_num,
        );
        let b = b.finalize().unwrap();

        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_depends_on_signature() {
        let a = builder().finalize().unwrap();

        let mut b = BinderBuilder::<()>::new("test");
        b.declare(
            "alpha",
            "",
            BinderSig::new(TypeMask::NUM).arg("x", TypeMask::NUM | TypeMask::NULL),
            ret_num,
        );
        b.declare(
            "zeta",
            "",
            BinderSig::new(TypeMask::NUM).arg("x", TypeMask::NUM),
            ret_num,
        );
        let b = b.finalize().unwrap();

        assert_ne!(a.hash(), b.hash());

        let empty = BinderBuilder::<()>::new("empty").finalize().unwrap();
        assert_ne!(a.hash(), empty.hash());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut b = builder();
        b.declare_unimplemented("alpha", "", BinderSig::default());
        assert_eq!(
            b.finalize().unwrap_err(),
            BinderError::DuplicateName("alpha".to_string())
        );
    }

    #[test]
    fn test_invoke() {
        let binder = builder().finalize().unwrap();
        let id = binder.lookup("alpha").unwrap();
        let result = binder.invoke(&mut (), id, &mut [Value::num(5)], 0);
        assert_eq!(result, Ok(Value::num(5)));

        let panic = binder.invoke(&mut (), id, &mut [], 0).unwrap_err();
        assert_eq!(panic.kind, PanicKind::ArgumentMissing);
    }

    #[test]
    fn test_unimplemented_binding_panics() {
        let mut b = BinderBuilder::<()>::new("test");
        b.declare_unimplemented("later", "Not there yet.", BinderSig::new(TypeMask::NULL));
        let binder = b.finalize().unwrap();

        let id = binder.lookup("later").unwrap();
        assert!(!binder.func(id).unwrap().is_implemented());
        let panic = binder.invoke(&mut (), id, &mut [], 0).unwrap_err();
        assert_eq!(panic.kind, PanicKind::UnimplementedBinding);
    }

    #[test]
    fn test_docs_kept_only_with_dev_support() {
        let binder = builder().finalize().unwrap();
        assert_eq!(binder.func(0).unwrap().doc(), "");

        let dev = builder()
            .flags(BinderFlags::DEV_SUPPORT)
            .finalize()
            .unwrap();
        assert_eq!(dev.func(0).unwrap().doc(), "First.");
    }

    #[test]
    fn test_sig_display() {
        let sig = BinderSig::new(TypeMask::NUM)
            .arg("a", TypeMask::NUM)
            .arg("b", TypeMask::STR | TypeMask::NULL);
        assert_eq!(sig.to_string(), "(a: num, b: str?) -> num");
    }
}

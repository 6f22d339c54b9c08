use crate::lang::hash::{StringHash, string_hash};

use super::panic::{Panic, PanicKind};

/// Named integer constants a binding accepts as string arguments.
///
/// Entries keep declaration order; lookups are linear since script enums
/// are small.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptEnum {
    entries: Vec<(StringHash, i32)>,
}

impl ScriptEnum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: i32) {
        self.entries.push((string_hash(name), value));
    }

    pub fn with(mut self, name: &str, value: i32) -> Self {
        self.push(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, name: StringHash) -> Option<i32> {
        self.entries
            .iter()
            .find(|(hash, _)| *hash == name)
            .map(|(_, value)| *value)
    }

    pub fn lookup_or(&self, name: StringHash, default: i32) -> i32 {
        self.lookup(name).unwrap_or(default)
    }

    /// Panics `EnumInvalidEntry` for unknown names.
    pub fn resolve(&self, name: StringHash, arg_index: usize) -> Result<i32, Panic> {
        self.lookup(name)
            .ok_or_else(|| Panic::new(PanicKind::EnumInvalidEntry).with_arg(arg_index))
    }

    /// First name declared for `value`.
    pub fn name_of(&self, value: i32) -> Option<StringHash> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(hash, _)| *hash)
    }
}

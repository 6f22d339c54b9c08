use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::lang::hash::StringHash;
use crate::lang::value::Value;

/// Memory keys are string hashes; dynamic keys are derived from values.
pub type MemKey = StringHash;

/// Key/value store a program reads and writes through memory opcodes.
pub trait Memory {
    /// Null for keys that were never stored.
    fn load(&self, key: MemKey) -> Value;

    fn store(&mut self, key: MemKey, value: Value);
}

/// Key for a dynamic memory access: strings use their hash, ids the value
/// hash. Other types have no key.
pub fn dyn_key(value: Value) -> Option<MemKey> {
    match value {
        Value::Str(hash) => Some(hash),
        Value::Id(_) => Some(value.hash32()),
        _ => None,
    }
}

/// Hash map backed [`Memory`]. Storing null removes the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptMem {
    values: HashMap<MemKey, Value>,
}

impl ScriptMem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MemKey, Value)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl Memory for ScriptMem {
    fn load(&self, key: MemKey) -> Value {
        self.values.get(&key).copied().unwrap_or_default()
    }

    fn store(&mut self, key: MemKey, value: Value) {
        if value.non_null() {
            self.values.insert(key, value);
        } else {
            self.values.remove(&key);
        }
    }
}

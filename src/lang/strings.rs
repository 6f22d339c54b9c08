use std::collections::HashMap;

use tracing::warn;

use super::hash::{StringHash, string_hash};

/// Interner that maps string handles back to their text.
///
/// Values only carry the hash; anything that wants to print a string
/// handle needs the table it was interned in.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    entries: HashMap<StringHash, String>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text` and returns its handle.
    ///
    /// On a hash collision the first text wins.
    pub fn intern(&mut self, text: &str) -> StringHash {
        let hash = string_hash(text);
        match self.entries.get(&hash) {
            Some(existing) if existing != text => {
                warn!(hash, existing = %existing, text, "string hash collision");
            }
            Some(_) => {}
            None => {
                self.entries.insert(hash, text.to_string());
            }
        }
        hash
    }

    pub fn lookup(&self, hash: StringHash) -> Option<&str> {
        self.entries.get(&hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_returns_string_hash() {
        let mut table = StringTable::new();
        let hash = table.intern("hello");
        assert_eq!(hash, string_hash("hello"));
        assert_eq!(table.lookup(hash), Some("hello"));
    }

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = StringTable::new();
        let a = table.intern("x");
        let b = table.intern("x");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_unknown() {
        let table = StringTable::new();
        assert!(table.is_empty());
        assert_eq!(table.lookup(string_hash("missing")), None);
    }
}

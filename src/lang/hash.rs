//! Hashing primitives shared by values, strings and binders.
//!
//! All hashes are FNV-1a. They are part of the program contract: string
//! handles, memory keys and binder hashes baked into compiled programs
//! depend on these exact functions.

/// 32-bit hash of an interned string.
pub type StringHash = u32;

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a (32 bit) over raw bytes.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

/// Streaming FNV-1a (64 bit) hasher.
#[derive(Debug, Clone, Copy)]
pub struct Fnv64 {
    state: u64,
}

impl Fnv64 {
    pub fn new() -> Self {
        Self {
            state: FNV64_OFFSET,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.state ^= *b as u64;
            self.state = self.state.wrapping_mul(FNV64_PRIME);
        }
    }

    pub fn write_u16(&mut self, v: u16) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.state
    }
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Mix two 32-bit hashes; order dependent.
pub fn hash_combine(a: u32, b: u32) -> u32 {
    a ^ (b
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(a << 6)
        .wrapping_add(a >> 2))
}

/// Hash used for string handles.
pub fn string_hash(text: &str) -> StringHash {
    fnv1a_32(text.as_bytes())
}

//! # Cinder value model
//!
//! Scripts operate on [`Value`](value::Value): a small `Copy` enum with an
//! 8-byte wire form (see [`codec`]). String payloads are hashes; the text
//! lives in a [`StringTable`](strings::StringTable) owned by the host.
//!
//! Arithmetic on values is total. Mismatched or unsupported operands yield
//! null instead of an error.

pub mod codec;
pub mod hash;
pub mod strings;
pub mod types;
pub mod value;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lang::value::Value;

/// Program file magic: "CNDR"
pub const PROGRAM_MAGIC: [u8; 4] = *b"CNDR";

/// Supported program file version
pub const PROGRAM_VERSION: u16 = 1;

/// Zero-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineCol {
    pub line: u16,
    pub column: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: LineCol,
    pub end: LineCol,
}

impl SourceRange {
    pub fn new(start: (u16, u16), end: (u16, u16)) -> Self {
        SourceRange {
            start: LineCol {
                line: start.0,
                column: start.1,
            },
            end: LineCol {
                line: end.0,
                column: end.1,
            },
        }
    }
}

/// Renders one-based, as `line:col-line:col`.
impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line as u32 + 1,
            self.start.column as u32 + 1,
            self.end.line as u32 + 1,
            self.end.column as u32 + 1
        )
    }
}

/// Source range of the instructions starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramLoc {
    pub offset: u16,
    pub range: SourceRange,
}

/// A compiled program.
///
/// Immutable once built. It has to be validated against a binder
/// (see [`validate`](super::validate::validate)) before it can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    code: Vec<u8>,
    literals: Vec<Value>,
    /// Sorted by offset.
    locations: Vec<ProgramLoc>,
    binder_hash: u64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("program file too short")]
    TooShort,
    #[error("invalid program magic")]
    InvalidMagic,
    #[error("unsupported program version {0}")]
    UnsupportedVersion(u16),
    #[error("malformed program body: {0}")]
    Postcard(postcard::Error),
}

impl Program {
    pub fn new(
        code: Vec<u8>,
        literals: Vec<Value>,
        locations: Vec<ProgramLoc>,
        binder_hash: u64,
    ) -> Self {
        Program {
            code,
            literals,
            locations,
            binder_hash,
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    pub fn locations(&self) -> &[ProgramLoc] {
        &self.locations
    }

    pub fn binder_hash(&self) -> u64 {
        self.binder_hash
    }

    /// Source range of the instruction at `offset`: the nearest entry at or
    /// before it.
    pub fn location(&self, offset: usize) -> Option<SourceRange> {
        let idx = self
            .locations
            .partition_point(|loc| loc.offset as usize <= offset);
        idx.checked_sub(1).map(|i| self.locations[i].range)
    }

    // =========================================================================
    // Program files: magic, u16 LE version, postcard body
    // =========================================================================

    pub fn to_bytes(&self) -> Result<Vec<u8>, LoadError> {
        let mut out = Vec::with_capacity(6 + self.code.len() + self.literals.len() * 8);
        out.extend_from_slice(&PROGRAM_MAGIC);
        out.extend_from_slice(&PROGRAM_VERSION.to_le_bytes());
        let body = postcard::to_allocvec(self).map_err(LoadError::Postcard)?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Program, LoadError> {
        if bytes.len() < 6 {
            return Err(LoadError::TooShort);
        }
        if bytes[..4] != PROGRAM_MAGIC {
            return Err(LoadError::InvalidMagic);
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != PROGRAM_VERSION {
            return Err(LoadError::UnsupportedVersion(version));
        }
        postcard::from_bytes(&bytes[6..]).map_err(LoadError::Postcard)
    }
}

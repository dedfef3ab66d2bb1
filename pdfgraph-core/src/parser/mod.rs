//! PDF Parser Module
//!
//! Reads the classic (non-stream) file structure: header, indirect objects,
//! cross-reference sections and trailers. Files whose structure cannot be
//! read are handed to [`recovery`](crate::recovery) for reconstruction.

pub mod lexer;
pub mod objects;
pub mod reader;
pub mod xref;

use crate::xref::MAX_RECURSION_DEPTH;

pub use self::lexer::{Lexer, Token};
pub use self::objects::ObjectParser;
pub use self::reader::DocumentReader;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref table")]
    InvalidXRef,

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Object {expected} not found at offset {offset}")]
    ObjectMismatch { expected: String, offset: u64 },

    #[error("Nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("Unexpected end of file")]
    UnexpectedEof,
}

impl ParseError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ParseError::SyntaxError {
            position,
            message: message.into(),
        }
    }
}

/// Options controlling how a file is read.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Tolerate malformed xref lines, missing `endstream` and similar damage
    pub lenient: bool,
    /// Rebuild the cross-reference table by scanning the file when the
    /// standard structure cannot be read
    pub rebuild_on_failure: bool,
    /// Recursion depth of the closure walk before it defers to its worklist
    pub max_recursion_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParseOptions {
    /// Reject damaged files instead of repairing them
    pub fn strict() -> Self {
        Self {
            lenient: false,
            rebuild_on_failure: false,
            max_recursion_depth: MAX_RECURSION_DEPTH,
        }
    }

    pub fn lenient() -> Self {
        Self {
            lenient: true,
            rebuild_on_failure: true,
            max_recursion_depth: MAX_RECURSION_DEPTH,
        }
    }

    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_rebuild_on_failure(mut self, rebuild: bool) -> Self {
        self.rebuild_on_failure = rebuild;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }
}

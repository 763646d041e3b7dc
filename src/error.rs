//! Error types for KDL parsing and serialization.

use std::fmt::{self, Display};

/// Error produced by a parse or serialize operation.
#[derive(Debug)]
pub struct Error {
    /// The specific kind of error.
    pub kind: ErrorKind,
    /// Line of the offending token (1-based), if known.
    pub line: Option<u32>,
    /// Column of the offending token (1-based), if known.
    pub column: Option<u32>,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{} at {}:{}", self.kind, line, col),
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Build an error with span information.
    pub fn new(kind: ErrorKind, line: u32, column: u32) -> Self {
        Error {
            kind,
            line: Some(line),
            column: Some(column),
        }
    }

    /// Build an error without a known position.
    pub fn without_span(kind: ErrorKind) -> Self {
        Error {
            kind,
            line: None,
            column: None,
        }
    }
}

/// The taxonomy of errors exposed by this crate, per the KDL parsing pipeline.
#[derive(Debug)]
pub enum ErrorKind {
    /// A token was found where a different token was required.
    UnexpectedToken {
        /// Textual description of what was actually found.
        got: String,
        /// Description of what was expected instead.
        expected: &'static str,
    },
    /// Input ended where more tokens were required.
    UnexpectedEof {
        /// Description of what was expected before EOF.
        expected: &'static str,
    },
    /// A numeric literal could not be parsed.
    InvalidNumber {
        /// The offending literal text.
        text: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A string literal (quoted, raw, or multiline) was malformed.
    InvalidString {
        /// Why it was rejected.
        reason: &'static str,
    },
    /// An escape sequence inside a quoted or multiline-escaped string was malformed.
    InvalidEscape {
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A property name appeared more than once on a node (strict mode only).
    DuplicateProperty {
        /// The property name that repeated.
        name: String,
    },
    /// The tree parser's depth counter exceeded `ParseOptions::max_depth`.
    NestingTooDeep {
        /// The configured limit that was exceeded.
        limit: u32,
    },
    /// A configured resource cap (string pool bytes, buffer size, document size) was exceeded.
    OutOfMemory {
        /// Which cap was hit.
        what: &'static str,
    },
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnexpectedToken { got, expected } => {
                write!(f, "unexpected token: got {got}, expected {expected}")
            }
            ErrorKind::UnexpectedEof { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            ErrorKind::InvalidNumber { text, reason } => {
                write!(f, "invalid number `{text}`: {reason}")
            }
            ErrorKind::InvalidString { reason } => write!(f, "invalid string: {reason}"),
            ErrorKind::InvalidEscape { reason } => write!(f, "invalid escape: {reason}"),
            ErrorKind::DuplicateProperty { name } => {
                write!(f, "duplicate property `{name}`")
            }
            ErrorKind::NestingTooDeep { limit } => {
                write!(f, "nesting exceeds max depth of {limit}")
            }
            ErrorKind::OutOfMemory { what } => write!(f, "out of memory: {what} cap exceeded"),
        }
    }
}

impl ErrorKind {
    /// A stable, dotted identifier for this error kind, suitable for programmatic matching.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::UnexpectedToken { .. } => "kdl::unexpected_token",
            ErrorKind::UnexpectedEof { .. } => "kdl::unexpected_eof",
            ErrorKind::InvalidNumber { .. } => "kdl::invalid_number",
            ErrorKind::InvalidString { .. } => "kdl::invalid_string",
            ErrorKind::InvalidEscape { .. } => "kdl::invalid_escape",
            ErrorKind::DuplicateProperty { .. } => "kdl::duplicate_property",
            ErrorKind::NestingTooDeep { .. } => "kdl::nesting_too_deep",
            ErrorKind::OutOfMemory { .. } => "kdl::out_of_memory",
        }
    }

    /// A short human-readable label, useful as a diagnostic pointer.
    pub fn label(&self) -> String {
        match self {
            ErrorKind::UnexpectedToken { expected, .. } => format!("expected {expected}"),
            ErrorKind::UnexpectedEof { expected } => format!("expected {expected}"),
            ErrorKind::InvalidNumber { reason, .. } => reason.to_string(),
            ErrorKind::InvalidString { reason } => reason.to_string(),
            ErrorKind::InvalidEscape { reason } => reason.to_string(),
            ErrorKind::DuplicateProperty { name } => format!("`{name}` already set"),
            ErrorKind::NestingTooDeep { .. } => "too deeply nested here".into(),
            ErrorKind::OutOfMemory { what } => format!("{what} cap exceeded"),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

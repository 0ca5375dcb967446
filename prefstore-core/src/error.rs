/*!
Error types for the Prefstore core engine.
*/

use crate::value::{Key, ValueKind};
use thiserror::Error;

/// Result type used throughout the Prefstore core.
pub type Result<T> = std::result::Result<T, PrefError>;

/// Errors that can occur while loading, validating or persisting settings.
#[derive(Error, Debug)]
pub enum PrefError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors while reading engine configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed settings text
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A value rejected by a type
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid schema or type construction
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Instance lock errors
    #[error("Lock error: {0}")]
    Lock(String),

    /// Rotation and settings file errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PrefError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new lock error
    pub fn lock<S: Into<String>>(msg: S) -> Self {
        Self::Lock(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

/// Why a key string was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,

    #[error("key {0:?} contains a double quote")]
    ContainsQuote(String),
}

/// Why a value was rejected by a type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected {expected}, found {found}")]
    WrongKind { expected: ValueKind, found: ValueKind },

    #[error("value is blank")]
    Blank,

    #[error("{value} is outside the range {min}..={max}")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    #[error("{value} does not fit in {target}")]
    Overflow { value: String, target: &'static str },

    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("unknown name {0:?}")]
    UnknownName(String),

    #[error("expected {expected} elements, found {found}")]
    WrongArity { expected: usize, found: usize },

    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("at {at}: {source}")]
    At {
        at: String,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("{0}")]
    Custom(String),
}

impl ValidationError {
    /// Wrap this error with the location of the offending element
    pub fn at<S: Into<String>>(self, at: S) -> Self {
        Self::At {
            at: at.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all location wrappers removed
    pub fn root(&self) -> &ValidationError {
        match self {
            Self::At { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }
}

/// Invalid schema, enumeration or keyed-set construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate property key {0}")]
    DuplicateKey(Key),

    #[error("duplicate enumeration name {0:?}")]
    DuplicateEnumName(String),

    #[error("enumeration value {0} registered twice")]
    DuplicateEnumValue(String),

    #[error("duplicate instance key {0:?}")]
    DuplicateInstanceKey(String),

    #[error("instance registered under both {first:?} and {second:?}")]
    DuplicateInstance { first: String, second: String },

    #[error("property {0} is not part of the schema")]
    UnknownProperty(Key),
}

/// Location of a parse error in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Byte offset from the start of the text
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
}

impl Position {
    /// Compute the line/column of a byte offset in `text`
    pub fn locate(text: &str, offset: usize) -> Self {
        let offset = offset.min(text.len());
        let before = text.get(..offset).unwrap_or(text);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Self {
            offset,
            line,
            column,
        }
    }
}

/// What went wrong while parsing settings text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unexpected character {0:?}")]
    UnexpectedCharacter(char),

    #[error("duplicate key {0:?}")]
    DuplicateKey(String),

    #[error("invalid key: {0}")]
    InvalidKey(KeyError),

    #[error("malformed number")]
    InvalidNumber,

    #[error("number has too many digits")]
    NumberOutOfRange,

    #[error("invalid escape sequence")]
    InvalidEscape,

    #[error("unescaped control character in string")]
    ControlCharacter,

    #[error("null is not a supported value")]
    UnsupportedNull,

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("trailing content after the root value")]
    TrailingContent,

    #[error("values nested too deeply")]
    NestingTooDeep,
}

/// Structured parse error: a kind plus where it happened
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at line {}, column {}", .position.line, .position.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: Position) -> Self {
        Self { kind, position }
    }
}

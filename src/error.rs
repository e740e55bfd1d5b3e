//! Error types.
//!
//! [`CodecError`] describes a failure inside one bucket's stream.
//! [`Error`] is what the two-level container reports: the same failure tagged
//! with the index of the bucket being encoded or decoded.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result of encoding or decoding one table.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Failure while encoding or decoding a single table.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("binary encoding failed: {0}")]
    Encode(String),

    /// Truncated stream, invalid varint, or a value of the wrong shape.
    #[error("binary decoding failed: {0}")]
    Decode(String),

    #[error("expected '{expected}' at byte {offset}, found {found}")]
    UnexpectedChar {
        expected: char,
        found: String,
        offset: usize,
    },

    #[error("invalid cell count at byte {offset}")]
    InvalidCount { offset: usize },

    #[error("invalid cell text at byte {offset}: {message}")]
    Text { offset: usize, message: String },

    /// The zero-key cell is always written first; finding it elsewhere means
    /// the stream was not produced by a table.
    #[error("zero key found at cell {index}, expected only at cell 0")]
    MisplacedZero { index: usize },

    #[error("duplicate key at cell {index}")]
    DuplicateKey { index: usize },

    /// A decoded key hashes to a different bucket than the one it was read
    /// into.
    #[error("cell belongs to bucket {owner}")]
    Misrouted { owner: usize },
}

/// Failure of a whole-container operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to encode bucket {bucket}: {source}")]
    Encode {
        bucket: usize,
        #[source]
        source: CodecError,
    },

    #[error("failed to decode bucket {bucket}: {source}")]
    Decode {
        bucket: usize,
        #[source]
        source: CodecError,
    },

    /// Input left over after the last bucket of a text document.
    #[error("trailing input at byte {offset}")]
    TrailingInput { offset: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Index of the bucket the failure belongs to, if any.
    pub fn bucket(&self) -> Option<usize> {
        match self {
            Self::Encode { bucket, .. } | Self::Decode { bucket, .. } => Some(*bucket),
            Self::TrailingInput { .. } | Self::Io(_) => None,
        }
    }
}

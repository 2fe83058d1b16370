//! Error types for archive-cursor.
//!
//! All fallible operations return [`Result<T>`], an alias for `Result<T, Error>`.
//!
//! # Error Categories
//!
//! - **Opening**: [`Open`], the source is unreadable or its format is not recognized
//! - **Structure**: [`Damaged`], corruption or truncation detected mid-stream
//! - **Lifecycle misuse**: [`State`], see [`StateError`]
//! - **Text codecs**: [`Encoding`], see [`EncodingError`]
//! - **Writing**: [`UnsupportedDigest`], [`InvalidEntry`], [`WriterFailed`]
//! - **Format features**: [`Unsupported`]
//! - **System errors**: [`Io`]
//!
//! [`Open`]: Error::Open
//! [`Damaged`]: Error::Damaged
//! [`State`]: Error::State
//! [`Encoding`]: Error::Encoding
//! [`UnsupportedDigest`]: Error::UnsupportedDigest
//! [`InvalidEntry`]: Error::InvalidEntry
//! [`WriterFailed`]: Error::WriterFailed
//! [`Unsupported`]: Error::Unsupported
//! [`Io`]: Error::Io

use std::io;

/// Result type alias for operations that may return an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by archive readers and writers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The archive could not be opened: unreadable source or unrecognized format.
    #[error("cannot open archive: {0}")]
    Open(String),

    /// Structural damage or truncation was detected while reading.
    ///
    /// No further entries are produced by a cursor after this error.
    #[error("{0}")]
    Damaged(String),

    /// The entry lifecycle contract was violated.
    #[error(transparent)]
    State(#[from] StateError),

    /// A metadata field could not be converted with the configured codec.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// A digest algorithm was requested that the target format cannot store.
    #[error("digest algorithm {algorithm:?} is not supported by {format} archives")]
    UnsupportedDigest {
        algorithm: String,
        format: &'static str,
    },

    /// An entry handed to a writer cannot be represented.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// A writer was used again after an error left a partial entry in its sink.
    #[error("archive writer failed on an earlier entry and cannot be used")]
    WriterFailed,

    /// The archive uses a feature this crate does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// I/O error from the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Misuse of an entry after it has left the `Active` state.
///
/// These are programming errors: they are never retried and never tolerated silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The content of the entry was already streamed to completion.
    #[error("content of entry #{0} has already been consumed")]
    Consumed(usize),

    /// The cursor advanced past the entry.
    #[error("entry #{0} is no longer the current entry of its archive")]
    Passed(usize),

    /// A block producer was already handed out for the entry.
    #[error("a block producer was already created for entry #{0}")]
    ProducerTaken(usize),

    /// The archive the entry belongs to has been closed.
    #[error("the archive of entry #{0} has been closed")]
    Closed(usize),
}

/// Failure to convert between raw metadata bytes and text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// The byte at `offset` has no meaning in `codec`.
    #[error("cannot decode byte {byte:#04x} at offset {offset} as {codec}")]
    Decode {
        codec: &'static str,
        byte: u8,
        offset: usize,
    },

    /// The character at `offset` cannot be represented in `codec`.
    #[error("cannot encode {ch:?} at offset {offset} as {codec}")]
    Encode {
        codec: &'static str,
        ch: char,
        offset: usize,
    },

    /// No codec is known under this name.
    #[error("unknown text codec {0:?}")]
    UnknownCodec(String),
}

impl Error {
    /// Returns true for errors caused by misuse of the entry lifecycle.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::State(_))
    }

    /// Returns true for errors reporting a damaged or truncated archive.
    pub fn is_damaged(&self) -> bool {
        matches!(self, Error::Damaged(_))
    }
}

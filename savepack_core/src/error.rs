//! Error taxonomy for container and cursor operations.
//!
//! Fatal conditions are `Error` values. Recoverable integrity problems are
//! [`IntegrityWarning`]s, which the container records instead of failing.

use std::io;

use thiserror::Error;

use crate::cursor::Mode;
use crate::integrity::to_hex;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Underlying stream failure. A failure during finalize leaves the
    /// output partially written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Codec could not be resolved or failed to inflate the payload.
    #[error("codec error: {0:#}")]
    Codec(anyhow::Error),

    #[error("operation requires {required:?} mode but container is {actual:?}")]
    WrongMode { required: Mode, actual: Mode },
}

/// Header-level problems detected on open.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("file requires reader version {min_version} but this reader is version {reader_version}")]
    UnsupportedVersion { min_version: u32, reader_version: u32 },

    #[error("unknown compression id {0}")]
    UnknownCompression(u32),

    #[error("{0} chunks do not fit in the u32 directory count")]
    TooManyChunks(usize),
}

/// Malformed or truncated chunk contents.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of payload at {position}: wanted {wanted} bytes, {available} available")]
    UnexpectedEof {
        position: usize,
        wanted: usize,
        available: usize,
    },

    #[error("string at {position} exceeds the {limit} byte limit")]
    StringTooLong { position: usize, limit: usize },

    #[error("string at {position} is not valid UTF-8")]
    InvalidUtf8 { position: usize },

    /// A variable-size array holds more elements than the destination can
    /// take; the excess cannot be skipped.
    #[error("array of {count} variable-size elements exceeds capacity {capacity}")]
    ArrayOverCapacity { count: usize, capacity: usize },

    #[error("array of {count} x {element_size} bytes exceeds the {remaining} bytes left in the payload")]
    ArrayExceedsPayload {
        count: usize,
        element_size: usize,
        remaining: usize,
    },

    /// Every stored element takes at least one byte, so a variable-size
    /// array can never hold more elements than bytes remain.
    #[error("array of {count} variable-size elements cannot fit in the {remaining} bytes left in the payload")]
    VariableArrayExceedsPayload { count: usize, remaining: usize },
}

/// Writer-side misuse of the array framing protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("array data was written ({start}..{end}) but no elements were added")]
    DataWithoutElements { start: usize, end: usize },

    #[error("element callback left {open} array frame(s) open")]
    UnbalancedArray { open: usize },

    #[error("array element {index} wrote no bytes")]
    EmptyElement { index: usize },

    #[error("array has {0} elements, more than a u32 frame header can hold")]
    TooManyElements(usize),

    #[error("array element of {0} bytes is larger than a u32 frame header can hold")]
    ElementTooLarge(usize),
}

/// Recoverable integrity problems. Loading may continue at the caller's
/// discretion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityWarning {
    #[error("payload inflated to {actual} bytes but header declares {declared}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("payload sha1 {} does not match header {}", to_hex(.actual), to_hex(.expected))]
    HashMismatch { expected: [u8; 20], actual: [u8; 20] },

    #[error("chunk {id} spans {offset}..{end} beyond the {payload_len} byte payload")]
    ChunkOutOfBounds {
        id: u32,
        offset: u64,
        end: u64,
        payload_len: u64,
    },
}

//! Chunked, compressed save-container format.
//!
//! A [`Container`] owns the header, chunk directory and in-memory payload.
//! Callers read or write one chunk at a time through a [`Cursor`], using the
//! same field sequence in both directions.

pub mod buffer;
pub mod codec;
pub mod container;
pub mod cursor;
pub mod error;
pub mod format;
pub mod integrity;

pub use codec::{Codec, CodecResolver};
pub use container::{Container, ContainerOptions, FinishSummary};
pub use cursor::{Cursor, Mode, Scalar};
pub use error::{DecodeError, Error, FormatError, FramingError, IntegrityWarning, Result};
pub use format::{ChunkEntry, Compression, Header, CHUNK_ENTRY_SIZE, HEADER_SIZE};

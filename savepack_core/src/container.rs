use std::borrow::Cow;
use std::io::{Read, Write};

use tracing::{debug, error, warn};

use crate::buffer::PayloadBuffer;
use crate::codec::CodecResolver;
use crate::cursor::{Cursor, Mode};
use crate::error::{Error, FormatError, IntegrityWarning, Result};
use crate::format::{
    ChunkEntry, Compression, Header, CHUNK_ENTRY_SIZE, DEFAULT_MAGIC, DEFAULT_MAX_STRING_LEN,
    FORMAT_VERSION, HEADER_SIZE, READ_BLOCK_SIZE,
};
use crate::integrity::sha1_digest;

/// Directory entries preallocated on open before any are actually read.
const MAX_PREALLOCATED_CHUNKS: usize = 4096;

/// Settings for opening or creating a container.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Written on create; required on open when `verify_magic` is set.
    pub magic: u32,
    pub verify_magic: bool,
    /// Written on create. On open, the version of this reader: files whose
    /// `min_version` is newer are rejected.
    pub target_version: u32,
    pub min_version: u32,
    /// Requested payload compression on create.
    pub compression: Compression,
    /// Longest string a cursor will decode, excluding the terminator.
    pub max_string_len: usize,
    /// Check the payload SHA-1 on open and record a warning on mismatch.
    pub verify_sha1_on_open: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            magic: DEFAULT_MAGIC,
            verify_magic: true,
            target_version: FORMAT_VERSION,
            min_version: FORMAT_VERSION,
            compression: Compression::Gzip,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            verify_sha1_on_open: false,
        }
    }
}

/// Outcome of finalizing a write-mode container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishSummary {
    /// Compression actually stored, after any fallback.
    pub compression: Compression,
    pub num_chunks: u32,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    /// Why compression was abandoned, if it was.
    pub fallback: Option<String>,
}

/// Chunked container over an in-memory payload.
///
/// # Format layout
/// ```text
/// [HEADER: 64 bytes]
/// [CHUNK DIRECTORY: 20 bytes × num_chunks]
/// [PAYLOAD: compressed_size bytes, gzip if compression == 1]
/// ```
///
/// Reading loads and inflates the whole payload on open. Writing collects
/// chunks in memory and commits header, directory and payload in one pass
/// when the container is finalized, either by [`Container::finish`] or, for
/// containers abandoned by an early return or unwind, on drop. Finalize runs
/// at most once.
pub struct Container<'s> {
    mode: Mode,
    header: Header,
    chunks: Vec<ChunkEntry>,
    buffer: PayloadBuffer,
    options: ContainerOptions,
    resolve: CodecResolver,
    /// Output stream; present in write mode until finalized.
    sink: Option<Box<dyn Write + 's>>,
    warnings: Vec<IntegrityWarning>,
}

impl<'s> Container<'s> {
    /// Load a container from `stream`.
    ///
    /// Bad magic, an unsupported version or an unknown compression id abort
    /// the load. A size mismatch after inflating, or directory entries that
    /// point past the payload, are recorded in [`Container::warnings`].
    pub fn open<R: Read>(mut stream: R, options: ContainerOptions, resolve: CodecResolver) -> Result<Self> {
        // ── Header ──────────────────────────────────────────────────────────
        let mut header_buf = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header_buf)?;
        let header = Header::from_bytes(&header_buf);

        if options.verify_magic && header.magic != options.magic {
            return Err(FormatError::BadMagic {
                expected: options.magic,
                found: header.magic,
            }
            .into());
        }
        if header.min_version > options.target_version {
            return Err(FormatError::UnsupportedVersion {
                min_version: header.min_version,
                reader_version: options.target_version,
            }
            .into());
        }
        let compression = header.compression()?;

        // ── Chunk directory ─────────────────────────────────────────────────
        let mut chunks = Vec::with_capacity((header.num_chunks as usize).min(MAX_PREALLOCATED_CHUNKS));
        let mut entry_buf = [0u8; CHUNK_ENTRY_SIZE];
        for _ in 0..header.num_chunks {
            stream.read_exact(&mut entry_buf)?;
            chunks.push(ChunkEntry::from_bytes(&entry_buf));
        }

        // ── Payload ─────────────────────────────────────────────────────────
        let raw = read_payload(&mut stream, header.compressed_size)?;
        let codec = resolve(compression).map_err(Error::Codec)?;
        let expected_len = usize::try_from(header.uncompressed_size).unwrap_or(usize::MAX);
        let payload = codec.decompress(&raw, expected_len).map_err(Error::Codec)?;

        let mut warnings = Vec::new();
        if payload.len() as u64 != header.uncompressed_size {
            warnings.push(IntegrityWarning::SizeMismatch {
                declared: header.uncompressed_size,
                actual: payload.len() as u64,
            });
        }
        for entry in &chunks {
            if entry.end() > payload.len() as u64 {
                warnings.push(IntegrityWarning::ChunkOutOfBounds {
                    id: entry.id,
                    offset: entry.offset,
                    end: entry.end(),
                    payload_len: payload.len() as u64,
                });
            }
        }
        if options.verify_sha1_on_open {
            let actual = sha1_digest(&payload);
            if actual != header.sha1 {
                warnings.push(IntegrityWarning::HashMismatch {
                    expected: header.sha1,
                    actual,
                });
            }
        }
        for warning in &warnings {
            warn!(%warning, "container integrity warning");
        }

        debug!(
            chunks = chunks.len(),
            compression = codec.name(),
            compressed_size = header.compressed_size,
            uncompressed_size = payload.len(),
            "opened container"
        );

        Ok(Self {
            mode: Mode::Reading,
            header,
            chunks,
            buffer: PayloadBuffer::from_vec(payload),
            options,
            resolve,
            sink: None,
            warnings,
        })
    }

    /// Start an empty container that is committed to `sink` on finalize.
    pub fn create<W: Write + 's>(sink: W, options: ContainerOptions, resolve: CodecResolver) -> Self {
        let header = Header {
            magic: options.magic,
            target_version: options.target_version,
            min_version: options.min_version,
            compression: options.compression as u32,
            ..Header::default()
        };
        Self {
            mode: Mode::Writing,
            header,
            chunks: Vec::new(),
            buffer: PayloadBuffer::new(),
            options,
            resolve,
            sink: Some(Box::new(sink)),
            warnings: Vec::new(),
        }
    }

    /// Create a container, fill it with `f`, and finalize it.
    ///
    /// Finalize runs even when `f` fails, committing the chunks completed
    /// before the failure; `f`'s error is returned in that case.
    pub fn write_with<W, F>(
        sink: W,
        options: ContainerOptions,
        resolve: CodecResolver,
        f: F,
    ) -> Result<FinishSummary>
    where
        W: Write + 's,
        F: FnOnce(&mut Container<'s>) -> Result<()>,
    {
        let mut container = Container::create(sink, options, resolve);
        let outcome = f(&mut container);
        let finished = container.finish();
        match outcome {
            Ok(()) => finished,
            Err(err) => {
                if let Err(finish_err) = finished {
                    error!(error = %finish_err, "finalize after a failed write also failed");
                }
                Err(err)
            }
        }
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Header as read from the file, or as it will be written (sizes and
    /// digest are only filled in on finalize).
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// Chunk directory in file order (write mode: in the order chunks were written).
    pub fn chunks(&self) -> &[ChunkEntry] {
        &self.chunks
    }

    /// Full uncompressed payload.
    pub fn payload(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Integrity problems found on open.
    pub fn warnings(&self) -> &[IntegrityWarning] {
        &self.warnings
    }

    /// First directory entry with `id`.
    pub fn chunk(&self, id: u32) -> Option<&ChunkEntry> {
        self.chunks.iter().find(|entry| entry.id == id)
    }

    /// Raw bytes of the first chunk with `id`, if present and in bounds.
    pub fn chunk_bytes(&self, id: u32) -> Option<&[u8]> {
        let entry = self.chunk(id)?;
        let start = usize::try_from(entry.offset).ok()?;
        let end = usize::try_from(entry.end()).ok()?;
        self.buffer.as_slice().get(start..end)
    }

    /// Compare the payload digest against the header.
    ///
    /// Meaningful for containers opened for reading; a write-mode header has
    /// no digest until finalize.
    pub fn verify_sha1(&self) -> Result<(), IntegrityWarning> {
        let actual = sha1_digest(self.buffer.as_slice());
        if actual == self.header.sha1 {
            Ok(())
        } else {
            Err(IntegrityWarning::HashMismatch {
                expected: self.header.sha1,
                actual,
            })
        }
    }

    /// Read or write the chunk `id` through `f`.
    ///
    /// Reading positions a cursor at the first chunk with `id` and returns
    /// `Ok(false)` without calling `f` when there is none. Writing appends a
    /// new chunk at the end of the payload; if `f` fails the partial chunk is
    /// discarded and no directory entry is added.
    pub fn read_write_chunk<F>(&mut self, id: u32, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Cursor<'_>) -> Result<()>,
    {
        let max_string_len = self.options.max_string_len;
        match self.mode {
            Mode::Reading => {
                let offset = match self.chunk(id) {
                    Some(entry) => entry.offset,
                    None => return Ok(false),
                };
                self.buffer
                    .set_position(usize::try_from(offset).unwrap_or(usize::MAX));
                let mut cursor = Cursor::new(&mut self.buffer, Mode::Reading, max_string_len);
                f(&mut cursor)?;
                Ok(true)
            }
            Mode::Writing => {
                let offset = self.buffer.len();
                self.buffer.set_position(offset);
                let mut cursor = Cursor::new(&mut self.buffer, Mode::Writing, max_string_len);
                if let Err(err) = f(&mut cursor) {
                    self.buffer.truncate(offset);
                    return Err(err);
                }
                let length = self.buffer.position() - offset;
                self.chunks.push(ChunkEntry {
                    id,
                    offset: offset as u64,
                    length: length as u64,
                });
                Ok(true)
            }
        }
    }

    /// Finalize a write-mode container and report the outcome.
    pub fn finish(mut self) -> Result<FinishSummary> {
        self.finalize()
    }

    /// Hash, compress and commit header, directory and payload to the sink.
    fn finalize(&mut self) -> Result<FinishSummary> {
        let mut sink = match self.sink.take() {
            Some(sink) => sink,
            None => {
                return Err(Error::WrongMode {
                    required: Mode::Writing,
                    actual: self.mode,
                })
            }
        };

        let payload = self.buffer.as_slice();
        self.header.num_chunks = u32::try_from(self.chunks.len())
            .map_err(|_| FormatError::TooManyChunks(self.chunks.len()))?;
        self.header.uncompressed_size = payload.len() as u64;
        self.header.sha1 = sha1_digest(payload);

        let requested = self.options.compression;
        let (compression, stored, fallback): (Compression, Cow<'_, [u8]>, Option<String>) =
            match (self.resolve)(requested).and_then(|codec| codec.compress(payload)) {
                Ok(bytes) => (requested, Cow::Owned(bytes), None),
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(
                        requested = requested.name(),
                        %reason,
                        "compression failed, storing payload uncompressed"
                    );
                    (Compression::None, Cow::Borrowed(payload), Some(reason))
                }
            };
        self.header.compression = compression as u32;
        self.header.compressed_size = stored.len() as u64;

        sink.write_all(&self.header.to_bytes())?;
        for entry in &self.chunks {
            sink.write_all(&entry.to_bytes())?;
        }
        sink.write_all(&stored)?;
        sink.flush()?;

        debug!(
            chunks = self.header.num_chunks,
            compression = compression.name(),
            uncompressed_size = self.header.uncompressed_size,
            compressed_size = self.header.compressed_size,
            "finalized container"
        );

        Ok(FinishSummary {
            compression,
            num_chunks: self.header.num_chunks,
            uncompressed_size: self.header.uncompressed_size,
            compressed_size: self.header.compressed_size,
            fallback,
        })
    }
}

impl Drop for Container<'_> {
    fn drop(&mut self) {
        if self.sink.is_some() {
            if let Err(err) = self.finalize() {
                error!(error = %err, "finalizing container on drop failed; output is incomplete");
            }
        }
    }
}

/// Read exactly `len` bytes in blocks of at most `READ_BLOCK_SIZE`.
fn read_payload<R: Read>(stream: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    let mut block = [0u8; READ_BLOCK_SIZE];
    let mut left = len;
    while left > 0 {
        let n = left.min(READ_BLOCK_SIZE as u64) as usize;
        stream.read_exact(&mut block[..n])?;
        raw.extend_from_slice(&block[..n]);
        left -= n as u64;
    }
    Ok(raw)
}

use crate::error::FormatError;

/// Default magic: "SPAK" read as a native-endian u32.
pub const DEFAULT_MAGIC: u32 = u32::from_ne_bytes(*b"SPAK");

/// Format version written by this implementation.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed size of the container header in bytes.
///   magic:u32 + target_version:u32 + min_version:u32 + num_chunks:u32
///   + uncompressed_size:u64 + compression:u32 + compressed_size:u64
///   + sha1[20] + reserved[8]
///   = 4 + 4 + 4 + 4 + 8 + 4 + 8 + 20 + 8 = 64
pub const HEADER_SIZE: usize = 64;

/// Size of each ChunkEntry in the chunk directory, in bytes.
///   id:u32 + offset:u64 + length:u64 = 4 + 8 + 8 = 20
pub const CHUNK_ENTRY_SIZE: usize = 20;

/// Size of an array frame header: count:u32 + element_size:u32.
pub const ARRAY_HEADER_SIZE: usize = 8;

/// Largest single read issued against the raw stream while loading the payload.
pub const READ_BLOCK_SIZE: usize = 2048;

/// Default upper bound on a decoded string, excluding the terminator.
pub const DEFAULT_MAX_STRING_LEN: usize = 1 << 20;

// ── Compression ────────────────────────────────────────────────────────────

/// Payload compression stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Compression {
    None = 0,
    Gzip = 1,
}

impl Compression {
    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
        }
    }
}

impl TryFrom<u32> for Compression {
    type Error = FormatError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            other => Err(FormatError::UnknownCompression(other)),
        }
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 64-byte container header.
///
/// Integers are stored native-endian; a file is only portable between
/// platforms of the same byte order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    /// Version of the producer that wrote the file.
    pub target_version: u32,
    /// Oldest reader version able to load the file.
    pub min_version: u32,
    pub num_chunks: u32,
    pub uncompressed_size: u64,
    /// Raw compression id; see [`Header::compression`].
    pub compression: u32,
    pub compressed_size: u64,
    /// SHA-1 of the uncompressed payload.
    pub sha1: [u8; 20],
}

impl Header {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.target_version.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.min_version.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.num_chunks.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.uncompressed_size.to_ne_bytes());
        buf[24..28].copy_from_slice(&self.compression.to_ne_bytes());
        buf[28..36].copy_from_slice(&self.compressed_size.to_ne_bytes());
        buf[36..56].copy_from_slice(&self.sha1);
        // reserved[8] stays zero
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes. The reserved tail is ignored.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut sha1 = [0u8; 20];
        sha1.copy_from_slice(&buf[36..56]);
        Self {
            magic: ne_u32(buf, 0),
            target_version: ne_u32(buf, 4),
            min_version: ne_u32(buf, 8),
            num_chunks: ne_u32(buf, 12),
            uncompressed_size: ne_u64(buf, 16),
            compression: ne_u32(buf, 24),
            compressed_size: ne_u64(buf, 28),
            sha1,
        }
    }

    /// Decode the compression id.
    pub fn compression(&self) -> Result<Compression, FormatError> {
        Compression::try_from(self.compression)
    }
}

// ── Chunk directory entry ──────────────────────────────────────────────────

/// One entry in the chunk directory.
///
/// `offset` and `length` address the uncompressed payload buffer, not the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkEntry {
    pub id: u32,
    pub offset: u64,
    pub length: u64,
}

impl ChunkEntry {
    /// Serialize to exactly `CHUNK_ENTRY_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; CHUNK_ENTRY_SIZE] {
        let mut buf = [0u8; CHUNK_ENTRY_SIZE];
        buf[0..4].copy_from_slice(&self.id.to_ne_bytes());
        buf[4..12].copy_from_slice(&self.offset.to_ne_bytes());
        buf[12..20].copy_from_slice(&self.length.to_ne_bytes());
        buf
    }

    /// Deserialize from `CHUNK_ENTRY_SIZE` bytes.
    pub fn from_bytes(buf: &[u8; CHUNK_ENTRY_SIZE]) -> Self {
        Self {
            id: ne_u32(buf, 0),
            offset: ne_u64(buf, 4),
            length: ne_u64(buf, 12),
        }
    }

    /// End of the chunk within the payload, saturating on overflow.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

fn ne_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_ne_bytes(b)
}

fn ne_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_ne_bytes(b)
}

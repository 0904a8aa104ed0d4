use std::sync::Arc;

use crate::format::Compression;

/// Payload compression abstraction.
///
/// Each `Codec` implementation:
/// - Is identified by the [`Compression`] id it stores in the header.
/// - Compresses and decompresses the whole uncompressed payload in one call;
///   there is no streaming mode.
/// - Reports failure as an error rather than a partial buffer. A failed
///   `compress` makes the container fall back to uncompressed storage.
pub trait Codec: Send + Sync {
    /// Compression id stored in the container header.
    fn compression(&self) -> Compression;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// `expected_len` is the size declared in the header. It is a capacity
    /// hint only: the caller compares it against the actual output.
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> anyhow::Result<Vec<u8>>;
}

/// Maps a header compression id to a codec.
///
/// `savepack_codecs::codec_by_id` is the standard resolver.
pub type CodecResolver = fn(Compression) -> anyhow::Result<Arc<dyn Codec>>;

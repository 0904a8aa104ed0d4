use std::io::{Read, Write};

use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use savepack_core::{Codec, Compression};

/// Inflated bytes preallocated per compressed byte; caps the header's
/// declared size so a corrupt header cannot force a huge allocation.
const MAX_PREALLOC_RATIO: usize = 16;

/// Gzip payload codec (deflate with a gzip wrapper).
pub struct GzipCodec {
    /// Compression level (0 = store, 9 = smallest).
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Codec for GzipCodec {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder.write_all(raw).context("gzip deflate")?;
        let compressed = encoder.finish().context("gzip deflate")?;
        Ok(compressed)
    }

    fn decompress(&self, compressed: &[u8], expected_len: usize) -> anyhow::Result<Vec<u8>> {
        let capacity = expected_len.min(compressed.len().saturating_mul(MAX_PREALLOC_RATIO));
        let mut raw = Vec::with_capacity(capacity);
        GzDecoder::new(compressed)
            .read_to_end(&mut raw)
            .context("gzip inflate")?;
        Ok(raw)
    }
}

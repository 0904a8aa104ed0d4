use savepack_core::{Codec, Compression};

/// No-op codec: stores the payload verbatim.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn compression(&self) -> Compression {
        Compression::None
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, compressed: &[u8], _expected_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

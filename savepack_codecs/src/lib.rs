mod gzip_codec;
mod passthrough;

pub use gzip_codec::GzipCodec;
pub use passthrough::PassThroughCodec;

use savepack_core::{Codec, Compression};
use std::sync::Arc;

/// Resolve a codec from the header's compression id.
///
/// This is the standard [`savepack_core::CodecResolver`] passed to
/// `Container::open` and `Container::create`.
pub fn codec_by_id(compression: Compression) -> anyhow::Result<Arc<dyn Codec>> {
    match compression {
        Compression::None => Ok(Arc::new(PassThroughCodec)),
        Compression::Gzip => Ok(Arc::new(GzipCodec::default())),
    }
}

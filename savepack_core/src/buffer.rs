use crate::error::DecodeError;

/// Growable in-memory payload with an explicit position.
///
/// Supports absolute seek plus overwrite, which the array framing needs to
/// patch a frame header after its elements are written. Writing past the
/// end extends the buffer; reading past the end is a decode error.
#[derive(Debug, Default, Clone)]
pub struct PayloadBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl PayloadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing payload, positioned at the start.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position. Positions beyond the end are allowed;
    /// the next read fails and the next write zero-fills the gap.
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes between the position and the end.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<(), DecodeError> {
        if out.len() > self.remaining() {
            return Err(self.eof(out.len()));
        }
        out.copy_from_slice(&self.data[self.pos..self.pos + out.len()]);
        self.pos += out.len();
        Ok(())
    }

    /// Read bytes up to a null terminator, consuming the terminator.
    ///
    /// Fails with `StringTooLong` once more than `limit` bytes precede the
    /// terminator, so a stream with no null byte cannot grow without bound.
    pub fn read_until_nul(&mut self, limit: usize) -> Result<&[u8], DecodeError> {
        let start = self.pos;
        let window = self.remaining().min(limit.saturating_add(1));
        let tail = &self.data[start.min(self.data.len())..];
        match tail[..window].iter().position(|&b| b == 0) {
            Some(len) => {
                self.pos = start + len + 1;
                Ok(&self.data[start..start + len])
            }
            None if self.remaining() > limit => Err(DecodeError::StringTooLong {
                position: start,
                limit,
            }),
            None => Err(self.eof(self.remaining() + 1)),
        }
    }

    /// Write at the position, overwriting existing bytes and extending as needed.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.pos > self.data.len() {
            self.data.resize(self.pos, 0);
        }
        let overlap = (self.data.len() - self.pos).min(bytes.len());
        self.data[self.pos..self.pos + overlap].copy_from_slice(&bytes[..overlap]);
        self.data.extend_from_slice(&bytes[overlap..]);
        self.pos += bytes.len();
    }

    /// Drop everything from `len` onwards and move the position there.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
        self.pos = len;
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn eof(&self, wanted: usize) -> DecodeError {
        DecodeError::UnexpectedEof {
            position: self.pos,
            wanted,
            available: self.remaining(),
        }
    }
}

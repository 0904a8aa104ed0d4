use num_traits::AsPrimitive;

use crate::buffer::PayloadBuffer;
use crate::error::{DecodeError, FramingError, Result};
use crate::format::ARRAY_HEADER_SIZE;

/// Direction of a container and every cursor derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Reading,
    Writing,
}

// ── Scalars ────────────────────────────────────────────────────────────────

mod sealed {
    pub trait Sealed {}
}

/// Fixed-size value copied verbatim (native-endian) to and from the payload.
pub trait Scalar: sealed::Sealed + Copy + Default + 'static {
    #[doc(hidden)]
    fn load(buffer: &mut PayloadBuffer) -> Result<Self, DecodeError>;
    #[doc(hidden)]
    fn store(self, buffer: &mut PayloadBuffer);
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}

            impl Scalar for $t {
                fn load(buffer: &mut PayloadBuffer) -> Result<Self, DecodeError> {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    buffer.read_exact(&mut bytes)?;
                    Ok(<$t>::from_ne_bytes(bytes))
                }

                fn store(self, buffer: &mut PayloadBuffer) {
                    buffer.write(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl sealed::Sealed for bool {}

impl Scalar for bool {
    fn load(buffer: &mut PayloadBuffer) -> Result<Self, DecodeError> {
        Ok(u8::load(buffer)? != 0)
    }

    fn store(self, buffer: &mut PayloadBuffer) {
        (self as u8).store(buffer);
    }
}

// ── Array frames ───────────────────────────────────────────────────────────

/// Bookkeeping for one open array.
///
/// In write mode `count` is the number of committed elements; in read mode it
/// counts down the elements still to be visited.
#[derive(Debug, Clone, Copy, Default)]
struct ArrayFrame {
    start_pos: usize,
    last_pos: usize,
    count: usize,
    element_size: usize,
}

/// Forward read/write head over the payload, scoped to one chunk.
///
/// Every operation is dual-mode: the same call sequence reads a chunk in
/// [`Mode::Reading`] and writes it in [`Mode::Writing`], so a schema is
/// expressed once for both directions.
///
/// # Array framing
/// Vectors and fixed arrays are written as `count:u32`, `element_size:u32`,
/// then `count` elements back to back. `element_size` is the common byte span
/// of every element, or 0 when spans differ.
///
/// When reading a uniform array the position is forced to the start of the
/// next element after each callback, so a callback that under- or over-reads
/// (older or newer schema) does not disturb the following elements. A
/// variable-size array (`element_size == 0`) has no such correction: each
/// callback must consume exactly what was written, and any drift misaligns
/// everything read after it.
pub struct Cursor<'a> {
    buffer: &'a mut PayloadBuffer,
    mode: Mode,
    frames: Vec<ArrayFrame>,
    max_string_len: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buffer: &'a mut PayloadBuffer, mode: Mode, max_string_len: usize) -> Self {
        Self {
            buffer,
            mode,
            frames: Vec::new(),
            max_string_len,
        }
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Absolute position within the payload.
    #[inline]
    pub fn position(&self) -> usize {
        self.buffer.position()
    }

    // ── Values ─────────────────────────────────────────────────────────────

    pub fn read_write<T: Scalar>(&mut self, value: &mut T) -> Result<()> {
        match self.mode {
            Mode::Reading => *value = T::load(self.buffer)?,
            Mode::Writing => value.store(self.buffer),
        }
        Ok(())
    }

    /// Store `value` as the narrower or wider wire type `W`.
    ///
    /// Writing casts to `W` (truncating like `as`); reading casts back.
    pub fn read_write_as<W, M>(&mut self, value: &mut M) -> Result<()>
    where
        W: Scalar + AsPrimitive<M>,
        M: AsPrimitive<W>,
    {
        match self.mode {
            Mode::Reading => *value = W::load(self.buffer)?.as_(),
            Mode::Writing => {
                let wire: W = value.as_();
                wire.store(self.buffer);
            }
        }
        Ok(())
    }

    /// Read a value. In write mode a default (zero) value is written and returned.
    pub fn read<T: Scalar>(&mut self) -> Result<T> {
        let mut value = T::default();
        self.read_write(&mut value)?;
        Ok(value)
    }

    /// Write a constant. In read mode the value is read and discarded.
    pub fn write<T: Scalar>(&mut self, value: T) -> Result<()> {
        match self.mode {
            Mode::Reading => {
                T::load(self.buffer)?;
            }
            Mode::Writing => value.store(self.buffer),
        }
        Ok(())
    }

    /// Raw fixed-length byte block.
    pub fn read_write_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        match self.mode {
            Mode::Reading => self.buffer.read_exact(bytes)?,
            Mode::Writing => self.buffer.write(bytes),
        }
        Ok(())
    }

    // ── Strings ────────────────────────────────────────────────────────────

    /// Null-terminated string. Writing stops at the first embedded null, so
    /// `"ab\0cd"` is stored and read back as `"ab"`.
    pub fn read_write_string(&mut self, value: &mut String) -> Result<()> {
        match self.mode {
            Mode::Reading => *value = self.read_string()?,
            Mode::Writing => self.write_string(value),
        }
        Ok(())
    }

    /// Write a constant string. In read mode a string is read and discarded.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        match self.mode {
            Mode::Reading => {
                self.read_string()?;
            }
            Mode::Writing => self.write_string(value),
        }
        Ok(())
    }

    fn read_string(&mut self) -> Result<String> {
        let position = self.buffer.position();
        let bytes = self.buffer.read_until_nul(self.max_string_len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { position })?;
        Ok(s.to_owned())
    }

    fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buffer.write(&bytes[..len]);
        self.buffer.write(&[0]);
    }

    // ── Sequences ──────────────────────────────────────────────────────────

    /// Variable-length sequence.
    ///
    /// Reading clears `vec`, then pushes a default element per stored entry
    /// and lets `f` populate it.
    pub fn read_write_vec<T, F>(&mut self, vec: &mut Vec<T>, mut f: F) -> Result<()>
    where
        T: Default,
        F: FnMut(&mut Self, &mut T) -> Result<()>,
    {
        match self.mode {
            Mode::Reading => {
                let count = self.begin_array()?;
                vec.clear();
                // bounded by the payload in bytes, not by the declared count
                let fits = self.buffer.remaining() / std::mem::size_of::<T>().max(1);
                vec.reserve(count.min(fits));
                for _ in 0..count {
                    vec.push(T::default());
                    if let Some(el) = vec.last_mut() {
                        self.visit_element(|cursor| f(cursor, el))?;
                    }
                    self.next_element()?;
                }
            }
            Mode::Writing => {
                self.begin_array()?;
                for el in vec.iter_mut() {
                    self.visit_element(|cursor| f(cursor, el))?;
                    self.next_element()?;
                }
            }
        }
        self.end_array()
    }

    /// Fixed-capacity array.
    ///
    /// Writing: `f` returns whether the slot holds data. Only slots returning
    /// `true` are counted; bytes written for a `false` slot are discarded.
    ///
    /// Reading: every slot is reset to its default first. Stored elements
    /// beyond `slots.len()` are skipped when the array has a uniform element
    /// size; a variable-size array that overflows the capacity fails with
    /// [`DecodeError::ArrayOverCapacity`]. The return value of `f` is ignored.
    pub fn read_write_array<T, F>(&mut self, slots: &mut [T], mut f: F) -> Result<()>
    where
        T: Default,
        F: FnMut(&mut Self, &mut T) -> Result<bool>,
    {
        match self.mode {
            Mode::Reading => {
                let count = self.begin_array()?;
                let element_size = self.top_frame().element_size;
                if count > slots.len() && element_size == 0 {
                    return Err(DecodeError::ArrayOverCapacity {
                        count,
                        capacity: slots.len(),
                    }
                    .into());
                }
                for slot in slots.iter_mut() {
                    *slot = T::default();
                }
                for i in 0..count {
                    if let Some(slot) = slots.get_mut(i) {
                        self.visit_element(|cursor| f(cursor, slot).map(|_| ()))?;
                    }
                    self.next_element()?;
                }
            }
            Mode::Writing => {
                self.begin_array()?;
                for slot in slots.iter_mut() {
                    let mark = self.buffer.position();
                    let mut keep = false;
                    self.visit_element(|cursor| {
                        keep = f(cursor, slot)?;
                        Ok(())
                    })?;
                    if keep {
                        self.next_element()?;
                    } else {
                        self.buffer.truncate(mark);
                    }
                }
            }
        }
        self.end_array()
    }

    /// Run one element callback and check it closed every frame it opened.
    fn visit_element<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let depth = self.frames.len();
        f(self)?;
        if self.frames.len() != depth {
            return Err(FramingError::UnbalancedArray {
                open: self.frames.len().saturating_sub(depth),
            }
            .into());
        }
        Ok(())
    }

    // ── Framing ────────────────────────────────────────────────────────────

    fn top_frame(&mut self) -> &mut ArrayFrame {
        // Frames are pushed and popped only by the sequence methods, which
        // always pair begin_array with end_array.
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn begin_array(&mut self) -> Result<usize> {
        let start_pos = self.buffer.position();
        let frame = match self.mode {
            Mode::Reading => {
                let count = u32::load(self.buffer)? as usize;
                let element_size = u32::load(self.buffer)? as usize;
                let remaining = self.buffer.remaining();
                if element_size != 0 && count.saturating_mul(element_size) > remaining {
                    return Err(DecodeError::ArrayExceedsPayload {
                        count,
                        element_size,
                        remaining,
                    }
                    .into());
                }
                if element_size == 0 && count > remaining {
                    return Err(DecodeError::VariableArrayExceedsPayload { count, remaining }.into());
                }
                ArrayFrame {
                    start_pos,
                    last_pos: self.buffer.position(),
                    count,
                    element_size,
                }
            }
            Mode::Writing => {
                0u32.store(self.buffer);
                0u32.store(self.buffer);
                ArrayFrame {
                    start_pos,
                    last_pos: self.buffer.position(),
                    count: 0,
                    element_size: 0,
                }
            }
        };
        self.frames.push(frame);
        Ok(frame.count)
    }

    fn next_element(&mut self) -> Result<()> {
        let position = self.buffer.position();
        let mode = self.mode;
        let frame = self.top_frame();
        match mode {
            Mode::Reading => {
                if frame.count == 0 {
                    return Ok(());
                }
                if frame.element_size != 0 {
                    frame.last_pos += frame.element_size;
                    let next = frame.last_pos;
                    frame.count -= 1;
                    self.buffer.set_position(next);
                } else {
                    frame.count -= 1;
                }
            }
            Mode::Writing => {
                let size = position - frame.last_pos;
                if size == 0 {
                    return Err(FramingError::EmptyElement { index: frame.count }.into());
                }
                if frame.count == 0 {
                    frame.element_size = size;
                } else if frame.element_size != size {
                    frame.element_size = 0;
                }
                frame.count += 1;
                frame.last_pos = position;
            }
        }
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        if self.mode == Mode::Reading {
            return Ok(());
        }

        let end = self.buffer.position();
        if frame.count == 0 && end != frame.start_pos + ARRAY_HEADER_SIZE {
            return Err(FramingError::DataWithoutElements {
                start: frame.start_pos,
                end,
            }
            .into());
        }
        let count =
            u32::try_from(frame.count).map_err(|_| FramingError::TooManyElements(frame.count))?;
        let element_size = u32::try_from(frame.element_size)
            .map_err(|_| FramingError::ElementTooLarge(frame.element_size))?;

        self.buffer.set_position(frame.start_pos);
        count.store(self.buffer);
        element_size.store(self.buffer);
        self.buffer.set_position(end);
        Ok(())
    }
}

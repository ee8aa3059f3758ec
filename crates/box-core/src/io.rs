//! Binary data streams
//!
//! [`DataOutput`] and [`DataInput`] are the byte-level pair every codec in the
//! workspace writes through. All multi-byte values are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Growable big-endian output buffer
#[derive(Debug, Default, Clone)]
pub struct DataOutput {
    buf: BytesMut,
}

impl DataOutput {
    /// Create empty output
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create output with reserved capacity
    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes written so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing was written
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    /// Write bytes without a length prefix
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Write a `u32` length prefix followed by the bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_u32(len_u32(bytes.len()));
        self.buf.put_slice(bytes);
    }

    /// Write a UTF-8 string with a `u32` byte-length prefix
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Reserve a `u32` slot to be filled in later with [`Self::patch_u32`]
    ///
    /// Returns the slot position.
    pub fn reserve_u32(&mut self) -> usize {
        let at = self.buf.len();
        self.buf.put_u32(0);
        at
    }

    /// Overwrite a previously reserved `u32` slot
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Written bytes
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Freeze into an immutable buffer
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Largest number of entries a `u16` count field can describe
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// Converts an entry count into the `u16` used by count fields.
///
/// Schemas with more than [`MAX_ENTRIES`] fields per collection are rejected
/// at registration, arrays are at most `u16::MAX` long and addresses deeper
/// than [`MAX_ENTRIES`] keys cannot be parsed or decoded, so a larger count is
/// a broken invariant.
///
/// # Panics
/// When `len` exceeds [`MAX_ENTRIES`]
#[inline]
pub(crate) fn count_u16(len: usize) -> u16 {
    match u16::try_from(len) {
        Ok(count) => count,
        Err(_) => panic!("{len} entries exceed the u16 count field"),
    }
}

/// Converts a buffer length into the `u32` used by length prefixes.
///
/// Payloads beyond 4 GiB do not occur in box state; saturate rather than wrap.
#[inline]
pub(crate) fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Big-endian input cursor over an immutable buffer
///
/// Every read checks the remaining length first; truncated input yields
/// [`IoError::UnexpectedEof`] instead of panicking.
#[derive(Debug, Clone)]
pub struct DataInput {
    buf: Bytes,
}

impl DataInput {
    /// Create input over a buffer
    #[inline]
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Create input by copying a slice
    #[inline]
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    /// Unread byte count
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Check if everything was consumed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), IoError> {
        if self.buf.remaining() < needed {
            return Err(IoError::UnexpectedEof {
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, IoError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, IoError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::InvalidBool(other)),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, IoError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32, IoError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_i32(&mut self) -> Result<i32, IoError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_f32(&mut self) -> Result<f32, IoError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    /// Read exactly `len` bytes without copying
    pub fn read_raw(&mut self, len: usize) -> Result<Bytes, IoError> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Read a `u32` length prefix followed by that many bytes
    pub fn read_bytes(&mut self) -> Result<Bytes, IoError> {
        let len = self.read_u32()? as usize;
        self.read_raw(len)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, IoError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| IoError::InvalidUtf8)
    }

    /// Discard `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<(), IoError> {
        self.ensure(len)?;
        self.buf.advance(len);
        Ok(())
    }
}

/// Errors raised while reading binary input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    /// Input ended before a value was complete
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// String payload was not UTF-8
    #[error("invalid utf-8 in string payload")]
    InvalidUtf8,

    /// Boolean byte other than 0 or 1
    #[error("invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),
}

//! Primitive field codec for hyperfuse frames.
//!
//! Every integer is fixed-width big-endian. Strings are a `u16` length
//! followed by the raw bytes, with no terminator.

/// Codec errors raised while encoding or decoding primitive fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("buffer truncated: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("string of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),
}

/// Appends wire fields to a growable buffer.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Append a length-prefixed string.
    pub fn put_string(&mut self, bytes: &[u8]) -> Result<&mut Self, WireError> {
        let len = u16::try_from(bytes.len()).map_err(|_| WireError::StringTooLong(bytes.len()))?;
        self.put_u16(len);
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    /// Append raw bytes without a prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Overwrite a previously written `u32` at `offset`.
    ///
    /// Used by the frame encoder to back-fill the length field once the
    /// body is complete.
    pub(crate) fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a borrowed buffer that decodes wire fields.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(WireError::Truncated {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        self.take_array().map(u16::from_be_bytes)
    }

    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        self.take_array().map(u32::from_be_bytes)
    }

    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        self.take_array().map(i32::from_be_bytes)
    }

    /// Read a length-prefixed string, borrowing from the buffer.
    pub fn get_string(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.get_u16()? as usize;
        self.take(len)
    }

    /// Consume everything left in the buffer.
    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut w = WireWriter::new();
        w.put_u8(0xab).put_u16(0x0102).put_u32(0x0304_0506).put_i32(-2);
        assert_eq!(
            w.as_bytes(),
            &[0xab, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xff, 0xff, 0xff, 0xfe]
        );

        let mut r = WireReader::new(w.as_bytes());
        assert_eq!(r.get_u8().unwrap(), 0xab);
        assert_eq!(r.get_u16().unwrap(), 0x0102);
        assert_eq!(r.get_u32().unwrap(), 0x0304_0506);
        assert_eq!(r.get_i32().unwrap(), -2);
        assert!(r.is_empty());
    }

    #[test]
    fn test_string_has_no_terminator() {
        let mut w = WireWriter::new();
        w.put_string(b"foo").unwrap();
        assert_eq!(w.as_bytes(), &[0, 3, b'f', b'o', b'o']);

        let mut r = WireReader::new(w.as_bytes());
        assert_eq!(r.get_string().unwrap(), b"foo");
        assert_eq!(r.position(), 5);
    }

    #[test]
    fn test_empty_string() {
        let mut w = WireWriter::new();
        w.put_string(b"").unwrap();
        assert_eq!(w.as_bytes(), &[0, 0]);
        assert_eq!(WireReader::new(w.as_bytes()).get_string().unwrap(), b"");
    }

    #[test]
    fn test_string_too_long() {
        let long = vec![b'x'; u16::MAX as usize + 1];
        let mut w = WireWriter::new();
        assert_eq!(
            w.put_string(&long).unwrap_err(),
            WireError::StringTooLong(u16::MAX as usize + 1)
        );
        assert!(w.is_empty());
    }

    #[test]
    fn test_truncated_reads() {
        let mut r = WireReader::new(&[0x00, 0x01]);
        assert_eq!(
            r.get_u32().unwrap_err(),
            WireError::Truncated {
                needed: 4,
                remaining: 2
            }
        );

        // Declared length longer than what follows.
        let mut r = WireReader::new(&[0x00, 0x05, b'a', b'b']);
        assert!(matches!(
            r.get_string(),
            Err(WireError::Truncated { needed: 5, remaining: 2 })
        ));
    }

    #[test]
    fn test_patch_u32() {
        let mut w = WireWriter::new();
        w.put_u32(0).put_u8(7);
        w.patch_u32(0, 1);
        assert_eq!(w.as_bytes(), &[0, 0, 0, 1, 7]);
    }
}

//! Forward-only reader over an immutable handshake buffer

use crate::error::HandshakeError;

/// Reads fixed and length-prefixed fields, advancing past each one.
///
/// Reading past the end never panics; it yields `HandshakeError::Malformed`
/// naming the field that was truncated.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consume `n` bytes and return them
    pub fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], HandshakeError> {
        if self.remaining() < n {
            return Err(HandshakeError::Malformed(format!(
                "truncated {}: need {} bytes at offset {}, {} left",
                field,
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume `n` bytes without looking at them
    pub fn skip(&mut self, n: usize, field: &'static str) -> Result<(), HandshakeError> {
        self.take(n, field).map(|_| ())
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, HandshakeError> {
        Ok(self.take(1, field)?[0])
    }

    pub fn read_u16_be(&mut self, field: &'static str) -> Result<u16, HandshakeError> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], HandshakeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    /// Everything not yet consumed; does not advance
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

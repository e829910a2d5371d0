use bytes::{Buf, BytesMut};

use atcmd_template::{FormatSink, TemplateError};

/// Fixed-capacity byte region shared by command formatting and response
/// accumulation.
///
/// Exactly one operation owns the contents at a time; every operation
/// clears it before use.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl ScratchBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one byte. Returns false, leaving the contents untouched, when
    /// the buffer is already full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.buf.extend_from_slice(&[byte]);
        true
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Keep only the last `len` bytes.
    pub(crate) fn retain_tail(&mut self, len: usize) {
        let start = self.buf.len().saturating_sub(len);
        self.buf.advance(start);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        self.buf.ends_with(suffix)
    }
}

impl FormatSink for ScratchBuffer {
    fn put(&mut self, bytes: &[u8]) -> atcmd_template::Result<()> {
        if bytes.len() > self.remaining() {
            return Err(TemplateError::Overflow {
                capacity: self.capacity,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use atcmd_template::{args, format_into};

    use super::*;

    #[test]
    fn push_stops_at_capacity() {
        let mut scratch = ScratchBuffer::with_capacity(3);
        assert!(scratch.push(b'a'));
        assert!(scratch.push(b'b'));
        assert!(scratch.push(b'c'));
        assert!(scratch.is_full());
        assert!(!scratch.push(b'd'));
        assert_eq!(scratch.as_slice(), b"abc");

        scratch.clear();
        assert!(scratch.is_empty());
        assert_eq!(scratch.remaining(), 3);
    }

    #[test]
    fn retain_tail_keeps_suffix() {
        let mut scratch = ScratchBuffer::with_capacity(4);
        for &b in b"ab\r" {
            scratch.push(b);
        }
        scratch.retain_tail(1);
        assert_eq!(scratch.as_slice(), b"\r");
        assert_eq!(scratch.remaining(), 3);

        scratch.retain_tail(0);
        assert!(scratch.is_empty());
    }

    #[test]
    fn formatting_fills_buffer() {
        let mut scratch = ScratchBuffer::with_capacity(16);
        let n = format_into("AT+CMD=%d", &args![5], &mut scratch).unwrap();
        assert_eq!(n, 8);
        assert_eq!(scratch.as_slice(), b"AT+CMD=5");
    }

    #[test]
    fn formatting_past_capacity_overflows() {
        let mut scratch = ScratchBuffer::with_capacity(4);
        let err = format_into("AT+CMD=%d", &args![5], &mut scratch).unwrap_err();
        assert_eq!(err, TemplateError::Overflow { capacity: 4 });
    }

    #[test]
    fn exact_fit_is_accepted() {
        let mut scratch = ScratchBuffer::with_capacity(4);
        format_into("AT%s", &args!["+X"], &mut scratch).unwrap();
        assert!(scratch.is_full());
        assert!(scratch.ends_with(b"+X"));
    }
}

use std::io::{self, Read};

// a small cursor over bytes for building and taking apart frames
pub struct BytesBuffer {
    /// buffer read position
    r_pos: usize,
    bytes: Vec<u8>,
}

impl BytesBuffer {
    pub fn new(capacity: usize) -> Self {
        BytesBuffer {
            r_pos: 0,
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Append exactly `count` bytes from `reader`.
    ///
    /// Fails with `UnexpectedEof` if the reader ends first.
    pub fn read_exact_from(&mut self, reader: &mut impl Read, count: usize) -> io::Result<()> {
        let start = self.bytes.len();
        self.bytes.resize(start + count, 0);
        if let Err(e) = reader.read_exact(&mut self.bytes[start..]) {
            self.bytes.truncate(start);
            return Err(e);
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.r_pos)?;
        self.r_pos += 1;
        Some(byte)
    }

    /// big-endian
    pub fn get_u16(&mut self) -> Option<u16> {
        let hi = self.get_u8()?;
        let lo = self.get_u8()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn get_slice(&mut self, length: usize) -> Option<&[u8]> {
        if self.remaining() < length {
            return None;
        }
        let old_pos = self.r_pos;
        self.r_pos += length;
        Some(&self.bytes[old_pos..self.r_pos])
    }

    pub fn put_u8(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u8_slice(&mut self, slice: &[u8]) {
        self.bytes.extend_from_slice(slice);
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.r_pos
    }

    pub fn position(&self) -> usize {
        self.r_pos
    }

    /// Move the read position back to an earlier `position()`.
    pub fn rewind(&mut self, position: usize) {
        self.r_pos = position.min(self.r_pos);
    }

    /// Drop everything already read so the buffer does not grow without bound.
    pub fn compact(&mut self) {
        self.bytes.drain(..self.r_pos);
        self.r_pos = 0;
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_is_big_endian() {
        let mut buf = BytesBuffer::new(4);
        buf.put_u16(0x0102);
        assert_eq!(buf.get_u8(), Some(0x01));
        assert_eq!(buf.get_u8(), Some(0x02));
        assert_eq!(buf.get_u8(), None);
    }

    #[test]
    fn short_reader_leaves_buffer_untouched() {
        let mut buf = BytesBuffer::new(8);
        buf.put_u8(7);
        let mut reader: &[u8] = &[1, 2];
        let err = buf.read_exact_from(&mut reader, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(buf.remaining(), 1);
    }

    #[test]
    fn rewind_then_compact_keeps_unread_bytes() {
        let mut buf = BytesBuffer::new(8);
        buf.put_u8_slice(b"abcd");
        let start = buf.position();
        assert_eq!(buf.get_u16(), Some(u16::from_be_bytes([b'a', b'b'])));
        buf.rewind(start);
        assert_eq!(buf.remaining(), 4);

        buf.get_u8();
        buf.compact();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.get_slice(3), Some(&b"bcd"[..]));
    }

    #[test]
    fn get_slice_refuses_past_end() {
        let mut buf = BytesBuffer::new(8);
        buf.put_u8_slice(b"abc");
        assert!(buf.get_slice(4).is_none());
        assert_eq!(buf.get_slice(3), Some(&b"abc"[..]));
        assert_eq!(buf.remaining(), 0);
    }
}

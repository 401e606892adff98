//! Forward-only little-endian readers and writers over a byte buffer.
use crate::errors::Error;

/// Sequential reader over an immutable byte region.
///
/// Every read advances the cursor by the consumed width and returns a
/// zero-copy view. Reading past the end of the region is reported as
/// `Error::CorruptPage`, since the only regions read this way are pages.
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a cursor positioned at the absolute offset `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        let bytes = self.read_bytes(std::mem::size_of::<u16>())?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        let bytes = self.read_bytes(std::mem::size_of::<u64>())?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                err!(
                    CorruptPage,
                    "Read of {} bytes at offset {} exceeds buffer size {}",
                    len,
                    self.pos,
                    self.data.len()
                )
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }
}

/// Sequential writer over a mutable byte region.
///
/// Writes overwrite the bytes at the cursor and advance it. `seek` jumps to an
/// absolute offset so fields such as header counters and offset-table slots can
/// be patched once later data is known.
#[derive(Debug)]
pub struct WriteCursor<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn seek(&mut self, pos: usize) -> &mut Self {
        self.pos = pos;
        self
    }

    pub fn write_u16(&mut self, value: u16) -> Result<&mut Self, Error> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<&mut Self, Error> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, Error> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                err!(
                    Overflow,
                    "Write of {} bytes at offset {} exceeds buffer size {}",
                    bytes.len(),
                    self.pos,
                    self.data.len()
                )
            })?;
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(self)
    }

    /// Returns the bytes written so far, up to the current position.
    pub fn written(&self) -> &[u8] {
        &self.data[..self.pos.min(self.data.len())]
    }

    pub fn into_inner(self) -> &'a mut [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_little_endian() {
        let data = [0x34, 0x12, 1, 0, 0, 0, 0, 0, 0, 0x80, b'h', b'i'];
        let mut c = ReadCursor::new(&data);
        assert_eq!(c.read_u16().unwrap(), 0x1234);
        assert_eq!(c.read_u64().unwrap(), 0x8000_0000_0000_0001);
        assert_eq!(c.read_bytes(2).unwrap(), b"hi");
        assert_eq!(c.position(), data.len());
    }

    #[test]
    fn test_read_past_end_is_corrupt() {
        let data = [1u8, 2, 3];
        let mut c = ReadCursor::at(&data, 2);
        let err = c.read_u16().unwrap_err();
        assert_eq!(err.code(), 2000);
        // A failed read does not move the cursor.
        assert_eq!(c.position(), 2);
        assert_eq!(c.read_bytes(1).unwrap(), &[3]);
    }

    #[test]
    fn test_write_and_patch() {
        let mut buf = [0u8; 8];
        let mut w = WriteCursor::new(&mut buf);
        w.seek(4).write_u16(0xBEEF).unwrap();
        w.seek(0).write_u16(7).unwrap().write_u16(9).unwrap();
        assert_eq!(w.position(), 4);
        assert_eq!(buf, [7, 0, 9, 0, 0xEF, 0xBE, 0, 0]);
    }

    #[test]
    fn test_write_overflow() {
        let mut buf = [0u8; 4];
        let mut w = WriteCursor::new(&mut buf);
        assert!(w.write_u64(1).is_err());
        assert_eq!(w.position(), 0);
        w.write_bytes(b"abcd").unwrap();
        assert_eq!(w.written(), b"abcd");
        assert_eq!(w.write_bytes(b"e").unwrap_err().code(), 6000);
    }
}

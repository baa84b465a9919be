//! A position marker with little-endian primitive readers.

use bytes::Buf;

use crate::parse::{ByteAccumulator, ParseError};

/// An absolute position into an accumulator window, plus a checkpoint mark
/// for slicing out everything consumed since.
///
/// All primitive reads decode little-endian (the Hi-C wire format) and
/// advance the cursor atomically: a read either consumes its full width or
/// fails with [`ParseError::UnexpectedEof`] and leaves the position alone,
/// so malformed or truncated input surfaces as an error rather than a
/// panic.
#[derive(Copy, Clone, Debug)]
pub struct Cursor {
    pos: u64,
    mark: u64,
}

impl Cursor {
    pub fn at(pos: u64) -> Cursor {
        Cursor { pos, mark: pos }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn advance(&mut self, n: u64) {
        self.pos += n;
    }

    /// Remembers the current position as the new checkpoint.
    pub fn checkpoint(&mut self) {
        self.mark = self.pos;
    }

    /// The position of the last checkpoint.
    pub fn mark(&self) -> u64 {
        self.mark
    }

    /// The bytes consumed since the last checkpoint.
    pub fn slice<'a>(&self, acc: &'a ByteAccumulator) -> &'a [u8] {
        acc.range(self.mark, self.pos)
    }

    /// Consumes exactly `n` bytes, or fails without consuming anything.
    pub fn take<'a>(
        &mut self,
        acc: &'a ByteAccumulator,
        n: usize,
    ) -> Result<&'a [u8], ParseError> {
        if acc.available_from(self.pos) < n {
            return Err(ParseError::UnexpectedEof);
        }
        let bytes = acc.range(self.pos, self.pos + n as u64);
        self.pos += n as u64;
        Ok(bytes)
    }

    pub fn read_u8(&mut self, acc: &ByteAccumulator) -> Result<u8, ParseError> {
        Ok(self.take(acc, 1)?[0])
    }

    pub fn read_i16(&mut self, acc: &ByteAccumulator) -> Result<i16, ParseError> {
        Ok(self.take(acc, 2)?.get_i16_le())
    }

    pub fn read_i32(&mut self, acc: &ByteAccumulator) -> Result<i32, ParseError> {
        Ok(self.take(acc, 4)?.get_i32_le())
    }

    pub fn read_i64(&mut self, acc: &ByteAccumulator) -> Result<i64, ParseError> {
        Ok(self.take(acc, 8)?.get_i64_le())
    }

    pub fn read_f32(&mut self, acc: &ByteAccumulator) -> Result<f32, ParseError> {
        Ok(self.take(acc, 4)?.get_f32_le())
    }

    pub fn read_f64(&mut self, acc: &ByteAccumulator) -> Result<f64, ParseError> {
        Ok(self.take(acc, 8)?.get_f64_le())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_reads_advance() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0102_0304_i32.to_le_bytes());
        data.extend_from_slice(&(-9_i16).to_le_bytes());
        data.extend_from_slice(&2.5_f32.to_le_bytes());
        data.extend_from_slice(&1.25_f64.to_le_bytes());
        data.extend_from_slice(&0x0A0B_0C0D_0E0F_1011_i64.to_le_bytes());
        let acc = ByteAccumulator::with_data(data);

        let mut cur = Cursor::at(0);
        assert_eq!(cur.read_i32(&acc).unwrap(), 0x0102_0304);
        assert_eq!(cur.read_i16(&acc).unwrap(), -9);
        assert_eq!(cur.read_f32(&acc).unwrap(), 2.5);
        assert_eq!(cur.read_f64(&acc).unwrap(), 1.25);
        assert_eq!(cur.read_i64(&acc).unwrap(), 0x0A0B_0C0D_0E0F_1011);
        assert_eq!(cur.pos(), 26);
    }

    #[test]
    fn short_window_is_an_error_not_a_panic() {
        let acc = ByteAccumulator::with_data(vec![1, 2]);
        let mut cur = Cursor::at(0);
        assert!(matches!(
            cur.read_i32(&acc),
            Err(ParseError::UnexpectedEof)
        ));
        // Failed read must not move the cursor.
        assert_eq!(cur.pos(), 0);
        assert_eq!(cur.read_i16(&acc).unwrap(), 0x0201);
    }

    #[test]
    fn checkpoint_slices() {
        let acc = ByteAccumulator::with_data(b"abcdef".to_vec());
        let mut cur = Cursor::at(0);
        cur.advance(2);
        cur.checkpoint();
        cur.advance(3);
        assert_eq!(cur.slice(&acc), b"cde");
    }
}

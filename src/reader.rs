use crate::error::TlsError;

/// Bounds-checked parsing cursor over a handshake message body.
///
/// All handshake processors parse through this cursor so that every length
/// check lives in one place. Reads that would pass the end of the buffer
/// return `TlsError::BufferUnderflow`; nothing here panics or reads out of
/// bounds.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, TlsError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, TlsError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32, TlsError> {
        let bytes = self.read_bytes(3)?;
        Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Take `n` bytes, advancing the cursor.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], TlsError> {
        if n > self.remaining() {
            return Err(TlsError::BufferUnderflow);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a field with a 1-byte length prefix.
    pub fn read_vec8(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.read_u8()? as usize;
        self.read_bytes(len)
    }

    /// Read a field with a 2-byte length prefix.
    pub fn read_vec16(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), TlsError> {
        self.read_bytes(n).map(|_| ())
    }

    /// Consume everything left in the buffer.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }
}

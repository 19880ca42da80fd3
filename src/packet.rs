//! Chained record buffers.
//!
//! An outgoing record may span several non-contiguous buffers (a header
//! packet plus payload packets handed over by the application). Each
//! [`Packet`] keeps reserved space in front of its data for headers and an
//! explicit IV, and spare capacity behind it for padding and tags. Growth
//! beyond a packet's capacity goes through a [`PacketPool`], never through
//! reallocation of existing packets, so data already encrypted in place is
//! never moved.

use crate::error::TlsError;

/// One buffer segment of a record.
pub struct Packet {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl Packet {
    /// Allocate a packet with `prefix` bytes reserved before the data area
    /// and room for `payload + trailing` bytes after it.
    pub fn with_capacity(prefix: usize, payload: usize, trailing: usize) -> Self {
        Packet {
            buf: vec![0u8; prefix + payload + trailing],
            start: prefix,
            end: prefix,
        }
    }

    /// Packet holding a copy of `data`, with the given spare capacities.
    pub fn from_data(data: &[u8], prefix: usize, trailing: usize) -> Self {
        let mut p = Packet::with_capacity(prefix, data.len(), trailing);
        p.buf[prefix..prefix + data.len()].copy_from_slice(data);
        p.end = prefix + data.len();
        p
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.start..self.end]
    }

    /// Unused space in front of the data.
    pub fn prefix_available(&self) -> usize {
        self.start
    }

    /// Unused space behind the data.
    pub fn trailing_available(&self) -> usize {
        self.buf.len() - self.end
    }

    /// Place `data` immediately before the current data area.
    pub fn prepend(&mut self, data: &[u8]) -> Result<(), TlsError> {
        if data.len() > self.start {
            return Err(TlsError::BufferTooSmall {
                needed: data.len(),
                available: self.start,
            });
        }
        self.start -= data.len();
        self.buf[self.start..self.start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Place `data` after the current data area, within this packet's own
    /// capacity.
    pub fn append(&mut self, data: &[u8]) -> Result<(), TlsError> {
        if data.len() > self.trailing_available() {
            return Err(TlsError::BufferTooSmall {
                needed: data.len(),
                available: self.trailing_available(),
            });
        }
        self.buf[self.end..self.end + data.len()].copy_from_slice(data);
        self.end += data.len();
        Ok(())
    }
}

/// Allocator collaborating with chain growth. Supplied by the caller so the
/// chain never allocates behind the transport's back.
pub trait PacketPool {
    /// Allocate a packet with at least `payload` bytes of data capacity.
    fn allocate(&mut self, payload: usize) -> Result<Packet, TlsError>;
}

/// Heap-backed pool for hosts without buffer constraints.
pub struct HeapPool;

impl PacketPool for HeapPool {
    fn allocate(&mut self, payload: usize) -> Result<Packet, TlsError> {
        Ok(Packet::with_capacity(0, payload, 0))
    }
}

/// An ordered sequence of packets holding one record's plaintext or
/// ciphertext.
pub struct PacketChain {
    pub packets: Vec<Packet>,
}

impl PacketChain {
    pub fn new() -> Self {
        PacketChain { packets: Vec::new() }
    }

    pub fn single(packet: Packet) -> Self {
        PacketChain {
            packets: vec![packet],
        }
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// Total data length across all packets.
    pub fn len(&self) -> usize {
        self.packets.iter().map(Packet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `data` at the end of the chain: fill the last packet's spare
    /// capacity first, then allocate from the pool for the remainder.
    pub fn append_data(
        &mut self,
        data: &[u8],
        pool: &mut dyn PacketPool,
    ) -> Result<(), TlsError> {
        let mut rest = data;
        if let Some(last) = self.packets.last_mut() {
            let room = last.trailing_available().min(rest.len());
            if room > 0 {
                last.append(&rest[..room])?;
                rest = &rest[room..];
            }
        }
        if !rest.is_empty() {
            let mut extra = pool.allocate(rest.len())?;
            extra.append(rest)?;
            self.packets.push(extra);
        }
        Ok(())
    }

    /// Flatten the chain into one contiguous buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for p in &self.packets {
            out.extend_from_slice(p.data());
        }
        out
    }
}

impl Default for PacketChain {
    fn default() -> Self {
        PacketChain::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_uses_reserved_prefix() {
        let mut p = Packet::from_data(b"payload", 5, 0);
        p.prepend(&[1, 2, 3]).unwrap();
        assert_eq!(p.data(), &[1, 2, 3, b'p', b'a', b'y', b'l', b'o', b'a', b'd']);
        assert_eq!(p.prefix_available(), 2);
    }

    #[test]
    fn prepend_past_reserved_space_fails() {
        let mut p = Packet::from_data(b"x", 2, 0);
        let err = p.prepend(&[0; 3]).unwrap_err();
        assert_eq!(
            err,
            TlsError::BufferTooSmall {
                needed: 3,
                available: 2
            }
        );
        // Failed prepend leaves the packet untouched.
        assert_eq!(p.data(), b"x");
    }

    #[test]
    fn append_within_capacity_then_overflow() {
        let mut p = Packet::from_data(b"ab", 0, 2);
        p.append(b"cd").unwrap();
        assert_eq!(p.data(), b"abcd");
        assert!(p.append(b"e").is_err());
    }

    #[test]
    fn chain_append_spills_into_pool_packet() {
        let mut chain = PacketChain::single(Packet::from_data(b"head", 0, 2));
        let mut pool = HeapPool;
        chain.append_data(b"tail", &mut pool).unwrap();
        assert_eq!(chain.packets.len(), 2);
        assert_eq!(chain.packets[0].data(), b"headta");
        assert_eq!(chain.packets[1].data(), b"il");
        assert_eq!(chain.to_vec(), b"headtail");
    }

    #[test]
    fn chain_length_spans_packets() {
        let mut chain = PacketChain::new();
        chain.push(Packet::from_data(b"abc", 0, 0));
        chain.push(Packet::from_data(b"defgh", 0, 0));
        assert_eq!(chain.len(), 8);
        assert_eq!(chain.to_vec(), b"abcdefgh");
    }
}

//! Node-private 64 KiB memory.
//!
//! Every address wraps modulo 65536, so no access can fail.

/// Size of a node's memory region.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Byte-addressable memory owned by one kernel.
pub struct Memory {
    bytes: Box<[u8]>,
}

impl Memory {
    /// Zero-filled memory.
    pub fn new() -> Self {
        Self {
            bytes: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    fn wrap(addr: usize) -> usize {
        addr & (MEMORY_SIZE - 1)
    }

    /// Read one byte.
    pub fn peek(&self, addr: usize) -> u8 {
        self.bytes[Self::wrap(addr)]
    }

    /// Write one byte.
    pub fn poke(&mut self, addr: usize, value: u8) {
        self.bytes[Self::wrap(addr)] = value;
    }

    /// Read a little-endian 16-bit word.
    pub fn peek_word(&self, addr: usize) -> u16 {
        let lo = self.peek(addr);
        let hi = self.peek(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Write a little-endian 16-bit word.
    pub fn poke_word(&mut self, addr: usize, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.poke(addr, lo);
        self.poke(addr.wrapping_add(1), hi);
    }

    /// Copy `len` bytes starting at `addr`, wrapping at the top of memory.
    pub fn read_block(&self, addr: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.peek(addr.wrapping_add(i))).collect()
    }

    /// Write `data` starting at `addr`, wrapping at the top of memory.
    pub fn write_block(&mut self, addr: usize, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.poke(addr.wrapping_add(i), *byte);
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

//! Byte-addressable data memory.
//!
//! A flat, zero-initialised array of bytes. Multi-byte accesses are
//! little-endian and may be unaligned. Every access is bounds-checked;
//! there is no wraparound.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Default memory capacity in bytes.
pub const DEFAULT_MEMORY_SIZE: usize = 4096;

/// Simulated data memory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Create a memory of [`DEFAULT_MEMORY_SIZE`] zeroed bytes.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_SIZE)
    }

    /// Create a memory of `size` zeroed bytes.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Capacity in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the memory has zero capacity.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Validate an access of `width` bytes at `addr` and return its range.
    fn range(&self, addr: u32, width: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = addr as usize;
        match start.checked_add(width) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(MemoryError::OutOfBounds {
                addr,
                width,
                capacity: self.bytes.len(),
            }),
        }
    }

    /// Read one byte.
    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryError> {
        let r = self.range(addr, 1)?;
        Ok(self.bytes[r.start])
    }

    /// Read a little-endian halfword.
    pub fn read_u16(&self, addr: u32) -> Result<u16, MemoryError> {
        let r = self.range(addr, 2)?;
        let b = &self.bytes[r];
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian word.
    pub fn read_u32(&self, addr: u32) -> Result<u32, MemoryError> {
        let r = self.range(addr, 4)?;
        let b = &self.bytes[r];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Write one byte.
    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        let r = self.range(addr, 1)?;
        self.bytes[r.start] = value;
        Ok(())
    }

    /// Write a little-endian halfword.
    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemoryError> {
        let r = self.range(addr, 2)?;
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Write a little-endian word.
    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        let r = self.range(addr, 4)?;
        self.bytes[r].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Dump memory contents as `(address, word)` pairs (for debugging).
    ///
    /// `start` is rounded down to a word boundary; partial trailing words
    /// are skipped.
    pub fn dump_words(&self, start: usize, count: usize) -> Vec<(usize, u32)> {
        let start = start & !3;
        (0..count)
            .map(|i| start + i * 4)
            .take_while(|addr| addr + 4 <= self.bytes.len())
            .map(|addr| {
                let b = &self.bytes[addr..addr + 4];
                (addr, u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            })
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.bytes.iter().filter(|b| **b != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_bytes", &non_zero)
            .field("capacity", &self.bytes.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The access touches bytes outside the allocated region.
    #[error("{width}-byte access at {addr:#010x} is outside memory (capacity {capacity} bytes)")]
    OutOfBounds { addr: u32, width: usize, capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_read_write() {
        let mut mem = Memory::new();
        mem.write_u32(8, 0x0102_0304).unwrap();
        assert_eq!(mem.read_u32(8).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut mem = Memory::new();
        mem.write_u32(0, 0x0102_0304).unwrap();
        assert_eq!(&mem.as_bytes()[..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(mem.read_u16(0).unwrap(), 0x0304);
        assert_eq!(mem.read_u16(2).unwrap(), 0x0102);
        assert_eq!(mem.read_u8(3).unwrap(), 0x01);
    }

    #[test]
    fn test_unaligned_access() {
        let mut mem = Memory::new();
        mem.write_u32(1, 0xdead_beef).unwrap();
        assert_eq!(mem.read_u32(1).unwrap(), 0xdead_beef);
        assert_eq!(mem.read_u8(0).unwrap(), 0);
    }

    #[test]
    fn test_memory_bounds() {
        let mem = Memory::with_capacity(16);

        assert!(mem.read_u32(12).is_ok());
        assert!(mem.read_u8(15).is_ok());

        assert_eq!(
            mem.read_u32(13),
            Err(MemoryError::OutOfBounds { addr: 13, width: 4, capacity: 16 })
        );
        assert!(mem.read_u8(16).is_err());
        assert!(mem.read_u16(u32::MAX).is_err());
    }

    #[test]
    fn test_failed_write_leaves_memory_untouched() {
        let mut mem = Memory::with_capacity(8);
        assert!(mem.write_u32(6, u32::MAX).is_err());
        assert!(mem.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_dump_words() {
        let mut mem = Memory::with_capacity(12);
        mem.write_u32(4, 42).unwrap();
        let dump = mem.dump_words(5, 10);
        assert_eq!(dump, vec![(4, 42), (8, 0)]);
    }
}

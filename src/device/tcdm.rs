//! Tightly-coupled data memory model.
//!
//! The TCDM is a flat byte-addressable FP32 working buffer, externally
//! owned for the duration of a job. The accelerator only ever issues
//! naturally-aligned 32-bit accesses through the AGU cursors; the model
//! enforces that and turns out-of-buffer or misaligned accesses into typed
//! errors instead of undefined behavior.
//!
//! # Usage
//!
//! ```
//! use nst_emu::device::Tcdm;
//!
//! let mut tcdm = Tcdm::new(4096);
//! tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
//! assert_eq!(tcdm.read_f32(8).unwrap(), 3.0);
//! ```

use thiserror::Error;

/// Error type for TCDM accesses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TcdmError {
    /// Word access past the end of the buffer.
    #[error("address 0x{addr:08X} outside the {len}-byte TCDM")]
    OutOfBounds {
        /// Offending byte address.
        addr: u32,
        /// Buffer length in bytes.
        len: usize,
    },

    /// Word access that is not 4-byte aligned.
    #[error("address 0x{addr:08X} is not 32-bit aligned")]
    Misaligned {
        /// Offending byte address.
        addr: u32,
    },
}

/// Flat little-endian working memory.
pub struct Tcdm {
    bytes: Vec<u8>,
}

impl Tcdm {
    /// Create a zero-filled TCDM of `len` bytes (rounded down to whole words).
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len & !3],
        }
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the buffer holds no words.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte address of the last valid word, usable as an inclusive range
    /// check bound.
    pub fn last_word_addr(&self) -> u32 {
        (self.bytes.len().saturating_sub(4)) as u32
    }

    /// Fill the whole buffer with a byte pattern (test poisoning).
    pub fn fill(&mut self, byte: u8) {
        self.bytes.fill(byte);
    }

    #[inline]
    fn check(&self, addr: u32) -> Result<usize, TcdmError> {
        if addr & 3 != 0 {
            return Err(TcdmError::Misaligned { addr });
        }
        let at = addr as usize;
        if at + 4 > self.bytes.len() {
            return Err(TcdmError::OutOfBounds {
                addr,
                len: self.bytes.len(),
            });
        }
        Ok(at)
    }

    /// Aligned 32-bit read.
    pub fn read_word(&self, addr: u32) -> Result<u32, TcdmError> {
        let at = self.check(addr)?;
        Ok(u32::from_le_bytes([
            self.bytes[at],
            self.bytes[at + 1],
            self.bytes[at + 2],
            self.bytes[at + 3],
        ]))
    }

    /// Aligned 32-bit write.
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<(), TcdmError> {
        let at = self.check(addr)?;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Read a word and view it as a real (test and demo convenience).
    pub fn read_f32(&self, addr: u32) -> Result<f32, TcdmError> {
        Ok(f32::from_bits(self.read_word(addr)?))
    }

    /// Write a slice of reals as consecutive words starting at `addr`.
    pub fn write_f32_slice(&mut self, addr: u32, values: &[f32]) -> Result<(), TcdmError> {
        for (i, v) in values.iter().enumerate() {
            self.write_word(addr + (i as u32) * 4, v.to_bits())?;
        }
        Ok(())
    }

    /// Read `count` consecutive words starting at `addr`.
    pub fn read_words(&self, addr: u32, count: usize) -> Result<Vec<u32>, TcdmError> {
        (0..count)
            .map(|i| self.read_word(addr + (i as u32) * 4))
            .collect()
    }

    /// Iterate over all (address, word) pairs, for memory dumps.
    pub fn words(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.bytes.len() / 4).map(|k| {
            let at = k * 4;
            let word = u32::from_le_bytes([
                self.bytes[at],
                self.bytes[at + 1],
                self.bytes[at + 2],
                self.bytes[at + 3],
            ]);
            (at as u32, word)
        })
    }
}

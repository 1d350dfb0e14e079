//! Read-only view over raw register octets.
//!
//! Modbus registers are 16 bits wide, but most SunSpec values are not: strings
//! span many registers and some counters span two. [`Registers`] therefore keeps
//! the raw big-endian octets and hands out byte slices addressed by absolute
//! register number and octet count. Decoders build their values from there.
//!
//! ```
//! use sunspec_lib::registers::Registers;
//!
//! let regs = Registers::new(40000, b"\x12\x34\x56\x78").unwrap();
//! assert_eq!(regs.read(40000, 2).unwrap(), b"\x12\x34");
//! assert_eq!(regs.word(40001).unwrap(), 0x5678);
//! ```
use crate::error::{Error, Result};
use std::ops::{Bound, RangeBounds};

/// Consecutive 16-bit registers starting at register `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers<'a> {
    base: u32,
    octets: &'a [u8],
}

impl<'a> Registers<'a> {
    /// Wraps `octets` as the registers `base`, `base + 1`, ...
    ///
    /// # Errors
    ///
    /// [`Error::OddByteCount`] if `octets` does not hold whole registers.
    pub fn new(base: u32, octets: &'a [u8]) -> Result<Self> {
        if octets.len() % 2 != 0 {
            return Err(Error::OddByteCount(octets.len()));
        }
        Ok(Self { base, octets })
    }

    /// Moves the window to another base register without touching the data.
    pub fn with_base(self, base: u32) -> Self {
        Self { base, ..self }
    }

    /// First register covered.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// One past the last register covered, saturating at `u32::MAX`.
    pub fn end(&self) -> u32 {
        u32::try_from(self.len())
            .ok()
            .and_then(|len| self.base.checked_add(len))
            .unwrap_or(u32::MAX)
    }

    /// Number of registers covered.
    pub fn len(&self) -> usize {
        self.octets.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    /// The raw octets of all registers.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.octets
    }

    /// Returns `octets` raw octets starting at the absolute register `offset`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] if the range is not fully covered by this buffer.
    pub fn read(&self, offset: u32, octets: u32) -> Result<&'a [u8]> {
        let out_of_range = || Error::OutOfRange {
            offset,
            octets,
            base: self.base,
            end: self.end(),
        };
        let start = offset
            .checked_sub(self.base)
            .map(|relative| relative as usize * 2)
            .ok_or_else(out_of_range)?;
        let stop = start
            .checked_add(octets as usize)
            .filter(|stop| *stop <= self.octets.len())
            .ok_or_else(out_of_range)?;
        Ok(&self.octets[start..stop])
    }

    /// The unsigned 16-bit value of the absolute register `offset`.
    pub fn word(&self, offset: u32) -> Result<u16> {
        let octets = self.read(offset, 2)?;
        Ok(u16::from_be_bytes([octets[0], octets[1]]))
    }

    /// The unsigned 16-bit values of a range of absolute registers.
    ///
    /// Open bounds default to the start and end of the buffer, so `words(..)`
    /// returns every register.
    pub fn words<R: RangeBounds<u32>>(&self, range: R) -> Result<Vec<u16>> {
        self.words_step_by(range, 1)
    }

    /// Like [`Registers::words`] with an explicit step.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] for any step other than 1.
    pub fn words_step_by<R: RangeBounds<u32>>(&self, range: R, step: usize) -> Result<Vec<u16>> {
        if step != 1 {
            return Err(Error::Unsupported(step));
        }
        let out_of_range = |offset: u32| Error::OutOfRange {
            offset,
            octets: 0,
            base: self.base,
            end: self.end(),
        };
        let start = match range.start_bound() {
            Bound::Included(start) => *start,
            Bound::Excluded(start) => start.checked_add(1).ok_or_else(|| out_of_range(*start))?,
            Bound::Unbounded => self.base,
        };
        let stop = match range.end_bound() {
            Bound::Included(stop) => stop.checked_add(1).ok_or_else(|| out_of_range(*stop))?,
            Bound::Excluded(stop) => *stop,
            Bound::Unbounded => self.end(),
        };
        let count = stop.checked_sub(start).ok_or_else(|| out_of_range(start))?;
        let octets = self.read(start, count.saturating_mul(2))?;
        Ok(octets
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
}

//! Bounded cursor over one allocated region
//!
//! Every field write or read claims its bytes through `claim`, so an offset
//! bug shows up as `LayoutOverrun` instead of scribbling over a neighbour.

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    base: u32,
    offset: u32,
    capacity: u32,
}

impl Cursor {
    #[inline]
    pub const fn new(base: u32, capacity: u32) -> Self {
        Self {
            base,
            offset: 0,
            capacity,
        }
    }

    #[inline]
    pub const fn base(&self) -> u32 {
        self.base
    }

    #[inline]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub const fn remaining(&self) -> u32 {
        self.capacity - self.offset
    }

    /// Reserve `len` bytes at the current position and return their address
    pub fn claim(&mut self, len: u32) -> Result<u32> {
        if len > self.remaining() {
            return Err(BridgeError::LayoutOverrun {
                base: self.base,
                offset: self.offset,
                len,
                capacity: self.capacity,
            });
        }
        let address = self.base + self.offset;
        self.offset += len;
        Ok(address)
    }

    /// Carve a sub-cursor for an embedded struct of `len` bytes
    pub fn split(&mut self, len: u32) -> Result<Cursor> {
        let base = self.claim(len)?;
        Ok(Cursor::new(base, len))
    }

    /// True once every byte of the region has been claimed
    #[inline]
    pub const fn is_exhausted(&self) -> bool {
        self.offset == self.capacity
    }
}

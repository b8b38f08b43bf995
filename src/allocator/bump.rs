//! Bump pointer allocation over a linear address range
//!
//! Design: the fast path of `Heap`. Hands out addresses, never bytes; the
//! owning module keeps the memory itself.

/// Bump allocator state
#[derive(Debug, Clone, Copy)]
pub struct Bump {
    current: u32,
    end: u32,
}

impl Bump {
    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            current: start,
            end,
        }
    }

    /// Returns None once the range is exhausted (caller grows it).
    #[inline]
    pub fn try_alloc(&mut self, size: u32, align: u32) -> Option<u32> {
        debug_assert!(align.is_power_of_two(), "alignment must be power of 2");

        let address = align_up(self.current, align)?;
        let next = address.checked_add(size)?;

        if next <= self.end {
            self.current = next;
            Some(address)
        } else {
            None
        }
    }

    /// Move the end of the range after memory grew
    #[inline]
    pub fn extend(&mut self, end: u32) {
        debug_assert!(end >= self.end, "bump range cannot shrink");
        self.end = end;
    }

    /// Give back the tail `[address, current)`
    #[inline]
    pub fn retreat(&mut self, address: u32) {
        debug_assert!(address <= self.current);
        self.current = address;
    }

    #[inline]
    pub const fn current(&self) -> u32 {
        self.current
    }

    #[inline]
    pub const fn remaining(&self) -> u32 {
        self.end.saturating_sub(self.current)
    }
}

/// Align upward to the next multiple of `align`
#[inline]
pub(crate) const fn align_up(addr: u32, align: u32) -> Option<u32> {
    let mask = align - 1;
    match addr.checked_add(mask) {
        Some(v) => Some(v & !mask),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), Some(0));
        assert_eq!(align_up(1, 8), Some(8));
        assert_eq!(align_up(8, 8), Some(8));
        assert_eq!(align_up(9, 8), Some(16));
        assert_eq!(align_up(u32::MAX, 8), None);
    }
}

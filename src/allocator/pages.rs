//! Page accounting for a growable linear memory
//!
//! Design: memory grows in 64 KiB pages, in steps that double up to a cap so
//! a burst of allocations does not grow one page at a time.

/// Size of one linear memory page
pub const PAGE_SIZE: u32 = 64 * 1024;

/// Largest page count whose byte size still fits a 32-bit address
pub const MAX_PAGES: u32 = u32::MAX / PAGE_SIZE;

const MAX_GROWTH_STEP: u32 = 16;

#[derive(Debug, Clone)]
pub struct PagePool {
    pages: u32,
    max_pages: u32,
    step: u32,
}

impl PagePool {
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        let max_pages = max_pages.clamp(1, MAX_PAGES);
        Self {
            pages: initial_pages.clamp(1, max_pages),
            max_pages,
            step: 1,
        }
    }

    /// Grow so that at least `min_bytes` more are available
    ///
    /// Returns the new memory size, or None when the page limit forbids it.
    pub fn grow_with_min(&mut self, min_bytes: u32) -> Option<u32> {
        let needed = min_bytes.div_ceil(PAGE_SIZE).max(1);
        let available = self.max_pages - self.pages;
        if needed > available {
            return None;
        }

        let grow = needed.max(self.step).min(available);
        self.pages += grow;
        self.step = (self.step * 2).min(MAX_GROWTH_STEP);

        tracing::trace!(target: "allocator", pages = self.pages, "memory grown");
        Some(self.size_bytes())
    }

    #[inline]
    pub fn pages(&self) -> u32 {
        self.pages
    }

    #[inline]
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    #[inline]
    pub fn size_bytes(&self) -> u32 {
        self.pages * PAGE_SIZE
    }
}

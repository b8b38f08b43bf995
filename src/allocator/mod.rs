//! Module-side heap over a linear address range
//!
//! Design: two-layer allocation, the same shape a wasm module's own malloc has:
//! 1. First-fit reuse of released blocks (coalesced on release)
//! 2. Bump allocation at the top, growing memory page-wise when exhausted
//!
//! Addresses below `HEAP_BASE` are never handed out, so 0 stays the null
//! pointer and the failure value of `allocate`.

mod bump;
mod pages;


pub use bump::Bump;
pub use pages::{PagePool, MAX_PAGES, PAGE_SIZE};

use crate::error::{BridgeError, Result};
use std::collections::BTreeMap;

/// First address the heap may return
pub const HEAP_BASE: u32 = 1024;

/// Block granularity and alignment
pub const ALIGN: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    address: u32,
    size: u32,
}

impl Block {
    #[inline]
    fn end(&self) -> u32 {
        self.address + self.size
    }
}

pub struct Heap {
    bump: Bump,
    pages: PagePool,
    /// Released blocks, sorted by address, never adjacent
    free: Vec<Block>,
    live: BTreeMap<u32, u32>,
}

impl Heap {
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        let pages = PagePool::new(initial_pages, max_pages);
        Self {
            bump: Bump::new(HEAP_BASE, pages.size_bytes()),
            pages,
            free: Vec::new(),
            live: BTreeMap::new(),
        }
    }

    /// Allocate `size` bytes; None when the page limit is reached
    pub fn alloc(&mut self, size: u32) -> Option<u32> {
        let size = bump::align_up(size.max(1), ALIGN)?;

        let block = match self.take_free(size) {
            Some(block) => block,
            None => Block {
                address: self.alloc_slow(size)?,
                size,
            },
        };
        self.live.insert(block.address, block.size);
        Some(block.address)
    }

    fn alloc_slow(&mut self, size: u32) -> Option<u32> {
        if let Some(address) = self.bump.try_alloc(size, ALIGN) {
            return Some(address);
        }

        let shortfall = size - self.bump.remaining().min(size);
        let end = self.pages.grow_with_min(shortfall + ALIGN)?;
        self.bump.extend(end);
        self.bump.try_alloc(size, ALIGN)
    }

    /// First-fit search; splits the block when the remainder is usable
    fn take_free(&mut self, size: u32) -> Option<Block> {
        let index = self.free.iter().position(|block| block.size >= size)?;
        let block = self.free[index];

        if block.size - size >= ALIGN {
            self.free[index] = Block {
                address: block.address + size,
                size: block.size - size,
            };
            Some(Block {
                address: block.address,
                size,
            })
        } else {
            // slack stays with the block so release returns all of it
            self.free.remove(index);
            Some(block)
        }
    }

    /// Release the block at `address`, returning its size
    pub fn free(&mut self, address: u32) -> Result<u32> {
        let size = self
            .live
            .remove(&address)
            .ok_or(BridgeError::InvalidRelease { address })?;
        self.insert_free(Block { address, size });
        Ok(size)
    }

    fn insert_free(&mut self, mut block: Block) {
        let index = self.free.partition_point(|b| b.address < block.address);

        // merge with the following block
        if let Some(next) = self.free.get(index).copied() {
            if block.end() == next.address {
                block.size += next.size;
                self.free.remove(index);
            }
        }
        // merge with the preceding block
        if index > 0 {
            let prev = self.free[index - 1];
            if prev.end() == block.address {
                block = Block {
                    address: prev.address,
                    size: prev.size + block.size,
                };
                self.free.remove(index - 1);
                return self.place(index - 1, block);
            }
        }
        self.place(index, block);
    }

    fn place(&mut self, index: usize, block: Block) {
        // a free block touching the bump pointer goes back to the bump region
        if block.end() == self.bump.current() {
            self.bump.retreat(block.address);
        } else {
            self.free.insert(index, block);
        }
    }

    /// Size of the live block at `address`
    pub fn block_size(&self, address: u32) -> Option<u32> {
        self.live.get(&address).copied()
    }

    pub fn is_live(&self, address: u32) -> bool {
        self.live.contains_key(&address)
    }

    /// Current memory size implied by the page count
    #[inline]
    pub fn memory_size(&self) -> u32 {
        self.pages.size_bytes()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_blocks: self.live.len(),
            live_bytes: self.live.values().map(|&size| u64::from(size)).sum(),
            free_bytes: self.free.iter().map(|b| u64::from(b.size)).sum::<u64>()
                + u64::from(self.bump.remaining()),
            pages: self.pages.pages(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(1, 16)
    }
}

/// Heap statistics for monitoring and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub live_blocks: usize,
    pub live_bytes: u64,
    pub free_bytes: u64,
    pub pages: u32,
}

//! The native module contract
//!
//! Anything that owns a linear memory, an allocator pair and callable exports
//! can sit behind the bridge: a wasmi instance, the in-process `HostModule`,
//! or a test double.

use super::types::NativeValue;
use crate::error::Result;

pub trait NativeModule {
    /// Current contents of linear memory
    fn memory(&self) -> &[u8];

    /// Mutable view of linear memory; length is the current memory size
    fn memory_mut(&mut self) -> &mut [u8];

    /// Module-side `allocate(size) -> address`; 0 means the heap is exhausted
    fn allocate(&mut self, size: u32) -> Result<u32>;

    /// Module-side `release(address)`
    fn release(&mut self, address: u32) -> Result<()>;

    /// Call an export with already-lowered parameters
    fn call(&mut self, function: &str, params: &[NativeValue]) -> Result<Option<NativeValue>>;
}

impl<M: NativeModule + ?Sized> NativeModule for Box<M> {
    fn memory(&self) -> &[u8] {
        (**self).memory()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        (**self).memory_mut()
    }

    fn allocate(&mut self, size: u32) -> Result<u32> {
        (**self).allocate(size)
    }

    fn release(&mut self, address: u32) -> Result<()> {
        (**self).release(address)
    }

    fn call(&mut self, function: &str, params: &[NativeValue]) -> Result<Option<NativeValue>> {
        (**self).call(function, params)
    }
}

//! In-process native module
//!
//! A linear memory plus `allocator::Heap`, with exports written as Rust
//! closures. Behaves like a loaded wasm instance from the bridge's point of
//! view, and adds the hooks tests need: allocation failure injection, a call
//! log and double-free detection.

use super::memory;
use super::module::NativeModule;
use super::types::NativeValue;
use crate::allocator::Heap;
use crate::error::{BridgeError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An export implemented on the host side
pub type Export =
    Arc<dyn Fn(&mut HostInstance, &[NativeValue]) -> Result<Option<NativeValue>> + Send + Sync>;

/// Memory and heap as seen from inside an export
pub struct HostInstance {
    memory: Vec<u8>,
    heap: Heap,
}

impl HostInstance {
    fn new(heap: Heap) -> Self {
        Self {
            memory: vec![0; heap.memory_size() as usize],
            heap,
        }
    }

    #[inline]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    #[inline]
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Module-side allocation; 0 when the heap cannot grow
    pub fn allocate(&mut self, size: u32) -> u32 {
        let Some(address) = self.heap.alloc(size) else {
            return 0;
        };
        let needed = self.heap.memory_size() as usize;
        if self.memory.len() < needed {
            self.memory.resize(needed, 0);
        }
        address
    }

    pub fn release(&mut self, address: u32) -> Result<()> {
        self.heap.free(address).map(|_| ())
    }

    /// Move a block to a new size, keeping the common prefix
    pub fn reallocate(&mut self, address: u32, size: u32) -> Result<u32> {
        let old_size = self
            .heap
            .block_size(address)
            .ok_or(BridgeError::InvalidRelease { address })?;

        let moved = self.allocate(size);
        if moved == 0 {
            return Err(BridgeError::AllocationFailed { size });
        }
        memory::copy(&mut self.memory, moved, address, old_size.min(size))?;
        self.release(address)?;
        Ok(moved)
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }
}

pub struct HostModule {
    instance: HostInstance,
    exports: HashMap<String, Export>,
    calls: Vec<(String, Vec<NativeValue>)>,
    allocation_attempts: u64,
    fail_at: Option<u64>,
}

impl HostModule {
    /// One page of memory, growable to 16 pages
    pub fn new() -> Self {
        Self::with_heap(Heap::default())
    }

    pub fn with_pages(initial_pages: u32, max_pages: u32) -> Self {
        Self::with_heap(Heap::new(initial_pages, max_pages))
    }

    fn with_heap(heap: Heap) -> Self {
        Self {
            instance: HostInstance::new(heap),
            exports: HashMap::new(),
            calls: Vec::new(),
            allocation_attempts: 0,
            fail_at: None,
        }
    }

    /// Register `function` as an export, replacing any previous one
    pub fn export<F>(&mut self, function: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&mut HostInstance, &[NativeValue]) -> Result<Option<NativeValue>> + Send + Sync + 'static,
    {
        self.exports.insert(function.into(), Arc::new(body));
        self
    }

    pub fn has_export(&self, function: &str) -> bool {
        self.exports.contains_key(function)
    }

    /// Make the `nth` allocation from now (1-based) return 0
    pub fn fail_allocation_on(&mut self, nth: u64) {
        self.fail_at = Some(self.allocation_attempts + nth);
    }

    /// Blocks currently allocated in the module heap
    pub fn live_allocations(&self) -> usize {
        self.instance.heap.stats().live_blocks
    }

    /// Every export call so far with its lowered parameters
    pub fn calls(&self) -> &[(String, Vec<NativeValue>)] {
        &self.calls
    }

    pub fn reallocate(&mut self, address: u32, size: u32) -> Result<u32> {
        self.instance.reallocate(address, size)
    }

    #[inline]
    pub fn instance(&self) -> &HostInstance {
        &self.instance
    }

    #[inline]
    pub fn instance_mut(&mut self) -> &mut HostInstance {
        &mut self.instance
    }
}

impl Default for HostModule {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exports: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        exports.sort_unstable();
        f.debug_struct("HostModule")
            .field("memory_size", &self.instance.memory.len())
            .field("exports", &exports)
            .field("live_allocations", &self.live_allocations())
            .finish()
    }
}

impl NativeModule for HostModule {
    fn memory(&self) -> &[u8] {
        self.instance.memory()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.instance.memory_mut()
    }

    fn allocate(&mut self, size: u32) -> Result<u32> {
        self.allocation_attempts += 1;
        if self.fail_at == Some(self.allocation_attempts) {
            self.fail_at = None;
            return Ok(0);
        }
        Ok(self.instance.allocate(size))
    }

    fn release(&mut self, address: u32) -> Result<()> {
        self.instance.release(address)
    }

    fn call(&mut self, function: &str, params: &[NativeValue]) -> Result<Option<NativeValue>> {
        self.calls.push((function.to_string(), params.to_vec()));
        let export = self
            .exports
            .get(function)
            .cloned()
            .ok_or_else(|| BridgeError::native(function, "no such export"))?;
        export(&mut self.instance, params)
    }
}

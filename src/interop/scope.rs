//! Per-call allocation scope
//!
//! All transient buffers of one `invoke` are acquired through a `CallScope`.
//! Whatever is still live when the scope ends is released, whether the call
//! returned normally, failed part-way through serialization, or unwound.

use super::module::NativeModule;
use super::types::NativeValue;
use super::InteropStats;
use crate::error::{BridgeError, Result};
use crate::logging;

/// One buffer allocated for the duration of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transient {
    pub address: u32,
    pub size: u32,
}

pub struct CallScope<'m, M: NativeModule + ?Sized> {
    module: &'m mut M,
    stats: &'m mut InteropStats,
    live: Vec<Transient>,
}

impl<'m, M: NativeModule + ?Sized> CallScope<'m, M> {
    pub fn new(module: &'m mut M, stats: &'m mut InteropStats) -> Self {
        Self {
            module,
            stats,
            live: Vec::new(),
        }
    }

    /// Allocate `size` bytes in the module and track them for release
    pub fn allocate(&mut self, size: u32) -> Result<u32> {
        let address = self.module.allocate(size)?;
        if address == 0 {
            logging::log_allocation_failure(size, self.live.len());
            return Err(BridgeError::AllocationFailed { size });
        }
        self.live.push(Transient { address, size });
        self.stats.allocations += 1;
        self.stats.bytes_allocated += u64::from(size);
        logging::log_allocation(address, size);
        Ok(address)
    }

    #[inline]
    pub fn memory(&self) -> &[u8] {
        self.module.memory()
    }

    #[inline]
    pub fn memory_mut(&mut self) -> &mut [u8] {
        self.module.memory_mut()
    }

    pub fn call(&mut self, function: &str, params: &[NativeValue]) -> Result<Option<NativeValue>> {
        logging::log_native_call(function, params.len());
        let returned = self.module.call(function, params)?;
        logging::log_native_return(function, returned.is_some());
        Ok(returned)
    }

    /// Buffers allocated so far, oldest first
    pub fn live(&self) -> &[Transient] {
        &self.live
    }

    /// Release everything still tracked, newest first
    ///
    /// Keeps going past a failed release so one bad address cannot leak the
    /// rest; the first failure is returned.
    fn release_all(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(transient) = self.live.pop() {
            match self.module.release(transient.address) {
                Ok(()) => {
                    self.stats.releases += 1;
                    logging::log_release(transient.address, transient.size);
                }
                Err(err) => {
                    logging::log_release_failure(transient.address, &err);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close the scope, reporting release failures
    pub fn finish(mut self) -> Result<()> {
        self.release_all()
    }
}

impl<M: NativeModule + ?Sized> Drop for CallScope<'_, M> {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            // errors were already logged; the call's own error takes precedence
            let _ = self.release_all();
        }
    }
}

//! Interoperability - call linear-memory module exports with structured values
//!
//! Design: declarative marshaling. Call sites register descriptors once and
//! never compute byte offsets themselves.
//!
//! Architecture:
//! - `types.rs` - closed type tags and native scalars (TypeTag, Primitive, NativeValue)
//! - `value.rs` - host-side values
//! - `memory.rs` - typed, bounds-checked access to linear memory
//! - `registry.rs` - struct name → descriptor
//! - `layout.rs` - sizes and offsets, tightly packed
//! - `cursor.rs` - bounded offset cursor
//! - `marshal.rs` / `unmarshal.rs` - host values ↔ linear memory
//! - `scope.rs` - per-call transient allocations, released on drop
//! - `call.rs` - `Bridge::invoke`
//! - `module.rs` - the native module contract
//! - `host.rs` - in-process module over `allocator::Heap`
//! - `wasm.rs` - wasmi-backed module

mod call;
mod cursor;
mod host;
pub mod layout;
pub mod memory;
mod marshal;
mod module;
mod registry;
mod scope;
mod types;
mod unmarshal;
mod value;
#[cfg(feature = "wasmi")]
mod wasm;

pub use call::{Bridge, CallPhase, FunctionCall};
pub use cursor::Cursor;
pub use host::{Export, HostInstance, HostModule};
pub use marshal::{scalar_of, to_native, Marshaler};
pub use module::NativeModule;
pub use registry::{object_extractor, Constructor, Extractor, FieldDescriptor, TypeDescriptor, TypeRegistry};
pub use scope::{CallScope, Transient};
pub use types::{NativeType, NativeValue, Primitive, Scalar, TypeTag, POINTER_SIZE};
pub use unmarshal::{from_native, Unmarshaler, DEFAULT_MAX_DEPTH};
pub use value::Value;
#[cfg(feature = "wasmi")]
pub use wasm::{WasmExports, WasmModule};

/// Per-bridge counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteropStats {
    pub calls_made: u64,
    pub failed_calls: u64,
    pub allocations: u64,
    pub releases: u64,
    pub bytes_allocated: u64,
}

impl InteropStats {
    /// Transient buffers allocated but not yet released
    pub fn outstanding(&self) -> u64 {
        self.allocations - self.releases
    }
}

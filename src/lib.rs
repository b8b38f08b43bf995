//! mazebridge - call linear-memory module exports with structured values
//!
//! Register struct descriptors once, then call through `Bridge::invoke`; the
//! bridge lays values out in module memory, passes scalars and addresses,
//! reads results back and releases everything it allocated.

pub mod allocator;
pub mod config;
pub mod error;
pub mod interop;
pub mod logging;
pub mod maze;

pub use config::BridgeConfig;
pub use error::{BridgeError, ConfigError, Result};
pub use interop::{
    Bridge, CallPhase, FunctionCall, HostModule, InteropStats, NativeModule, NativeValue, Primitive,
    TypeDescriptor, TypeRegistry, TypeTag, Value,
};
#[cfg(feature = "wasmi")]
pub use interop::{WasmExports, WasmModule};
pub use maze::{Board, Coordinates, Door, Move, Solver, Tile};

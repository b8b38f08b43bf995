//! wasmi-backed native module
//!
//! Loads a `.wasm` binary, instantiates it without imports and exposes its
//! exported memory, allocator pair and functions through `NativeModule`.

use super::module::NativeModule;
use super::types::NativeValue;
use crate::error::{BridgeError, Result};
use std::path::Path;
use wasmi::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc, Val};

/// Names of the exports the bridge relies on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmExports {
    pub memory: String,
    pub allocate: String,
    pub release: String,
}

impl Default for WasmExports {
    fn default() -> Self {
        Self {
            memory: "memory".to_string(),
            allocate: "allocate".to_string(),
            release: "release".to_string(),
        }
    }
}

pub struct WasmModule {
    store: Store<()>,
    instance: Instance,
    memory: Memory,
    allocate: TypedFunc<i32, i32>,
    release: TypedFunc<i32, ()>,
}

impl WasmModule {
    pub fn from_file(path: impl AsRef<Path>, exports: &WasmExports) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| BridgeError::native(path.display().to_string(), e))?;
        Self::from_bytes(&bytes, exports)
    }

    pub fn from_bytes(bytes: &[u8], exports: &WasmExports) -> Result<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, bytes).map_err(|e| BridgeError::native("<module>", e))?;

        let mut store = Store::new(&engine, ());
        let linker = Linker::<()>::new(&engine);
        let pre = linker
            .instantiate(&mut store, &module)
            .map_err(|e| BridgeError::native("<instantiate>", e))?;
        let instance = pre
            .start(&mut store)
            .map_err(|e| BridgeError::native("<start>", e))?;

        let memory = instance
            .get_memory(&store, &exports.memory)
            .ok_or_else(|| BridgeError::native(exports.memory.as_str(), "memory export not found"))?;
        let allocate = instance
            .get_typed_func::<i32, i32>(&store, &exports.allocate)
            .map_err(|e| BridgeError::native(exports.allocate.as_str(), e))?;
        let release = instance
            .get_typed_func::<i32, ()>(&store, &exports.release)
            .map_err(|e| BridgeError::native(exports.release.as_str(), e))?;

        tracing::debug!(
            target: "wasm",
            memory_bytes = memory.data(&store).len(),
            "module instantiated"
        );

        Ok(Self {
            store,
            instance,
            memory,
            allocate,
            release,
        })
    }

    pub fn has_export(&self, function: &str) -> bool {
        self.instance.get_func(&self.store, function).is_some()
    }
}

impl NativeModule for WasmModule {
    fn memory(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn allocate(&mut self, size: u32) -> Result<u32> {
        let address = self
            .allocate
            .call(&mut self.store, size as i32)
            .map_err(|e| BridgeError::native("allocate", e))?;
        Ok(address as u32)
    }

    fn release(&mut self, address: u32) -> Result<()> {
        self.release
            .call(&mut self.store, address as i32)
            .map_err(|e| BridgeError::native("release", e))
    }

    fn call(&mut self, function: &str, params: &[NativeValue]) -> Result<Option<NativeValue>> {
        let func = self
            .instance
            .get_func(&self.store, function)
            .ok_or_else(|| BridgeError::native(function, "no such export"))?;

        let ty = func.ty(&self.store);
        if ty.params().len() != params.len() {
            return Err(BridgeError::native(
                function,
                format!("expects {} parameters, got {}", ty.params().len(), params.len()),
            ));
        }

        let inputs: Vec<Val> = params.iter().map(|&p| to_val(p)).collect();
        let mut outputs: Vec<Val> = ty.results().iter().map(|&t| Val::default(t)).collect();
        func.call(&mut self.store, &inputs, &mut outputs)
            .map_err(|e| BridgeError::native(function, e))?;

        match outputs.first() {
            None => Ok(None),
            Some(val) => from_val(function, val).map(Some),
        }
    }
}

fn to_val(value: NativeValue) -> Val {
    match value {
        NativeValue::I32(v) => Val::I32(v),
        NativeValue::I64(v) => Val::I64(v),
        NativeValue::F32(v) => Val::F32(v.into()),
        NativeValue::F64(v) => Val::F64(v.into()),
    }
}

fn from_val(function: &str, val: &Val) -> Result<NativeValue> {
    match val {
        Val::I32(v) => Ok(NativeValue::I32(*v)),
        Val::I64(v) => Ok(NativeValue::I64(*v)),
        Val::F32(v) => Ok(NativeValue::F32(v.to_float())),
        Val::F64(v) => Ok(NativeValue::F64(v.to_float())),
        other => Err(BridgeError::native(
            function,
            format!("returned a reference value ({:?})", other.ty()),
        )),
    }
}


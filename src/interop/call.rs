//! Call orchestration
//!
//! `Bridge::invoke` lowers structured arguments into linear memory, calls the
//! export with scalars and addresses only, lifts the result back out and
//! releases every transient buffer it created.

use super::layout;
use super::marshal::{self, Marshaler};
use super::module::NativeModule;
use super::registry::{TypeDescriptor, TypeRegistry};
use super::scope::CallScope;
use super::types::{NativeValue, TypeTag};
use super::unmarshal::{self, Unmarshaler, DEFAULT_MAX_DEPTH};
use super::value::Value;
use super::InteropStats;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::logging;

/// Progress of one call; `Failed` and `Released` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    ArgsSerialized,
    Invoked,
    ResultDeserialized,
    Released,
    Failed,
}

/// Call descriptor: export name plus declared signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub function: String,
    pub return_tag: TypeTag,
    pub arg_tags: Vec<TypeTag>,
}

impl FunctionCall {
    pub fn new(function: impl Into<String>, return_tag: TypeTag, arg_tags: Vec<TypeTag>) -> Self {
        Self {
            function: function.into(),
            return_tag,
            arg_tags,
        }
    }
}

/// A native module together with the descriptors used to talk to it
pub struct Bridge<M: NativeModule> {
    module: M,
    registry: TypeRegistry,
    stats: InteropStats,
    last_phase: CallPhase,
    max_depth: usize,
}

impl<M: NativeModule> Bridge<M> {
    pub fn new(module: M) -> Self {
        Self::with_registry(module, TypeRegistry::new())
    }

    pub fn with_registry(module: M, registry: TypeRegistry) -> Self {
        Self {
            module,
            registry,
            stats: InteropStats::default(),
            last_phase: CallPhase::Idle,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Build a bridge and register the structs declared in `config`
    pub fn from_config(module: M, config: &BridgeConfig) -> Result<Self> {
        let mut bridge = Self::new(module);
        bridge.max_depth = config.bridge.max_depth;
        config.register_structs(&mut bridge.registry)?;
        bridge.registry.validate()?;
        Ok(bridge)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Register a struct descriptor; setup time only
    pub fn register(&mut self, name: impl Into<String>, descriptor: TypeDescriptor) -> Result<()> {
        self.registry.register(name, descriptor)
    }

    #[inline]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[inline]
    pub fn module(&self) -> &M {
        &self.module
    }

    #[inline]
    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn into_module(self) -> M {
        self.module
    }

    #[inline]
    pub fn stats(&self) -> InteropStats {
        self.stats
    }

    /// Phase the most recent call ended in
    #[inline]
    pub fn last_phase(&self) -> CallPhase {
        self.last_phase
    }

    pub fn size_of(&self, tag: &TypeTag) -> Result<u32> {
        layout::size_of(&self.registry, tag)
    }

    /// Call `function` with structured arguments
    pub fn invoke(
        &mut self,
        function: &str,
        return_tag: &TypeTag,
        arg_tags: &[TypeTag],
        args: &[Value],
    ) -> Result<Value> {
        let _span = tracing::debug_span!("invoke", function).entered();
        let _timer = logging::perf::track(function);

        self.last_phase = CallPhase::Idle;
        let result = self.invoke_scoped(function, return_tag, arg_tags, args);

        match &result {
            Ok(_) => self.stats.calls_made += 1,
            Err(err) => {
                self.stats.failed_calls += 1;
                self.last_phase = CallPhase::Failed;
                logging::log_call_error(function, err);
            }
        }
        result
    }

    /// Same as `invoke`, taking a prepared descriptor
    pub fn call(&mut self, call: &FunctionCall, args: &[Value]) -> Result<Value> {
        self.invoke(&call.function, &call.return_tag, &call.arg_tags, args)
    }

    fn invoke_scoped(
        &mut self,
        function: &str,
        return_tag: &TypeTag,
        arg_tags: &[TypeTag],
        args: &[Value],
    ) -> Result<Value> {
        if arg_tags.len() != args.len() {
            return Err(BridgeError::ArgCountMismatch {
                expected: arg_tags.len(),
                got: args.len(),
            });
        }

        // everything that can be rejected statically is rejected before allocating
        self.registry.check(return_tag)?;
        for tag in arg_tags {
            if *tag == TypeTag::Void {
                return Err(BridgeError::InvalidTypeTag {
                    tag: tag.to_string(),
                    context: "an argument",
                });
            }
            self.registry.check(tag)?;
        }

        let Self {
            module,
            registry,
            stats,
            last_phase,
            max_depth,
        } = self;
        let marshaler = Marshaler::new(registry);
        let unmarshaler = Unmarshaler::new(registry).with_max_depth(*max_depth);
        let mut scope = CallScope::new(module, stats);
        let mut params = Vec::with_capacity(args.len() + 1);

        // hidden first parameter for struct returns
        let return_buffer = match return_tag {
            TypeTag::Struct(_) => {
                let size = layout::size_of(registry, return_tag)?;
                let address = scope.allocate(size)?;
                params.push(NativeValue::address(address));
                Some(address)
            }
            _ => None,
        };

        for (tag, value) in arg_tags.iter().zip(args) {
            let param = match tag {
                TypeTag::Struct(name) => {
                    NativeValue::address(marshaler.write_struct(&mut scope, name, value)?)
                }
                TypeTag::Pointer(element) => {
                    NativeValue::address(marshaler.write_pointee(&mut scope, element, value)?)
                }
                TypeTag::Primitive(kind) => marshal::to_native(value, *kind)?,
                TypeTag::Void => {
                    return Err(BridgeError::InvalidTypeTag {
                        tag: tag.to_string(),
                        context: "an argument",
                    })
                }
            };
            params.push(param);
        }
        *last_phase = CallPhase::ArgsSerialized;
        logging::log_phase(function, *last_phase);

        let returned = scope.call(function, &params)?;
        *last_phase = CallPhase::Invoked;
        logging::log_phase(function, *last_phase);

        let result = match (return_tag, return_buffer) {
            (TypeTag::Struct(name), Some(address)) => {
                unmarshaler.read_struct(scope.memory(), name, address)?
            }
            (TypeTag::Pointer(element), _) => {
                let address = returned.and_then(NativeValue::as_address).ok_or_else(|| {
                    BridgeError::native(function, "did not return a 32-bit address")
                })?;
                unmarshaler.read_pointee(scope.memory(), address, element)?
            }
            (TypeTag::Primitive(kind), _) => unmarshal::from_native(function, returned, *kind)?,
            _ => Value::Null,
        };
        *last_phase = CallPhase::ResultDeserialized;
        logging::log_phase(function, *last_phase);

        scope.finish()?;
        *last_phase = CallPhase::Released;
        logging::log_phase(function, *last_phase);
        Ok(result)
    }
}

//! Error taxonomy for the bridge
//!
//! Every failure surfaces synchronously from `Bridge::invoke`. Configuration
//! problems are kept in their own enum so callers can tell "fix your
//! descriptors" apart from "the module ran out of heap".

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Descriptor and configuration mistakes, reported before any allocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("struct `{name}` is not registered")]
    UnknownStruct { name: String },

    #[error("struct `{name}` is already registered")]
    DuplicateStruct { name: String },

    #[error("struct `{name}` has no fields")]
    EmptyStruct { name: String },

    #[error("struct `{name}` declares {fields} fields but {extractors} extractors")]
    ExtractorCountMismatch {
        name: String,
        fields: usize,
        extractors: usize,
    },

    #[error("struct `{name}` contains itself by value: {}", .chain.join(" -> "))]
    RecursiveStruct { name: String, chain: Vec<String> },

    #[error("invalid type tag `{text}`: {reason}")]
    BadTag { text: String, reason: String },

    #[error("failed to load config: {0}")]
    Load(String),
}

/// Everything that can go wrong while marshaling or calling
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("module allocator returned null for {size} bytes")]
    AllocationFailed { size: u32 },

    #[error("type tag `{tag}` cannot be used for {context}")]
    InvalidTypeTag { tag: String, context: &'static str },

    #[error("native function `{function}` failed: {message}")]
    Native { function: String, message: String },

    #[error("access of {len} bytes at {address:#x} is outside linear memory of {memory_size} bytes")]
    OutOfBounds {
        address: u32,
        len: u32,
        memory_size: usize,
    },

    #[error("value {value} does not fit in `{tag}`")]
    ValueOutOfRange { value: String, tag: String },

    #[error("expected {expected} for `{tag}`, found {found}")]
    ValueShape {
        tag: String,
        expected: &'static str,
        found: String,
    },

    #[error("write of {len} bytes at offset {offset} overruns a {capacity}-byte region at {base:#x}")]
    LayoutOverrun {
        base: u32,
        offset: u32,
        len: u32,
        capacity: u32,
    },

    #[error("expected {expected} arguments, got {got}")]
    ArgCountMismatch { expected: usize, got: usize },

    #[error("pointer chain deeper than {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("release of {address:#x} which is not a live allocation")]
    InvalidRelease { address: u32 },
}

impl BridgeError {
    pub fn native(function: impl Into<String>, message: impl ToString) -> Self {
        Self::Native {
            function: function.into(),
            message: message.to_string(),
        }
    }

    /// True for descriptor/configuration problems
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

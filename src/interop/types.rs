//! Type definitions for the module boundary
//!
//! `TypeTag` is the closed set of shapes the bridge knows how to lay out.
//! Tags are parsed once (from config or the CLI) and matched exhaustively
//! afterwards.

use crate::error::{ConfigError, Result};
use core::fmt;
use core::str::FromStr;

/// Width of a pointer in a 32-bit linear-memory module
pub const POINTER_SIZE: u32 = 4;

/// Primitive scalar kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Primitive {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    F32,
    F64,
}

impl Primitive {
    /// Size of the scalar in bytes
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Inclusive integer range representable by this kind
    pub const fn int_range(self) -> Option<(i64, i64)> {
        match self {
            Self::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::U8 => Some((0, u8::MAX as i64)),
            Self::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::U16 => Some((0, u16::MAX as i64)),
            Self::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::U32 => Some((0, u32::MAX as i64)),
            Self::I64 => Some((i64::MIN, i64::MAX)),
            Self::F32 | Self::F64 => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => Self::I8,
            "u8" => Self::U8,
            "i16" => Self::I16,
            "u16" => Self::U16,
            "i32" => Self::I32,
            "u32" => Self::U32,
            "i64" => Self::I64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        })
    }
}

/// Shape of a value crossing the boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// No value; only meaningful as a return type
    Void,
    Primitive(Primitive),
    /// Struct embedded by value, named in the registry
    Struct(String),
    /// 32-bit address of one element or a contiguous run of elements
    Pointer(Box<TypeTag>),
}

impl TypeTag {
    #[inline]
    pub fn structure(name: impl Into<String>) -> Self {
        Self::Struct(name.into())
    }

    #[inline]
    pub fn pointer(to: TypeTag) -> Self {
        Self::Pointer(Box::new(to))
    }

    #[inline]
    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// Struct name if this tag is a by-value struct
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Self::Struct(name) => Some(name),
            _ => None,
        }
    }

    /// Native parameter type used when this tag is passed to an export
    ///
    /// Structs and pointers both travel as 32-bit addresses.
    pub fn native_type(&self) -> Option<NativeType> {
        match self {
            Self::Void => None,
            Self::Struct(_) | Self::Pointer(_) => Some(NativeType::I32),
            Self::Primitive(p) => Some(match p {
                Primitive::I64 => NativeType::I64,
                Primitive::F32 => NativeType::F32,
                Primitive::F64 => NativeType::F64,
                _ => NativeType::I32,
            }),
        }
    }
}

impl From<Primitive> for TypeTag {
    fn from(p: Primitive) -> Self {
        Self::Primitive(p)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Primitive(p) => write!(f, "{}", p.name()),
            Self::Struct(name) => write!(f, "{}", name),
            Self::Pointer(inner) => write!(f, "*{}", inner),
        }
    }
}

impl FromStr for TypeTag {
    type Err = crate::error::BridgeError;

    /// Parse `i16`, `Point`, `*Point`, `**u8` or `void`
    fn from_str(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let bad = |reason: &str| ConfigError::BadTag {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = trimmed.strip_prefix('*') {
            let inner: TypeTag = rest.parse().map_err(|_| bad("invalid pointee"))?;
            if inner == TypeTag::Void {
                return Err(bad("pointer to void has no element size").into());
            }
            return Ok(Self::pointer(inner));
        }

        if trimmed.is_empty() {
            return Err(bad("empty tag").into());
        }
        if trimmed == "void" {
            return Ok(Self::Void);
        }
        if let Some(p) = Primitive::from_name(trimmed) {
            return Ok(Self::Primitive(p));
        }

        let mut chars = trimmed.chars();
        let starts_ok = chars
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
        if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(bad("struct names are identifiers").into());
        }
        Ok(Self::Struct(trimmed.to_string()))
    }
}

/// Value types understood by the native call surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    I32,
    I64,
    F32,
    F64,
}

/// A scalar passed to or returned from a native export
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl NativeValue {
    /// Address passed in a pointer parameter
    #[inline]
    pub const fn address(address: u32) -> Self {
        Self::I32(address as i32)
    }

    pub const fn ty(self) -> NativeType {
        match self {
            Self::I32(_) => NativeType::I32,
            Self::I64(_) => NativeType::I64,
            Self::F32(_) => NativeType::F32,
            Self::F64(_) => NativeType::F64,
        }
    }

    /// Reinterpret as an unsigned 32-bit address
    pub const fn as_address(self) -> Option<u32> {
        match self {
            Self::I32(v) => Some(v as u32),
            _ => None,
        }
    }
}

/// Numeric read from or written to linear memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

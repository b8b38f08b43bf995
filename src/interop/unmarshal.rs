//! Type unmarshaling - linear memory back into host values
//!
//! Structural inverse of `marshal`. Pointers to structs are followed;
//! pointers to anything else come back as raw addresses, since their length
//! is only known to whoever wrote the descriptor.

use super::cursor::Cursor;
use super::layout;
use super::memory;
use super::registry::TypeRegistry;
use super::types::{NativeValue, Primitive, TypeTag, POINTER_SIZE};
use super::value::Value;
use crate::error::{BridgeError, Result};

/// Default limit on pointer hops while reading one value
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Deserializer bound to one registry
#[derive(Clone, Copy)]
pub struct Unmarshaler<'r> {
    registry: &'r TypeRegistry,
    max_depth: usize,
}

impl<'r> Unmarshaler<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Read a value of `tag` stored at `address`
    pub fn read(&self, memory: &[u8], address: u32, tag: &TypeTag) -> Result<Value> {
        let size = layout::size_of(self.registry, tag)?;
        let mut cursor = Cursor::new(address, size);
        self.read_field(memory, tag, &mut cursor, 0)
    }

    /// Read the struct `name` stored at `address`
    pub fn read_struct(&self, memory: &[u8], name: &str, address: u32) -> Result<Value> {
        self.read(memory, address, &TypeTag::Struct(name.to_string()))
    }

    /// Interpret `address` as a pointer to `element`
    ///
    /// Null yields `Null`, a struct pointee is read, anything else is
    /// returned as the raw address.
    pub fn read_pointee(&self, memory: &[u8], address: u32, element: &TypeTag) -> Result<Value> {
        self.follow(memory, address, element, 0)
    }

    fn follow(&self, memory: &[u8], address: u32, element: &TypeTag, depth: usize) -> Result<Value> {
        if address == 0 {
            return Ok(Value::Null);
        }
        match element {
            TypeTag::Struct(name) => {
                if depth >= self.max_depth {
                    return Err(BridgeError::DepthExceeded {
                        limit: self.max_depth,
                    });
                }
                let size = layout::size_of(self.registry, element)?;
                let mut cursor = Cursor::new(address, size);
                self.read_struct_at(memory, name, &mut cursor, depth + 1)
            }
            _ => Ok(Value::Int(address.into())),
        }
    }

    fn read_struct_at(
        &self,
        memory: &[u8],
        name: &str,
        cursor: &mut Cursor,
        depth: usize,
    ) -> Result<Value> {
        let descriptor = self.registry.resolve(name)?;
        let mut values = Vec::with_capacity(descriptor.fields().len());
        for field in descriptor.fields() {
            values.push(self.read_field(memory, &field.tag, cursor, depth)?);
        }
        descriptor.construct(values)
    }

    fn read_field(&self, memory: &[u8], tag: &TypeTag, cursor: &mut Cursor, depth: usize) -> Result<Value> {
        match tag {
            TypeTag::Primitive(kind) => {
                let at = cursor.claim(kind.size())?;
                Ok(memory::read_primitive(memory, at, *kind)?.into())
            }
            TypeTag::Struct(name) => {
                let size = layout::size_of(self.registry, tag)?;
                let mut inner = cursor.split(size)?;
                self.read_struct_at(memory, name, &mut inner, depth)
            }
            TypeTag::Pointer(element) => {
                let at = cursor.claim(POINTER_SIZE)?;
                let target = memory::read_address(memory, at)?;
                self.follow(memory, target, element, depth)
            }
            TypeTag::Void => Err(BridgeError::InvalidTypeTag {
                tag: tag.to_string(),
                context: "a struct field",
            }),
        }
    }
}

/// Narrow a native scalar return to the declared primitive
pub fn from_native(function: &str, returned: Option<NativeValue>, kind: Primitive) -> Result<Value> {
    let mismatch = |found: String| {
        BridgeError::native(
            function,
            format!("returned {} where `{}` was declared", found, kind.name()),
        )
    };

    let value = returned.ok_or_else(|| mismatch("nothing".to_string()))?;
    Ok(match (kind, value) {
        (Primitive::I8, NativeValue::I32(v)) => Value::Int((v as i8).into()),
        (Primitive::U8, NativeValue::I32(v)) => Value::Int((v as u8).into()),
        (Primitive::I16, NativeValue::I32(v)) => Value::Int((v as i16).into()),
        (Primitive::U16, NativeValue::I32(v)) => Value::Int((v as u16).into()),
        (Primitive::I32, NativeValue::I32(v)) => Value::Int(v.into()),
        (Primitive::U32, NativeValue::I32(v)) => Value::Int((v as u32).into()),
        (Primitive::I64, NativeValue::I64(v)) => Value::Int(v),
        (Primitive::F32, NativeValue::F32(v)) => Value::Float(v.into()),
        (Primitive::F64, NativeValue::F64(v)) => Value::Float(v),
        (_, other) => return Err(mismatch(format!("{:?}", other))),
    })
}

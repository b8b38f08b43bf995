//! Type marshaling - host values into linear memory
//!
//! Design: one allocation per struct or array, fields written in descriptor
//! order through a bounded cursor, nested data materialized behind pointers.

use super::cursor::Cursor;
use super::layout;
use super::memory;
use super::module::NativeModule;
use super::registry::TypeRegistry;
use super::scope::CallScope;
use super::types::{NativeValue, Primitive, Scalar, TypeTag, POINTER_SIZE};
use super::value::Value;
use crate::error::{BridgeError, Result};

/// Serializer bound to one registry
#[derive(Clone, Copy)]
pub struct Marshaler<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> Marshaler<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Write `value` into freshly allocated memory and return its address
    pub fn write<M: NativeModule + ?Sized>(
        &self,
        scope: &mut CallScope<'_, M>,
        value: &Value,
        tag: &TypeTag,
    ) -> Result<u32> {
        match tag {
            TypeTag::Struct(name) => self.write_struct(scope, name, value),
            TypeTag::Pointer(element) => self.write_pointee(scope, element, value),
            TypeTag::Primitive(_) => self.write_single(scope, tag, value),
            TypeTag::Void => Err(void_tag("serialization")),
        }
    }

    /// Allocate and fill one struct
    pub fn write_struct<M: NativeModule + ?Sized>(
        &self,
        scope: &mut CallScope<'_, M>,
        name: &str,
        value: &Value,
    ) -> Result<u32> {
        let size = layout::size_of(self.registry, &TypeTag::Struct(name.to_string()))?;
        let address = scope.allocate(size)?;
        let mut cursor = Cursor::new(address, size);
        self.fill_struct(scope, name, value, &mut cursor)?;
        debug_assert!(cursor.is_exhausted());
        Ok(address)
    }

    /// Produce the address a pointer to `element` should hold for `value`
    ///
    /// `Null` and empty lists become a null pointer, a list becomes a
    /// contiguous array, anything else a single element.
    pub fn write_pointee<M: NativeModule + ?Sized>(
        &self,
        scope: &mut CallScope<'_, M>,
        element: &TypeTag,
        value: &Value,
    ) -> Result<u32> {
        if *element == TypeTag::Void {
            return Err(void_tag("a pointee"));
        }

        match value {
            Value::Null => Ok(0),
            Value::List(items) if items.is_empty() => Ok(0),
            Value::List(items) => self.write_array(scope, element, items),
            single => self.write_single(scope, element, single),
        }
    }

    fn write_single<M: NativeModule + ?Sized>(
        &self,
        scope: &mut CallScope<'_, M>,
        tag: &TypeTag,
        value: &Value,
    ) -> Result<u32> {
        let size = layout::size_of(self.registry, tag)?;
        let address = scope.allocate(size)?;
        let mut cursor = Cursor::new(address, size);
        self.fill(scope, tag, value, &mut cursor)?;
        Ok(address)
    }

    fn write_array<M: NativeModule + ?Sized>(
        &self,
        scope: &mut CallScope<'_, M>,
        element: &TypeTag,
        items: &[Value],
    ) -> Result<u32> {
        let size = layout::array_size(self.registry, element, items.len())?;
        let base = scope.allocate(size)?;

        if let TypeTag::Primitive(kind) = element {
            let scalars = items
                .iter()
                .map(|item| scalar_of(item, *kind))
                .collect::<Result<Vec<_>>>()?;
            memory::write_bulk(scope.memory_mut(), base, &scalars, element)?;
        } else {
            let mut cursor = Cursor::new(base, size);
            for item in items {
                self.fill(scope, element, item, &mut cursor)?;
            }
        }
        Ok(base)
    }

    fn fill_struct<M: NativeModule + ?Sized>(
        &self,
        scope: &mut CallScope<'_, M>,
        name: &str,
        host: &Value,
        cursor: &mut Cursor,
    ) -> Result<()> {
        let descriptor = self.registry.resolve(name)?;
        for (index, field) in descriptor.fields().iter().enumerate() {
            let value = descriptor.extract(name, index, host)?;
            self.fill(scope, &field.tag, &value, cursor)?;
        }
        Ok(())
    }

    /// Write `value` at the cursor as `tag`
    fn fill<M: NativeModule + ?Sized>(
        &self,
        scope: &mut CallScope<'_, M>,
        tag: &TypeTag,
        value: &Value,
        cursor: &mut Cursor,
    ) -> Result<()> {
        match tag {
            TypeTag::Primitive(kind) => {
                let scalar = scalar_of(value, *kind)?;
                let at = cursor.claim(kind.size())?;
                memory::write_primitive(scope.memory_mut(), at, scalar, *kind)
            }
            TypeTag::Struct(name) => {
                // embedded: same buffer, no new allocation
                let size = layout::size_of(self.registry, tag)?;
                let mut inner = cursor.split(size)?;
                self.fill_struct(scope, name, value, &mut inner)
            }
            TypeTag::Pointer(element) => {
                let target = self.write_pointee(scope, element, value)?;
                let at = cursor.claim(POINTER_SIZE)?;
                memory::write_address(scope.memory_mut(), at, target)
            }
            TypeTag::Void => Err(void_tag("a struct field")),
        }
    }
}

fn void_tag(context: &'static str) -> BridgeError {
    BridgeError::InvalidTypeTag {
        tag: TypeTag::Void.to_string(),
        context,
    }
}

/// Numeric view of a host value for primitive `kind`
pub fn scalar_of(value: &Value, kind: Primitive) -> Result<Scalar> {
    match value {
        Value::Int(v) => Ok(Scalar::Int(*v)),
        Value::Float(v) if kind.is_float() => Ok(Scalar::Float(*v)),
        other => Err(BridgeError::ValueShape {
            tag: kind.name().to_string(),
            expected: if kind.is_float() { "number" } else { "integer" },
            found: other.kind().to_string(),
        }),
    }
}

/// Lower a primitive argument to the native value it is passed as
pub fn to_native(value: &Value, kind: Primitive) -> Result<NativeValue> {
    let scalar = scalar_of(value, kind)?;
    // reuse the facade's range checks
    memory::encode(scalar, kind)?;

    Ok(match scalar {
        Scalar::Float(v) if kind == Primitive::F32 => NativeValue::F32(v as f32),
        Scalar::Float(v) => NativeValue::F64(v),
        Scalar::Int(v) => match kind {
            Primitive::F32 => NativeValue::F32(v as f32),
            Primitive::F64 => NativeValue::F64(v as f64),
            Primitive::I64 => NativeValue::I64(v),
            Primitive::U32 => NativeValue::I32(v as u32 as i32),
            _ => NativeValue::I32(v as i32),
        },
    })
}

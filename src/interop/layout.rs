//! Layout calculator
//!
//! Tight packing: a struct is the sum of its fields, arrays are element size
//! times length, nothing is padded. This has to agree with how the module was
//! compiled; the bridge cannot check that.

use super::registry::TypeRegistry;
use super::types::{TypeTag, POINTER_SIZE};
use crate::error::{ConfigError, Result};
use std::collections::HashMap;

/// Byte size of `tag`
pub fn size_of(registry: &TypeRegistry, tag: &TypeTag) -> Result<u32> {
    Sizer::new(registry).size(tag)
}

/// Byte offset of every field of struct `name`, in declaration order
pub fn field_offsets(registry: &TypeRegistry, name: &str) -> Result<Vec<u32>> {
    let descriptor = registry.resolve(name)?;
    let mut sizer = Sizer::new(registry);
    let mut offsets = Vec::with_capacity(descriptor.fields().len());
    let mut at = 0u32;
    for field in descriptor.field_tags() {
        offsets.push(at);
        at = at
            .checked_add(sizer.size(field)?)
            .ok_or_else(|| too_large(&TypeTag::structure(name)))?;
    }
    Ok(offsets)
}

/// Size of a contiguous run of `len` elements of `element`
pub fn array_size(registry: &TypeRegistry, element: &TypeTag, len: usize) -> Result<u32> {
    let each = size_of(registry, element)?;
    let len = u32::try_from(len).ok();
    len.and_then(|n| n.checked_mul(each))
        .ok_or_else(|| too_large(element))
}

fn too_large(tag: &TypeTag) -> crate::error::BridgeError {
    ConfigError::BadTag {
        text: tag.to_string(),
        reason: "does not fit in 32-bit memory".to_string(),
    }
    .into()
}

/// Struct sizes computed so far plus the by-value chain being walked
struct Sizer<'a> {
    registry: &'a TypeRegistry,
    stack: Vec<&'a str>,
    known: HashMap<&'a str, u32>,
}

impl<'a> Sizer<'a> {
    fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            stack: Vec::new(),
            known: HashMap::new(),
        }
    }

    fn size(&mut self, tag: &'a TypeTag) -> Result<u32> {
        let name = match tag {
            TypeTag::Void => return Ok(0),
            TypeTag::Primitive(p) => return Ok(p.size()),
            TypeTag::Pointer(_) => return Ok(POINTER_SIZE),
            TypeTag::Struct(name) => name.as_str(),
        };
        if let Some(&size) = self.known.get(name) {
            return Ok(size);
        }
        if let Some(pos) = self.stack.iter().position(|n| *n == name) {
            let mut chain: Vec<String> = self.stack[pos..].iter().map(|n| n.to_string()).collect();
            chain.push(name.to_string());
            return Err(ConfigError::RecursiveStruct {
                name: name.to_string(),
                chain,
            }
            .into());
        }

        let descriptor = self.registry.resolve(name)?;
        self.stack.push(name);
        let mut total = 0u32;
        for field in descriptor.field_tags() {
            let size = self.size(field)?;
            total = total.checked_add(size).ok_or_else(|| too_large(tag))?;
        }
        self.stack.pop();
        self.known.insert(name, total);
        Ok(total)
    }
}

//! Type descriptor registry
//!
//! One registry per bridge. Descriptors are registered at setup and only read
//! while calls are in flight.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::types::TypeTag;
use super::value::Value;
use crate::error::{BridgeError, ConfigError, Result};

/// Builds a host value from the ordered field values of a struct
pub type Constructor = Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>;

/// Pulls one field's value out of a host value
pub type Extractor = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: Option<String>,
    pub tag: TypeTag,
}

/// Layout and construction metadata for one struct
#[derive(Clone)]
pub struct TypeDescriptor {
    fields: Vec<FieldDescriptor>,
    constructor: Option<Constructor>,
    extractors: Option<Vec<Extractor>>,
}

impl TypeDescriptor {
    /// Positional descriptor: fields are matched by index, reads yield `Value::Record`
    pub fn new(tags: impl IntoIterator<Item = TypeTag>) -> Self {
        Self {
            fields: tags
                .into_iter()
                .map(|tag| FieldDescriptor { name: None, tag })
                .collect(),
            constructor: None,
            extractors: None,
        }
    }

    /// Named-field descriptor mapping to and from `Value::Object`
    pub fn record<N: Into<String>>(fields: impl IntoIterator<Item = (N, TypeTag)>) -> Self {
        let fields: Vec<FieldDescriptor> = fields
            .into_iter()
            .map(|(name, tag)| FieldDescriptor {
                name: Some(name.into()),
                tag,
            })
            .collect();

        let extractors = fields
            .iter()
            .map(|f| object_extractor(f.name.clone().unwrap_or_default()))
            .collect();

        let names: Vec<String> = fields
            .iter()
            .map(|f| f.name.clone().unwrap_or_default())
            .collect();
        let constructor: Constructor = Arc::new(move |values: Vec<Value>| {
            Ok(Value::object(names.iter().cloned().zip(values)))
        });

        Self {
            fields,
            constructor: Some(constructor),
            extractors: Some(extractors),
        }
    }

    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    pub fn with_extractors(mut self, extractors: Vec<Extractor>) -> Self {
        self.extractors = Some(extractors);
        self
    }

    /// Drop the generated constructor so reads yield positional records
    pub fn without_constructor(mut self) -> Self {
        self.constructor = None;
        self
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_tags(&self) -> impl Iterator<Item = &TypeTag> {
        self.fields.iter().map(|f| &f.tag)
    }

    #[inline]
    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    #[inline]
    pub fn extractors(&self) -> Option<&[Extractor]> {
        self.extractors.as_deref()
    }

    /// Value of field `index`, via the extractor or positionally
    pub fn extract(&self, name: &str, index: usize, host: &Value) -> Result<Value> {
        if let Some(extractors) = &self.extractors {
            return extractors[index](host);
        }
        match host.positional() {
            Some(items) if items.len() == self.fields.len() => Ok(items[index].clone()),
            _ => Err(BridgeError::ValueShape {
                tag: name.to_string(),
                expected: "positional record with one entry per field",
                found: describe(host),
            }),
        }
    }

    /// Build the host value from decoded fields
    pub fn construct(&self, values: Vec<Value>) -> Result<Value> {
        match &self.constructor {
            Some(build) => build(values),
            None => Ok(Value::Record(values)),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("fields", &self.fields)
            .field("constructor", &self.constructor.is_some())
            .field("extractors", &self.extractors.as_ref().map(Vec::len))
            .finish()
    }
}

/// Extractor reading `name` from an object
pub fn object_extractor(name: impl Into<String>) -> Extractor {
    let name = name.into();
    Arc::new(move |host: &Value| match host {
        Value::Object(map) => map.get(&name).cloned().ok_or_else(|| BridgeError::ValueShape {
            tag: name.clone(),
            expected: "object with this field",
            found: describe(host),
        }),
        other => Err(BridgeError::ValueShape {
            tag: name.clone(),
            expected: "object",
            found: describe(other),
        }),
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Record(items) | Value::List(items) => format!("{} of {}", value.kind(), items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object {{{}}}", keys.join(", "))
        }
        other => other.kind().to_string(),
    }
}

/// Struct name → descriptor table
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    structs: HashMap<String, TypeDescriptor>,
    order: Vec<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a struct descriptor
    ///
    /// References to other structs are checked later by `check`/`validate`,
    /// so structs can be registered in any order.
    pub fn register(&mut self, name: impl Into<String>, descriptor: TypeDescriptor) -> Result<()> {
        let name = name.into();

        if self.structs.contains_key(&name) {
            return Err(ConfigError::DuplicateStruct { name }.into());
        }
        if descriptor.fields.is_empty() {
            return Err(ConfigError::EmptyStruct { name }.into());
        }
        if let Some((index, field)) = descriptor
            .fields
            .iter()
            .enumerate()
            .find(|(_, field)| holds_void(&field.tag))
        {
            let label = field.name.clone().unwrap_or_else(|| format!("#{}", index));
            return Err(ConfigError::BadTag {
                text: field.tag.to_string(),
                reason: format!("field {} of {} has no size or pointee", label, name),
            }
            .into());
        }
        if let Some(extractors) = &descriptor.extractors {
            if extractors.len() != descriptor.fields.len() {
                return Err(ConfigError::ExtractorCountMismatch {
                    name,
                    fields: descriptor.fields.len(),
                    extractors: extractors.len(),
                }
                .into());
            }
        }

        tracing::debug!(
            target: "registry",
            name = %name,
            fields = descriptor.fields.len(),
            "registered struct"
        );
        self.order.push(name.clone());
        self.structs.insert(name, descriptor);
        Ok(())
    }

    /// Look up a descriptor; unknown names are configuration errors
    pub fn resolve(&self, name: &str) -> Result<&TypeDescriptor> {
        self.structs.get(name).ok_or_else(|| {
            ConfigError::UnknownStruct {
                name: name.to_string(),
            }
            .into()
        })
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.structs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Verify every struct reachable from `tag` is registered and finite
    pub fn check(&self, tag: &TypeTag) -> Result<()> {
        let mut visited = HashSet::new();
        self.check_reachable(tag, &mut visited)?;
        // by-value recursion is found by the layout walk
        super::layout::size_of(self, tag).map(|_| ())
    }

    fn check_reachable<'a>(&'a self, tag: &'a TypeTag, visited: &mut HashSet<&'a str>) -> Result<()> {
        match tag {
            TypeTag::Void | TypeTag::Primitive(_) => Ok(()),
            TypeTag::Pointer(inner) => self.check_reachable(inner, visited),
            TypeTag::Struct(name) => {
                if !visited.insert(name.as_str()) {
                    return Ok(());
                }
                let descriptor = self.resolve(name)?;
                for field in &descriptor.fields {
                    self.check_reachable(&field.tag, visited)?;
                }
                Ok(())
            }
        }
    }

    /// Check every registered struct
    pub fn validate(&self) -> Result<()> {
        for name in &self.order {
            self.check(&TypeTag::Struct(name.clone()))?;
        }
        Ok(())
    }
}

/// `void` and pointers that end in `void` cannot be laid out or followed
fn holds_void(tag: &TypeTag) -> bool {
    match tag {
        TypeTag::Void => true,
        TypeTag::Pointer(inner) => holds_void(inner),
        TypeTag::Primitive(_) | TypeTag::Struct(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::types::Primitive;

    fn i32_tag() -> TypeTag {
        Primitive::I32.into()
    }

    #[test]
    fn register_and_resolve() {
        let mut reg = TypeRegistry::new();
        reg.register("Pair", TypeDescriptor::new([i32_tag(), i32_tag()])).unwrap();
        assert_eq!(reg.resolve("Pair").unwrap().fields().len(), 2);
        assert_eq!(reg.names().collect::<Vec<_>>(), ["Pair"]);
    }

    #[test]
    fn unknown_struct_is_a_config_error() {
        let reg = TypeRegistry::new();
        let err = reg.resolve("Piont").unwrap_err();
        assert_eq!(
            err,
            BridgeError::Config(ConfigError::UnknownStruct { name: "Piont".into() })
        );
    }

    #[test]
    fn void_fields_are_rejected_at_registration() {
        let mut reg = TypeRegistry::new();
        let err = reg
            .register("Hole", TypeDescriptor::new([i32_tag(), TypeTag::Void]))
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::Config(ConfigError::BadTag {
                text: "void".into(),
                reason: "field #1 of Hole has no size or pointee".into(),
            })
        );

        let err = reg
            .register(
                "Opaque",
                TypeDescriptor::record([("data", TypeTag::pointer(TypeTag::pointer(TypeTag::Void)))]),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(ConfigError::BadTag { .. })));
        assert!(reg.is_empty());
    }

    #[test]
    fn extractor_count_must_match() {
        let mut reg = TypeRegistry::new();
        let desc = TypeDescriptor::new([i32_tag(), i32_tag(), i32_tag()])
            .with_extractors(vec![object_extractor("a"), object_extractor("b")]);
        let err = reg.register("Triple", desc).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Config(ConfigError::ExtractorCountMismatch { fields: 3, extractors: 2, .. })
        ));
        assert!(!reg.contains("Triple"));
    }

    #[test]
    fn duplicates_and_empty_structs_are_rejected() {
        let mut reg = TypeRegistry::new();
        reg.register("A", TypeDescriptor::new([i32_tag()])).unwrap();
        assert!(reg.register("A", TypeDescriptor::new([i32_tag()])).is_err());
        assert!(reg.register("B", TypeDescriptor::new([])).is_err());
    }

    #[test]
    fn check_follows_pointers_and_fields() {
        let mut reg = TypeRegistry::new();
        reg.register(
            "Board",
            TypeDescriptor::new([TypeTag::pointer(TypeTag::structure("Tile")), i32_tag()]),
        )
        .unwrap();
        let err = reg.check(&TypeTag::structure("Board")).unwrap_err();
        assert!(matches!(err, BridgeError::Config(ConfigError::UnknownStruct { ref name }) if name == "Tile"));

        reg.register("Tile", TypeDescriptor::new([Primitive::U8.into()])).unwrap();
        reg.validate().unwrap();
    }

    #[test]
    fn self_reference_through_pointer_is_fine() {
        let mut reg = TypeRegistry::new();
        reg.register(
            "Node",
            TypeDescriptor::new([i32_tag(), TypeTag::pointer(TypeTag::structure("Node"))]),
        )
        .unwrap();
        reg.validate().unwrap();
    }

    #[test]
    fn record_descriptor_maps_objects() {
        let desc = TypeDescriptor::record([("x", TypeTag::from(Primitive::I16)), ("y", Primitive::I16.into())]);
        let host = Value::object([("x", Value::Int(3)), ("y", Value::Int(-4))]);
        assert_eq!(desc.extract("Point", 1, &host).unwrap(), Value::Int(-4));
        assert_eq!(
            desc.construct(vec![Value::Int(3), Value::Int(-4)]).unwrap(),
            host
        );
        assert!(desc.extract("Point", 0, &Value::Int(1)).is_err());
    }

    #[test]
    fn positional_descriptor_requires_matching_arity() {
        let desc = TypeDescriptor::new([i32_tag(), i32_tag()]);
        let ok = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(desc.extract("Pair", 0, &ok).unwrap(), Value::Int(1));
        let short = Value::Record(vec![Value::Int(1)]);
        assert!(desc.extract("Pair", 0, &short).is_err());
    }
}

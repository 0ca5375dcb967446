/*!
Named, typed properties and the schemas that group them.
*/

use crate::error::{SchemaError, ValidationError};
use crate::types::ValueType;
use crate::value::{Key, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A key paired with the type that governs its value
pub struct Property<T> {
    key: Key,
    ty: Arc<dyn ValueType<T>>,
    doc: Option<String>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            ty: Arc::clone(&self.ty),
            doc: self.doc.clone(),
        }
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("key", &self.key)
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

impl<T> Property<T> {
    /// Create a property from a key literal
    ///
    /// # Panics
    ///
    /// Panics if `key` is empty or contains a double quote. Property keys are fixed
    /// in code, so an invalid one is a defect in the caller.
    pub fn new<V>(key: &str, ty: V) -> Self
    where
        V: ValueType<T> + 'static,
    {
        match Key::new(key) {
            Ok(key) => Self::with_key(key, ty),
            Err(e) => panic!("invalid property key {key:?}: {e}"),
        }
    }

    pub fn with_key<V>(key: Key, ty: V) -> Self
    where
        V: ValueType<T> + 'static,
    {
        Self {
            key,
            ty: Arc::new(ty),
            doc: None,
        }
    }

    /// Attach human-readable documentation, rendered into template files
    pub fn with_doc<S: Into<String>>(mut self, doc: S) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn value_type(&self) -> &dyn ValueType<T> {
        self.ty.as_ref()
    }

    pub fn decode(&self, value: &Value) -> Result<T, ValidationError> {
        self.ty.decode(value)
    }

    pub fn encode(&self, value: &T) -> Value {
        self.ty.encode(value)
    }

    /// The type-erased part of this property stored in a [`Schema`]
    pub fn descriptor(&self) -> PropertyDescriptor {
        PropertyDescriptor {
            key: self.key.clone(),
            doc: self.doc.clone(),
        }
    }
}

/// Key and documentation of a schema member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub key: Key,
    pub doc: Option<String>,
}

/// An immutable set of uniquely keyed properties
#[derive(Debug, Clone)]
pub struct Schema {
    properties: Arc<BTreeMap<Key, PropertyDescriptor>>,
}

impl Schema {
    /// Build a schema, failing on the first repeated key
    pub fn new<I>(descriptors: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = PropertyDescriptor>,
    {
        let mut properties = BTreeMap::new();
        for descriptor in descriptors {
            if properties.contains_key(&descriptor.key) {
                return Err(SchemaError::DuplicateKey(descriptor.key));
            }
            properties.insert(descriptor.key.clone(), descriptor);
        }
        Ok(Self {
            properties: Arc::new(properties),
        })
    }

    /// A schema with no properties
    pub fn empty() -> Self {
        Self {
            properties: Arc::new(BTreeMap::new()),
        }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn descriptor(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    /// Descriptors ordered by key
    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Collects properties of different value types into a [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    descriptors: Vec<PropertyDescriptor>,
}

impl SchemaBuilder {
    pub fn property<T>(mut self, property: &Property<T>) -> Self {
        self.descriptors.push(property.descriptor());
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        Schema::new(self.descriptors)
    }
}

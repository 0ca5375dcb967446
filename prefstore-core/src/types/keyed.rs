//! Lookup of externally owned instances by string key.

use super::{wrong_kind, ValueType};
use crate::error::{SchemaError, ValidationError};
use crate::value::{Value, ValueKind};
use std::sync::Arc;

/// A bijection between string keys and a fixed set of shared instances
///
/// Used for settings that select one of several objects the application owns,
/// such as the available locales. Decoding is a lookup by key; encoding finds the
/// key of the very same instance (pointer identity, not structural equality).
pub struct KeyedSet<T> {
    entries: Vec<(String, Arc<T>)>,
}

impl<T> KeyedSet<T> {
    pub fn new<I, S>(entries: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, Arc<T>)>,
        S: Into<String>,
    {
        let mut collected: Vec<(String, Arc<T>)> = Vec::new();
        for (key, instance) in entries {
            let key = key.into();
            if collected.iter().any(|(existing, _)| *existing == key) {
                return Err(SchemaError::DuplicateInstanceKey(key));
            }
            if let Some((first, _)) = collected.iter().find(|(_, existing)| Arc::ptr_eq(existing, &instance)) {
                return Err(SchemaError::DuplicateInstance {
                    first: first.clone(),
                    second: key,
                });
            }
            collected.push((key, instance));
        }
        Ok(Self { entries: collected })
    }

    pub fn get(&self, key: &str) -> Option<&Arc<T>> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, instance)| instance)
    }

    pub fn key_of(&self, instance: &Arc<T>) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, candidate)| Arc::ptr_eq(candidate, instance))
            .map(|(key, _)| key.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> ValueType<Arc<T>> for KeyedSet<T>
where
    T: Send + Sync,
{
    fn decode(&self, value: &Value) -> Result<Arc<T>, ValidationError> {
        let key = value
            .as_str()
            .ok_or_else(|| wrong_kind(ValueKind::String, value))?;
        self.get(key)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownName(key.to_string()))
    }

    /// # Panics
    ///
    /// Panics if `value` is not one of the registered instances.
    fn encode(&self, value: &Arc<T>) -> Value {
        match self.key_of(value) {
            Some(key) => Value::from(key),
            None => panic!("instance is not registered in this keyed set"),
        }
    }
}

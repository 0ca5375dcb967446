//! Closed enumerations stored by name.

use super::{wrong_kind, ValueType};
use crate::error::{SchemaError, ValidationError};
use crate::value::{Value, ValueKind};
use std::fmt::Debug;

/// A bijection between a fixed set of names and enum values
///
/// ```rust
/// use prefstore_core::types::{Enumeration, ValueType};
/// use prefstore_core::Value;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Theme { Light, Dark }
///
/// let themes = Enumeration::new([("light", Theme::Light), ("dark", Theme::Dark)])?;
/// assert_eq!(themes.decode(&Value::from("dark")), Ok(Theme::Dark));
/// assert_eq!(themes.encode(&Theme::Light), Value::from("light"));
/// # Ok::<(), prefstore_core::error::SchemaError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Enumeration<T> {
    entries: Vec<(String, T)>,
}

impl<T> Enumeration<T>
where
    T: Copy + Eq + Debug,
{
    /// Build the enumeration, rejecting repeated names or values
    pub fn new<I, S>(entries: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
    {
        let mut collected: Vec<(String, T)> = Vec::new();
        for (name, value) in entries {
            let name = name.into();
            if collected.iter().any(|(existing, _)| *existing == name) {
                return Err(SchemaError::DuplicateEnumName(name));
            }
            if collected.iter().any(|(_, existing)| *existing == value) {
                return Err(SchemaError::DuplicateEnumValue(format!("{value:?}")));
            }
            collected.push((name, value));
        }
        Ok(Self { entries: collected })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// The registered name of `value`, if any
    pub fn name_of(&self, value: &T) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, candidate)| candidate == value)
            .map(|(name, _)| name.as_str())
    }
}

impl<T> ValueType<T> for Enumeration<T>
where
    T: Copy + Eq + Debug + Send + Sync,
{
    fn decode(&self, value: &Value) -> Result<T, ValidationError> {
        let name = value
            .as_str()
            .ok_or_else(|| wrong_kind(ValueKind::String, value))?;
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| ValidationError::UnknownName(name.to_string()))
    }

    /// # Panics
    ///
    /// Panics if `value` was not registered when the enumeration was built.
    fn encode(&self, value: &T) -> Value {
        match self.name_of(value) {
            Some(name) => Value::from(name),
            None => panic!("enumeration value {value:?} has no registered name"),
        }
    }
}

/*!
Bidirectional converters between [`Value`] and typed settings.

Every type implements [`ValueType`]: `decode` validates a value and converts it to
the target type (naming why it was rejected), `encode` converts back and always
succeeds for values the type accepts. Types compose by wrapping: a [`Derived`]
adds validation on top of a base type, [`ListOf`], [`MapOf`], [`Tuple2`] and
[`Tuple3`] lift element types into containers.

For any type `t` and any `x` that `t` accepts, `t.decode(&t.encode(&x))` yields `x`.
*/

pub mod composite;
pub mod derived;
pub mod enumeration;
pub mod keyed;
pub mod primitive;

pub use composite::{ListOf, MapOf, Tuple2, Tuple3};
pub use derived::{file_name, non_blank_string, ranged, Derived};
pub use enumeration::Enumeration;
pub use keyed::KeyedSet;
pub use primitive::{AnyType, BooleanType, HostInteger, IntegerType, StringType};

use crate::error::ValidationError;
use crate::value::Value;

/// A validator/converter between [`Value`] and `T`
pub trait ValueType<T>: Send + Sync {
    /// Convert a value, or explain why it is not acceptable
    fn decode(&self, value: &Value) -> Result<T, ValidationError>;

    /// Convert a typed value back into its on-disk representation
    fn encode(&self, value: &T) -> Value;

    /// Like [`decode`](Self::decode), discarding the reason for a rejection
    fn try_decode(&self, value: &Value) -> Option<T> {
        self.decode(value).ok()
    }
}

impl<T, V> ValueType<T> for Box<V>
where
    V: ValueType<T> + ?Sized,
{
    fn decode(&self, value: &Value) -> Result<T, ValidationError> {
        (**self).decode(value)
    }

    fn encode(&self, value: &T) -> Value {
        (**self).encode(value)
    }
}

impl<T, V> ValueType<T> for std::sync::Arc<V>
where
    V: ValueType<T> + ?Sized,
{
    fn decode(&self, value: &Value) -> Result<T, ValidationError> {
        (**self).decode(value)
    }

    fn encode(&self, value: &T) -> Value {
        (**self).encode(value)
    }
}

pub(crate) fn wrong_kind(expected: crate::value::ValueKind, value: &Value) -> ValidationError {
    ValidationError::WrongKind {
        expected,
        found: value.kind(),
    }
}

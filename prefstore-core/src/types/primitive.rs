//! Direct types matching a single value variant, and host primitive adapters.

use super::{wrong_kind, ValueType};
use crate::error::ValidationError;
use crate::value::{Value, ValueKind};
use num_bigint::BigInt;
use std::marker::PhantomData;

/// Accepts [`Value::Boolean`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanType;

impl ValueType<bool> for BooleanType {
    fn decode(&self, value: &Value) -> Result<bool, ValidationError> {
        value
            .as_bool()
            .ok_or_else(|| wrong_kind(ValueKind::Boolean, value))
    }

    fn encode(&self, value: &bool) -> Value {
        Value::Boolean(*value)
    }
}

/// Accepts [`Value::Integer`] at full precision
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerType;

impl ValueType<BigInt> for IntegerType {
    fn decode(&self, value: &Value) -> Result<BigInt, ValidationError> {
        value
            .as_integer()
            .cloned()
            .ok_or_else(|| wrong_kind(ValueKind::Integer, value))
    }

    fn encode(&self, value: &BigInt) -> Value {
        Value::Integer(value.clone())
    }
}

/// Accepts [`Value::String`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StringType;

impl ValueType<String> for StringType {
    fn decode(&self, value: &Value) -> Result<String, ValidationError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| wrong_kind(ValueKind::String, value))
    }

    fn encode(&self, value: &String) -> Value {
        Value::String(value.clone())
    }
}

/// Accepts any value unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyType;

impl ValueType<Value> for AnyType {
    fn decode(&self, value: &Value) -> Result<Value, ValidationError> {
        Ok(value.clone())
    }

    fn encode(&self, value: &Value) -> Value {
        value.clone()
    }
}

/// Bridges integer values to a host primitive such as `i32` or `u16`
///
/// Integers that do not fit the target are rejected with
/// [`ValidationError::Overflow`].
pub struct HostInteger<N> {
    _target: PhantomData<fn() -> N>,
}

impl<N> HostInteger<N> {
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<N> Default for HostInteger<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> Clone for HostInteger<N> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<N> std::fmt::Debug for HostInteger<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostInteger<{}>", std::any::type_name::<N>())
    }
}

impl<N> ValueType<N> for HostInteger<N>
where
    N: Copy + Into<BigInt>,
    for<'a> N: TryFrom<&'a BigInt>,
{
    fn decode(&self, value: &Value) -> Result<N, ValidationError> {
        let integer = value
            .as_integer()
            .ok_or_else(|| wrong_kind(ValueKind::Integer, value))?;
        N::try_from(integer).map_err(|_| ValidationError::Overflow {
            value: integer.to_string(),
            target: std::any::type_name::<N>(),
        })
    }

    fn encode(&self, value: &N) -> Value {
        Value::Integer((*value).into())
    }
}

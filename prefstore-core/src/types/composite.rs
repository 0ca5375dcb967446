//! Container types lifting element types into lists, maps and tuples.

use super::{wrong_kind, ValueType};
use crate::error::ValidationError;
use crate::value::{Key, Value, ValueKind, ValueMap};
use std::collections::BTreeMap;

/// A homogeneous list, every element decoded with the same type
#[derive(Debug, Clone, Default)]
pub struct ListOf<E> {
    element: E,
}

impl<E> ListOf<E> {
    pub fn new(element: E) -> Self {
        Self { element }
    }
}

impl<T, E> ValueType<Vec<T>> for ListOf<E>
where
    E: ValueType<T>,
{
    fn decode(&self, value: &Value) -> Result<Vec<T>, ValidationError> {
        let items = value
            .as_list()
            .ok_or_else(|| wrong_kind(ValueKind::List, value))?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.element.decode(item).map_err(|e| e.at(format!("[{index}]"))))
            .collect()
    }

    fn encode(&self, value: &Vec<T>) -> Value {
        Value::List(value.iter().map(|item| self.element.encode(item)).collect())
    }
}

/// A map value decoded into `Key -> T` by applying the entry type to every entry
#[derive(Debug, Clone, Default)]
pub struct MapOf<E> {
    entry: E,
}

impl<E> MapOf<E> {
    pub fn new(entry: E) -> Self {
        Self { entry }
    }
}

impl<T, E> ValueType<BTreeMap<Key, T>> for MapOf<E>
where
    E: ValueType<T>,
{
    fn decode(&self, value: &Value) -> Result<BTreeMap<Key, T>, ValidationError> {
        let entries = value
            .as_map()
            .ok_or_else(|| wrong_kind(ValueKind::Map, value))?;
        entries
            .iter()
            .map(|(key, item)| {
                self.entry
                    .decode(item)
                    .map(|decoded| (key.clone(), decoded))
                    .map_err(|e| e.at(key.as_str()))
            })
            .collect()
    }

    fn encode(&self, value: &BTreeMap<Key, T>) -> Value {
        let entries: ValueMap = value
            .iter()
            .map(|(key, item)| (key.clone(), self.entry.encode(item)))
            .collect();
        Value::Map(entries)
    }
}

fn fixed_list(value: &Value, arity: usize) -> Result<&[Value], ValidationError> {
    let items = value
        .as_list()
        .ok_or_else(|| wrong_kind(ValueKind::List, value))?;
    if items.len() != arity {
        return Err(ValidationError::WrongArity {
            expected: arity,
            found: items.len(),
        });
    }
    Ok(items)
}

/// A pair, stored as a two-element list
#[derive(Debug, Clone, Default)]
pub struct Tuple2<A, B> {
    first: A,
    second: B,
}

impl<A, B> Tuple2<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<TA, TB, A, B> ValueType<(TA, TB)> for Tuple2<A, B>
where
    A: ValueType<TA>,
    B: ValueType<TB>,
{
    fn decode(&self, value: &Value) -> Result<(TA, TB), ValidationError> {
        let items = fixed_list(value, 2)?;
        let a = self.first.decode(&items[0]).map_err(|e| e.at("[0]"))?;
        let b = self.second.decode(&items[1]).map_err(|e| e.at("[1]"))?;
        Ok((a, b))
    }

    fn encode(&self, value: &(TA, TB)) -> Value {
        Value::List(vec![self.first.encode(&value.0), self.second.encode(&value.1)])
    }
}

/// A triple, stored as a three-element list
#[derive(Debug, Clone, Default)]
pub struct Tuple3<A, B, C> {
    first: A,
    second: B,
    third: C,
}

impl<A, B, C> Tuple3<A, B, C> {
    pub fn new(first: A, second: B, third: C) -> Self {
        Self {
            first,
            second,
            third,
        }
    }
}

impl<TA, TB, TC, A, B, C> ValueType<(TA, TB, TC)> for Tuple3<A, B, C>
where
    A: ValueType<TA>,
    B: ValueType<TB>,
    C: ValueType<TC>,
{
    fn decode(&self, value: &Value) -> Result<(TA, TB, TC), ValidationError> {
        let items = fixed_list(value, 3)?;
        let a = self.first.decode(&items[0]).map_err(|e| e.at("[0]"))?;
        let b = self.second.decode(&items[1]).map_err(|e| e.at("[1]"))?;
        let c = self.third.decode(&items[2]).map_err(|e| e.at("[2]"))?;
        Ok((a, b, c))
    }

    fn encode(&self, value: &(TA, TB, TC)) -> Value {
        Value::List(vec![
            self.first.encode(&value.0),
            self.second.encode(&value.1),
            self.third.encode(&value.2),
        ])
    }
}

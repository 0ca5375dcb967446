//! Types built on top of a base type with extra validation or transformation.

use super::{HostInteger, StringType, ValueType};
use crate::error::ValidationError;
use crate::value::Value;
use num_bigint::BigInt;
use std::fmt::Display;
use std::marker::PhantomData;

type DecodeFn<TBase, T> = Box<dyn Fn(TBase) -> Result<T, ValidationError> + Send + Sync>;
type EncodeFn<TBase, T> = Box<dyn Fn(&T) -> TBase + Send + Sync>;

/// A base type plus a validating conversion from `TBase` to `T`
///
/// Decoding runs the base type first and then the conversion; encoding runs the
/// inverse conversion and hands the result to the base type.
pub struct Derived<B, TBase, T> {
    base: B,
    decode: DecodeFn<TBase, T>,
    encode: EncodeFn<TBase, T>,
    _types: PhantomData<fn(TBase) -> T>,
}

impl<B, TBase, T> Derived<B, TBase, T>
where
    B: ValueType<TBase>,
{
    pub fn new<D, E>(base: B, decode: D, encode: E) -> Self
    where
        D: Fn(TBase) -> Result<T, ValidationError> + Send + Sync + 'static,
        E: Fn(&T) -> TBase + Send + Sync + 'static,
    {
        Self {
            base,
            decode: Box::new(decode),
            encode: Box::new(encode),
            _types: PhantomData,
        }
    }
}

impl<B, T> Derived<B, T, T>
where
    B: ValueType<T>,
    T: Clone + 'static,
{
    /// Keep the base representation, only adding a check
    pub fn validated<C>(base: B, check: C) -> Self
    where
        C: Fn(&T) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        Self::new(base, move |value: T| check(&value).map(|_| value), T::clone)
    }
}

impl<B, TBase, T> ValueType<T> for Derived<B, TBase, T>
where
    B: ValueType<TBase>,
{
    fn decode(&self, value: &Value) -> Result<T, ValidationError> {
        let base = self.base.decode(value)?;
        (self.decode)(base)
    }

    fn encode(&self, value: &T) -> Value {
        self.base.encode(&(self.encode)(value))
    }
}

/// A string that is not empty after trimming; decodes to the trimmed text
pub fn non_blank_string() -> Derived<StringType, String, String> {
    Derived::new(
        StringType,
        |s: String| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(ValidationError::Blank)
            } else {
                Ok(trimmed.to_string())
            }
        },
        String::clone,
    )
}

/// A host integer constrained to `min..=max`
pub fn ranged<N>(min: N, max: N) -> Derived<HostInteger<N>, N, N>
where
    N: Copy + PartialOrd + Display + Into<BigInt> + Send + Sync + 'static,
    for<'a> N: TryFrom<&'a BigInt>,
{
    Derived::validated(HostInteger::new(), move |value: &N| {
        if *value < min || *value > max {
            Err(ValidationError::OutOfRange {
                value: value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            })
        } else {
            Ok(())
        }
    })
}

const RESERVED_FILE_NAME_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// A bare file name: no directory components, no reserved or control characters
pub fn file_name() -> Derived<StringType, String, String> {
    Derived::validated(StringType, |name: &String| {
        let reason = if name.trim().is_empty() {
            Some("name is blank")
        } else if name == "." || name == ".." {
            Some("name refers to a directory")
        } else if name.contains(RESERVED_FILE_NAME_CHARS) {
            Some("name contains a reserved character")
        } else if name.chars().any(char::is_control) {
            Some("name contains a control character")
        } else if name.ends_with(' ') || name.ends_with('.') {
            Some("name ends with a space or dot")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ValidationError::InvalidFileName {
                name: name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_non_blank_string_trims() {
        let ty = non_blank_string();
        assert_eq!(ty.decode(&Value::from("  Consolas ")), Ok("Consolas".to_string()));
        assert_eq!(ty.decode(&Value::from("   ")), Err(ValidationError::Blank));
        assert!(matches!(
            ty.decode(&Value::from(3)),
            Err(ValidationError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_ranged_names_bounds() {
        let ty = ranged(6u32, 72u32);
        assert_eq!(ty.decode(&Value::from(12)), Ok(12));
        assert_eq!(
            ty.decode(&Value::from(100)),
            Err(ValidationError::OutOfRange {
                value: "100".to_string(),
                min: "6".to_string(),
                max: "72".to_string(),
            })
        );
        // Below zero fails in the base type before the range check runs
        assert!(matches!(
            ty.decode(&Value::from(-5)),
            Err(ValidationError::Overflow { .. })
        ));
    }

    #[test]
    fn test_file_name_rules() {
        let ty = file_name();
        assert!(ty.decode(&Value::from("notes.pgn")).is_ok());

        for bad in ["", "..", "a/b", "c:\\x", "tab\there", "trailing."] {
            let err = ty.decode(&Value::from(bad)).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidFileName { .. }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_derived_transformation() {
        // Stores a percentage, exposes a fraction in thousandths
        let ty = Derived::new(
            HostInteger::<i64>::new(),
            |percent: i64| Ok(percent * 10),
            |permille: &i64| permille / 10,
        );
        assert_eq!(ty.decode(&Value::from(42)), Ok(420));
        assert_eq!(ty.encode(&420), Value::from(42));
    }

    proptest! {
        #[test]
        fn prop_ranged_roundtrip(x in -1000i32..=1000) {
            let ty = ranged(-1000i32, 1000);
            prop_assert_eq!(ty.decode(&ty.encode(&x)), Ok(x));
        }

        #[test]
        fn prop_non_blank_roundtrip(s in "[a-z][a-z ]{0,10}[a-z]") {
            let ty = non_blank_string();
            let decoded = ty.decode(&Value::from(s.as_str())).unwrap();
            prop_assert_eq!(ty.decode(&ty.encode(&decoded)), Ok(decoded));
        }
    }
}

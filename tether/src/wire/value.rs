//! Self-describing wire values.
//!
//! [`Value`] is the unit of data exchanged between client and worker. It is
//! deliberately closed: every case has a stable binary encoding, so any
//! `Value` that exists can cross the wire. Live objects never appear here —
//! they travel as handles (see [`Handle`]) issued by the worker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::envelope::Handle;

/// A dynamically typed value with a stable wire encoding.
///
/// Composite cases nest arbitrarily. `Map` keys are strings and iterate in
/// sorted order, so two structurally equal maps encode to the same bytes.
///
/// Note on floats: `Value` derives `PartialEq`, so `Float(f64::NAN)` is not
/// equal to itself. The round-trip guarantee is about encoding, not NaN
/// semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value (also the decoded form of an empty payload).
    Unit,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// String-keyed mapping.
    Map(BTreeMap<String, Value>),
    /// Reference to a live worker-side object.
    ///
    /// Produced when a proxy is passed as an argument: the proxy's handle is
    /// sent instead of a copy of the object it stands for.
    Handle(Handle),
}

impl Value {
    /// Returns a short label for this value's case, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Handle(_) => "handle",
        }
    }

    /// Returns the integer if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float if this is a `Float`.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the elements if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the mapping if this is a `Map`.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the handle if this is a `Handle`.
    #[must_use]
    pub const fn as_handle(&self) -> Option<Handle> {
        match self {
            Self::Handle(h) => Some(*h),
            _ => None,
        }
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Self::Handle(h)
    }
}

/// Error converting a [`Value`] into a concrete Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The value's case does not match the requested type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// What the conversion wanted.
        expected: &'static str,
        /// What the value actually was.
        found: &'static str,
    },
    /// A map was missing a required field.
    #[error("missing field `{field}`")]
    MissingField {
        /// Name of the absent field.
        field: String,
    },
}

/// Infallible conversion into a [`Value`].
///
/// Implemented for the primitive and composite types that map directly onto
/// `Value` cases. Model structs get an implementation via
/// `#[derive(ToValue)]` from `tether-derive`, which encodes named fields as
/// a `Map`.
pub trait ToValue {
    /// Converts `self` into a wire value.
    fn to_value(&self) -> Value;
}

/// Conversion out of a [`Value`], failing on shape mismatch.
///
/// The counterpart of [`ToValue`]; `#[derive(FromValue)]` generates the
/// field-by-field decoding for model structs.
pub trait FromValue: Sized {
    /// Converts a wire value into `Self`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if the value's shape does not match.
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_bool().ok_or(ValueError::TypeMismatch {
            expected: "bool",
            found: value.kind(),
        })
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_int().ok_or(ValueError::TypeMismatch {
            expected: "int",
            found: value.kind(),
        })
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_float().ok_or(ValueError::TypeMismatch {
            expected: "float",
            found: value.kind(),
        })
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or(ValueError::TypeMismatch {
                expected: "str",
                found: value.kind(),
            })
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            other => Err(ValueError::TypeMismatch {
                expected: "list",
                found: other.kind(),
            }),
        }
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), T::from_value(v)?)))
                .collect(),
            other => Err(ValueError::TypeMismatch {
                expected: "map",
                found: other.kind(),
            }),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Unit,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Unit => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels() {
        assert_eq!(Value::Unit.kind(), "unit");
        assert_eq!(Value::Int(1).kind(), "int");
        assert_eq!(Value::List(vec![]).kind(), "list");
        assert_eq!(Value::Handle(Handle::from_raw(7)).kind(), "handle");
    }

    #[test]
    fn accessors_match_case() {
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Int(42).as_str(), None);
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(
            Value::Handle(Handle::from_raw(3)).as_handle(),
            Some(Handle::from_raw(3))
        );
    }

    #[test]
    fn from_impls_build_expected_cases() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(7i32), Value::Int(7));
        assert_eq!(Value::from(2.5), Value::Float(2.5));
        assert_eq!(
            Value::from(vec![Value::Int(1), Value::Int(2)]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn primitive_round_trip_through_traits() {
        let v = 42i64.to_value();
        assert_eq!(i64::from_value(&v), Ok(42));
        assert_eq!(
            bool::from_value(&v),
            Err(ValueError::TypeMismatch {
                expected: "bool",
                found: "int"
            })
        );
    }

    #[test]
    fn vec_round_trip_through_traits() {
        let v = vec![1i64, 2, 3].to_value();
        assert_eq!(Vec::<i64>::from_value(&v), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn option_uses_unit_for_none() {
        assert_eq!(Option::<i64>::to_value(&None), Value::Unit);
        assert_eq!(Option::<i64>::from_value(&Value::Unit), Ok(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(9)), Ok(Some(9)));
    }
}

//! Capability surface for hosted objects.
//!
//! The worker hosts one root object and exposes it through the narrow
//! interface defined here: named attribute reads, named method calls, and
//! optional iteration. Implementations are an explicit registration table —
//! a `match` over the names the object answers to — so nothing is resolved
//! by reflection at runtime.
//!
//! Everything here is single-threaded: objects are owned by the worker's
//! dispatch loop and are never touched from another thread.

use std::fmt;

use thiserror::Error;

use crate::wire::codec::SerializationFailure;
use crate::wire::value::{FromValue, Value};

/// Iterator state produced by [`HostObject::iterate`].
///
/// Must own its data (`'static`): the iterator outlives the call that
/// created it, bound to a handle until released or exhausted.
pub type ObjectIter = Box<dyn Iterator<Item = ObjectValue>>;

/// The result of an attribute read, method call, or iteration step.
///
/// Plain data crosses the wire by value; a live object is subject to the
/// dispatcher's value-vs-proxy decision (snapshot if it can, handle if not).
pub enum ObjectValue {
    /// Plain data.
    Value(Value),
    /// A live object.
    Object(Box<dyn HostObject>),
}

impl ObjectValue {
    /// Wraps plain data.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Wraps a live object.
    pub fn object(object: impl HostObject + 'static) -> Self {
        Self::Object(Box::new(object))
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Object(obj) => f.debug_tuple("Object").field(&obj.type_name()).finish(),
        }
    }
}

/// Failure reported by a hosted object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// No attribute with this name.
    #[error("`{type_name}` has no attribute `{name}`")]
    AttributeNotFound {
        /// The target's declared type name.
        type_name: String,
        /// The requested attribute.
        name: String,
    },
    /// No method with this name.
    #[error("`{type_name}` has no method `{name}`")]
    MethodNotFound {
        /// The target's declared type name.
        type_name: String,
        /// The requested method.
        name: String,
    },
    /// The object raised an error of its own.
    #[error("{kind}: {message}")]
    Raised {
        /// Kind name of the original error, as the object declares it.
        kind: String,
        /// Original error message, verbatim.
        message: String,
    },
    /// The object does not support iteration.
    #[error("`{type_name}` is not iterable")]
    NotIterable {
        /// The target's declared type name.
        type_name: String,
    },
}

impl ObjectError {
    /// Builds a `Raised` error with the given kind and message.
    #[must_use]
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// A live object the worker can expose remotely.
///
/// `get_attr` takes `&self` (reads must not mutate), `call_method` takes
/// `&mut self` (methods may). Both return [`ObjectValue`]: plain data where
/// a copy is the right answer, [`ObjectValue::Object`] where the result is
/// itself a live object.
///
/// `snapshot` is the opt-in to by-value transfer. The default refuses, which
/// makes the object proxy-only — the worker hands out a handle instead. An
/// object whose state is plain data can override it (typically with
/// [`ToValue`](crate::wire::ToValue)) to be copied to the client instead.
pub trait HostObject {
    /// The object's declared type name, used as the proxy type label.
    fn type_name(&self) -> &str;

    /// Reads the named attribute.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::AttributeNotFound`] for unknown names, or any
    /// error the attribute getter itself raises.
    fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError>;

    /// Invokes the named method.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::MethodNotFound`] for unknown names, or
    /// [`ObjectError::Raised`] if the method fails.
    fn call_method(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<ObjectValue, ObjectError>;

    /// Produces an iterator over the object's contents.
    ///
    /// # Errors
    ///
    /// The default declares the object non-iterable.
    fn iterate(&self) -> Result<ObjectIter, ObjectError> {
        Err(ObjectError::NotIterable {
            type_name: self.type_name().to_owned(),
        })
    }

    /// Attempts to capture the object as a plain wire value.
    ///
    /// # Errors
    ///
    /// The default refuses with [`SerializationFailure::Unsupported`],
    /// forcing the proxy fallback.
    fn snapshot(&self) -> Result<Value, SerializationFailure> {
        Err(SerializationFailure::unsupported(self.type_name()))
    }
}

/// Extracts a typed positional argument.
///
/// Convenience for `call_method` implementations: indexes into `args` and
/// converts, mapping both failure modes onto [`ObjectError::Raised`] with
/// kind `InvalidArguments` so they surface to the client as invocation
/// errors.
///
/// # Errors
///
/// Returns [`ObjectError::Raised`] if the argument is missing or has the
/// wrong shape.
pub fn arg<T: FromValue>(args: &[Value], index: usize, method: &str) -> Result<T, ObjectError> {
    let value = args.get(index).ok_or_else(|| {
        ObjectError::raised(
            "InvalidArguments",
            format!("`{method}` is missing argument {index}"),
        )
    })?;
    T::from_value(value).map_err(|err| {
        ObjectError::raised(
            "InvalidArguments",
            format!("`{method}` argument {index}: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        left: i64,
        right: i64,
    }

    impl HostObject for Pair {
        fn type_name(&self) -> &str {
            "Pair"
        }

        fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError> {
            match name {
                "left" => Ok(ObjectValue::value(self.left)),
                "right" => Ok(ObjectValue::value(self.right)),
                _ => Err(ObjectError::AttributeNotFound {
                    type_name: self.type_name().to_owned(),
                    name: name.to_owned(),
                }),
            }
        }

        fn call_method(
            &mut self,
            name: &str,
            args: &[Value],
            _kwargs: &[(String, Value)],
        ) -> Result<ObjectValue, ObjectError> {
            match name {
                "shift" => {
                    let by: i64 = arg(args, 0, "shift")?;
                    self.left += by;
                    self.right += by;
                    Ok(ObjectValue::value(()))
                }
                _ => Err(ObjectError::MethodNotFound {
                    type_name: self.type_name().to_owned(),
                    name: name.to_owned(),
                }),
            }
        }
    }

    #[test]
    fn attribute_table_resolves_names() {
        let pair = Pair { left: 1, right: 2 };
        assert!(matches!(
            pair.get_attr("left"),
            Ok(ObjectValue::Value(Value::Int(1)))
        ));
        assert!(matches!(
            pair.get_attr("middle"),
            Err(ObjectError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn methods_mutate_through_calls() {
        let mut pair = Pair { left: 1, right: 2 };
        pair.call_method("shift", &[Value::Int(10)], &[]).unwrap();
        assert!(matches!(
            pair.get_attr("right"),
            Ok(ObjectValue::Value(Value::Int(12)))
        ));
    }

    #[test]
    fn arg_helper_reports_missing_and_mismatched() {
        let err = arg::<i64>(&[], 0, "shift").unwrap_err();
        assert!(matches!(err, ObjectError::Raised { ref kind, .. } if kind == "InvalidArguments"));

        let err = arg::<i64>(&[Value::Str("no".into())], 0, "shift").unwrap_err();
        assert!(matches!(err, ObjectError::Raised { ref kind, .. } if kind == "InvalidArguments"));
    }

    #[test]
    fn defaults_refuse_iteration_and_snapshot() {
        let pair = Pair { left: 0, right: 0 };
        assert!(matches!(
            pair.iterate(),
            Err(ObjectError::NotIterable { .. })
        ));
        assert!(pair.snapshot().is_err());
    }
}

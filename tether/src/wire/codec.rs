//! Binary codec for wire values and envelopes.
//!
//! Encoding is postcard throughout. The important contract is that failure
//! is an ordinary outcome: an object that refuses to be captured as a
//! [`Value`] reports [`SerializationFailure::Unsupported`], and the caller
//! (the dispatcher) falls back to returning a handle instead of crashing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::wire::value::Value;

/// Why a value could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum SerializationFailure {
    /// The object declares itself non-serializable.
    ///
    /// This is the explicit form of "cannot be copied": no snapshot exists,
    /// so the dispatcher must return the object by reference.
    #[error("`{type_name}` does not support serialization")]
    Unsupported {
        /// Declared type name of the refusing object.
        type_name: String,
    },
    /// The binary codec itself failed.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),
}

impl SerializationFailure {
    /// Builds the `Unsupported` case for the given type name.
    #[must_use]
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::Unsupported {
            type_name: type_name.into(),
        }
    }
}

/// Encodes a value to bytes.
///
/// # Errors
///
/// Returns [`SerializationFailure::Codec`] if postcard rejects the value.
pub fn encode(value: &Value) -> Result<Vec<u8>, SerializationFailure> {
    Ok(postcard::to_allocvec(value)?)
}

/// Decodes a value from bytes.
///
/// An empty payload decodes to [`Value::Unit`]; it is the wire form of "no
/// result" (used by `release` acknowledgments).
///
/// # Errors
///
/// Returns [`SerializationFailure::Codec`] on malformed input.
pub fn decode(bytes: &[u8]) -> Result<Value, SerializationFailure> {
    if bytes.is_empty() {
        return Ok(Value::Unit);
    }
    Ok(postcard::from_bytes(bytes)?)
}

/// Encodes a request or response envelope.
///
/// # Errors
///
/// Returns [`SerializationFailure::Codec`] if postcard rejects the envelope.
pub(crate) fn encode_envelope<T: Serialize>(envelope: &T) -> Result<Vec<u8>, SerializationFailure> {
    Ok(postcard::to_allocvec(envelope)?)
}

/// Decodes a request or response envelope.
///
/// # Errors
///
/// Returns [`SerializationFailure::Codec`] on malformed input.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, SerializationFailure> {
    Ok(postcard::from_bytes(bytes)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::wire::envelope::Handle;

    fn round_trip(value: Value) {
        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn primitives_round_trip() {
        round_trip(Value::Unit);
        round_trip(Value::Bool(true));
        round_trip(Value::Int(-40));
        round_trip(Value::Float(6.25));
        round_trip(Value::Str("remote".into()));
        round_trip(Value::Bytes(vec![0, 1, 2, 0xff]));
    }

    #[test]
    fn composites_round_trip() {
        round_trip(Value::List(vec![
            Value::Int(1),
            Value::Str("two".into()),
            Value::List(vec![Value::Bool(false)]),
        ]));

        let mut map = BTreeMap::new();
        map.insert("x".to_owned(), Value::Int(3));
        map.insert("tags".to_owned(), Value::List(vec![Value::Str("a".into())]));
        round_trip(Value::Map(map));
    }

    #[test]
    fn handles_round_trip() {
        round_trip(Value::Handle(Handle::from_raw(u64::MAX)));
    }

    #[test]
    fn empty_payload_is_unit() {
        assert_eq!(decode(&[]).unwrap(), Value::Unit);
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let bytes = encode(&Value::Str("truncate me".into())).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn unsupported_carries_type_name() {
        let err = SerializationFailure::unsupported("Vault");
        assert_eq!(err.to_string(), "`Vault` does not support serialization");
    }
}

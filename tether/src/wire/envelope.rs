//! Request/response envelopes for the client-worker protocol.
//!
//! One request produces exactly one response; the transport enforces the
//! alternation, these types define what travels in each direction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::wire::codec::{self, SerializationFailure};
use crate::wire::value::Value;

/// Opaque identifier for a live object held by the worker.
///
/// Handles are issued monotonically for the worker's lifetime and never
/// reused, so a stale handle can only miss — it can never silently denote a
/// different object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Creates a handle from a raw identifier.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a request operates on: the hosted root object or a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// The object passed to `Worker::run`.
    Root,
    /// A previously issued handle.
    Handle(Handle),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Handle(h) => write!(f, "{h}"),
        }
    }
}

/// The operation a request asks the worker to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Read an attribute of the target.
    GetAttr {
        /// Attribute name.
        name: String,
    },
    /// Invoke a method on the target.
    CallMethod {
        /// Method name.
        name: String,
        /// Positional arguments.
        args: Vec<Value>,
        /// Keyword arguments, in call order.
        kwargs: Vec<(String, Value)>,
    },
    /// Obtain an iterator over the target and bind it to a fresh handle.
    IterStart,
    /// Advance the iterator bound to the target handle.
    IterNext,
    /// Drop the target handle. Always succeeds, even for unknown handles.
    Release,
}

impl Op {
    /// Returns a short label for this operation, for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::GetAttr { .. } => "get_attr",
            Self::CallMethod { .. } => "call_method",
            Self::IterStart => "iter_start",
            Self::IterNext => "iter_next",
            Self::Release => "release",
        }
    }
}

/// A single request from client to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// What the operation applies to.
    pub target: Target,
    /// The operation itself.
    pub op: Op,
}

impl Request {
    /// Encodes the request for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationFailure`] if the codec rejects the envelope.
    pub fn encode(&self) -> Result<Vec<u8>, SerializationFailure> {
        codec::encode_envelope(self)
    }

    /// Decodes a request from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationFailure`] on malformed input.
    pub fn decode(bytes: &[u8]) -> Result<Self, SerializationFailure> {
        codec::decode_envelope(bytes)
    }
}

/// Error categories surfaced to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The request targeted a handle the worker does not know.
    UnknownHandle,
    /// The target has no attribute with the requested name.
    AttributeNotFound,
    /// The target has no method with the requested name.
    MethodNotFound,
    /// The invoked method (or attribute getter) failed.
    Invocation {
        /// The original error's kind name, as declared by the hosted object.
        kind: String,
    },
    /// Encoding or decoding failed where it must not.
    Serialization,
    /// The target does not support iteration.
    NotIterable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandle => write!(f, "unknown handle"),
            Self::AttributeNotFound => write!(f, "attribute not found"),
            Self::MethodNotFound => write!(f, "method not found"),
            Self::Invocation { kind } => write!(f, "invocation error ({kind})"),
            Self::Serialization => write!(f, "serialization error"),
            Self::NotIterable => write!(f, "not iterable"),
        }
    }
}

/// A single response from worker to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// The result, returned by value.
    ///
    /// `bytes` is the codec-encoded [`Value`]; an empty payload stands for
    /// the unit value (the canonical `release` acknowledgment).
    Value {
        /// Separately encoded result value.
        bytes: Vec<u8>,
    },
    /// The result, returned by reference.
    Proxy {
        /// Handle now denoting the result object.
        handle: Handle,
        /// The result's declared type name.
        type_name: String,
    },
    /// End of an iteration sequence. Not an error.
    Stop,
    /// The request failed.
    Error {
        /// Category the client can branch on.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl Response {
    /// Encodes the response for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationFailure`] if the codec rejects the envelope.
    pub fn encode(&self) -> Result<Vec<u8>, SerializationFailure> {
        codec::encode_envelope(self)
    }

    /// Decodes a response from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationFailure`] on malformed input.
    pub fn decode(bytes: &[u8]) -> Result<Self, SerializationFailure> {
        codec::decode_envelope(bytes)
    }
}

//! Wire model: values, envelopes, and the binary codec.

pub mod codec;
pub mod envelope;
pub mod value;

pub use codec::{SerializationFailure, decode, encode};
pub use envelope::{ErrorKind, Handle, Op, Request, Response, Target};
pub use value::{FromValue, ToValue, Value, ValueError};

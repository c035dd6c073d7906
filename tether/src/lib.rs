//! Remote object proxy between a worker process and a client over
//! message IPC.
//!
//! A worker hosts one object behind the [`HostObject`] capability surface
//! and serves it over a lock-step message channel; a client obtains a
//! [`RemoteProxy`] for the root object and operates on it one round trip at
//! a time. Results come back by value when they encode, by handle when they
//! refuse to — the same object stays reachable either way.

// Allow the crate to reference itself as ::tether for derive macro usage
extern crate self as tether;

pub mod client;
pub mod object;
pub mod trace;
pub mod transport;
pub mod wire;
pub mod worker;

#[doc(inline)]
pub use tether_derive::{FromValue, ToValue};

pub use client::{Client, ClientConfig, ProxyIter, RemoteError, RemoteProxy, Returned};
pub use object::{HostObject, ObjectError, ObjectIter, ObjectValue};
pub use trace::init_tracing;
pub use transport::{Endpoint, Timeout};
pub use wire::{ErrorKind, FromValue, Handle, ToValue, Value};
pub use worker::{Worker, WorkerConfig, WorkerError};

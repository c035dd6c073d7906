//! Remote proxies: client-side stand-ins for worker-held objects.
//!
//! A proxy is nothing but the shared connection plus the target it stands
//! for; all state lives in the worker. There is no attribute interception
//! in Rust, so the surface is an explicit call-builder API: `get_attr`,
//! `call`, `call_kw`, `iter`. The protocol underneath is identical either
//! way.

use std::fmt;
use std::sync::Arc;

use crate::client::{Connection, RemoteError};
use crate::wire::codec;
use crate::wire::envelope::{Handle, Op, Request, Response, Target};
use crate::wire::value::{FromValue, Value};

/// What a remote operation handed back: a decoded value or another proxy.
pub enum Returned {
    /// The result, copied by value.
    Value(Value),
    /// The result, referenced through a fresh proxy.
    Proxy(RemoteProxy),
}

impl Returned {
    /// Whether the result came back by reference.
    #[must_use]
    pub const fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }

    /// Unwraps a by-value result.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Protocol`] if the result was a proxy.
    pub fn into_value(self) -> Result<Value, RemoteError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Proxy(proxy) => Err(RemoteError::Protocol(format!(
                "expected a value, got a proxy to `{}`",
                proxy.type_label().unwrap_or("unknown")
            ))),
        }
    }

    /// Unwraps a by-reference result.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Protocol`] if the result was a plain value.
    pub fn into_proxy(self) -> Result<RemoteProxy, RemoteError> {
        match self {
            Self::Proxy(proxy) => Ok(proxy),
            Self::Value(value) => Err(RemoteError::Protocol(format!(
                "expected a proxy, got a {} value",
                value.kind()
            ))),
        }
    }

    /// Converts a by-value result into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Protocol`] for proxy results and
    /// [`RemoteError::Convert`] on shape mismatch.
    pub fn decode<T: FromValue>(self) -> Result<T, RemoteError> {
        let value = self.into_value()?;
        Ok(T::from_value(&value)?)
    }
}

impl fmt::Debug for Returned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Proxy(p) => f.debug_tuple("Proxy").field(p).finish(),
        }
    }
}

/// Client-side stand-in for an object held by the worker.
///
/// Identity is `(connection, target)`: two proxies are equal iff they go
/// through the same connection to the same target. Dropping a handle proxy
/// sends a best-effort `release`; a worker that is already gone just loses
/// the courtesy, nothing breaks.
pub struct RemoteProxy {
    conn: Arc<Connection>,
    target: Target,
    type_label: Option<String>,
    released: bool,
}

impl RemoteProxy {
    pub(crate) fn root(conn: Arc<Connection>) -> Self {
        Self {
            conn,
            target: Target::Root,
            type_label: None,
            released: false,
        }
    }

    pub(crate) fn from_handle(conn: Arc<Connection>, handle: Handle, type_name: String) -> Self {
        Self {
            conn,
            target: Target::Handle(handle),
            type_label: Some(type_name),
            released: false,
        }
    }

    /// The target this proxy stands for.
    #[must_use]
    pub const fn target(&self) -> Target {
        self.target
    }

    /// The handle, if this proxy stands for one (`None` for the root).
    #[must_use]
    pub const fn handle(&self) -> Option<Handle> {
        match self.target {
            Target::Handle(handle) => Some(handle),
            Target::Root => None,
        }
    }

    /// The worker-reported type label, if the proxy came from an
    /// `ok_proxy` response.
    #[must_use]
    pub fn type_label(&self) -> Option<&str> {
        self.type_label.as_deref()
    }

    /// Reads an attribute of the remote object.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Remote`] re-raising any worker-side failure,
    /// or a transport/codec error.
    pub fn get_attr(&self, name: &str) -> Result<Returned, RemoteError> {
        self.request(Op::GetAttr {
            name: name.to_owned(),
        })
    }

    /// Invokes a method on the remote object with positional arguments.
    ///
    /// Pass another proxy by reference via [`RemoteProxy::handle`] wrapped
    /// in [`Value::Handle`] — proxies are never re-serialized.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Remote`] re-raising any worker-side failure,
    /// or a transport/codec error.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Returned, RemoteError> {
        self.call_kw(name, args, Vec::new())
    }

    /// Invokes a method with positional and keyword arguments.
    ///
    /// # Errors
    ///
    /// Same as [`RemoteProxy::call`].
    pub fn call_kw(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Returned, RemoteError> {
        self.request(Op::CallMethod {
            name: name.to_owned(),
            args,
            kwargs,
        })
    }

    /// Starts iterating the remote object.
    ///
    /// The sequence is lazy, finite, and one-pass: each item is one round
    /// trip, and the iterator cannot be restarted — call `iter` again for a
    /// fresh pass.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Remote`] if the target is not iterable, or a
    /// transport/codec error.
    pub fn iter(&self) -> Result<ProxyIter, RemoteError> {
        let response = self.conn.round_trip(&Request {
            target: self.target,
            op: Op::IterStart,
        })?;
        match response {
            Response::Proxy { handle, .. } => Ok(ProxyIter {
                conn: Arc::clone(&self.conn),
                handle,
                done: false,
            }),
            Response::Error { kind, message } => Err(RemoteError::Remote { kind, message }),
            other => Err(RemoteError::Protocol(format!(
                "iter_start answered with {other:?}"
            ))),
        }
    }

    /// Releases the worker-side handle now, instead of at drop time.
    ///
    /// Releasing is idempotent on the worker: a handle that is already gone
    /// is acknowledged all the same. The root proxy has nothing to release.
    ///
    /// # Errors
    ///
    /// Returns a transport/codec error if the acknowledgment round trip
    /// fails (the worker may still have processed the release).
    pub fn release(mut self) -> Result<(), RemoteError> {
        self.released = true;
        match self.target {
            Target::Root => Ok(()),
            Target::Handle(_) => {
                self.conn
                    .round_trip(&Request {
                        target: self.target,
                        op: Op::Release,
                    })
                    .map(|_| ())
            }
        }
    }

    fn request(&self, op: Op) -> Result<Returned, RemoteError> {
        let response = self.conn.round_trip(&Request {
            target: self.target,
            op,
        })?;
        unwrap_response(&self.conn, response)
    }
}

/// Turns a response into a [`Returned`], minting a proxy for handles.
fn unwrap_response(
    conn: &Arc<Connection>,
    response: Response,
) -> Result<Returned, RemoteError> {
    match response {
        Response::Value { bytes } => Ok(Returned::Value(codec::decode(&bytes)?)),
        Response::Proxy { handle, type_name } => Ok(Returned::Proxy(RemoteProxy::from_handle(
            Arc::clone(conn),
            handle,
            type_name,
        ))),
        Response::Stop => Err(RemoteError::Protocol(
            "end-of-iteration outside an iteration".into(),
        )),
        Response::Error { kind, message } => Err(RemoteError::Remote { kind, message }),
    }
}

impl PartialEq for RemoteProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn) && self.target == other.target
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("target", &self.target)
            .field("type_label", &self.type_label)
            .finish_non_exhaustive()
    }
}

impl Drop for RemoteProxy {
    fn drop(&mut self) {
        if !self.released && matches!(self.target, Target::Handle(_)) {
            let _ = self.conn.round_trip(&Request {
                target: self.target,
                op: Op::Release,
            });
        }
    }
}

/// Lazy one-pass iterator over a remote sequence.
///
/// Yields one decoded item per round trip until the worker answers
/// `ok_stop`, then fuses. The iterator's worker-side handle is released on
/// drop (best effort).
pub struct ProxyIter {
    conn: Arc<Connection>,
    handle: Handle,
    done: bool,
}

impl fmt::Debug for ProxyIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyIter")
            .field("handle", &self.handle)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Iterator for ProxyIter {
    type Item = Result<Returned, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let response = self.conn.round_trip(&Request {
            target: Target::Handle(self.handle),
            op: Op::IterNext,
        });
        match response {
            Ok(Response::Stop) => {
                self.done = true;
                None
            }
            Ok(other) => match unwrap_response(&self.conn, other) {
                Ok(item) => Some(Ok(item)),
                Err(err) => {
                    self.done = true;
                    Some(Err(err))
                }
            },
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl Drop for ProxyIter {
    fn drop(&mut self) {
        let _ = self.conn.round_trip(&Request {
            target: Target::Handle(self.handle),
            op: Op::Release,
        });
    }
}

//! Client side: connection handling and the remote proxy surface.
//!
//! A [`Client`] owns one lock-step connection to a worker. Proxies obtained
//! from it all share that connection behind a mutex, so any number of
//! proxies (or threads) still produce one round trip at a time — a request
//! issued while another is in flight blocks until the reply completes.

pub mod proxy;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::trace::debug;
use crate::transport::channel::DEFAULT_MAX_FRAME_LEN;
use crate::transport::{Endpoint, EndpointError, MessageChannel, Timeout, TransportError};
use crate::wire::envelope::{ErrorKind, Request, Response};
use crate::wire::{SerializationFailure, ValueError};

pub use proxy::{ProxyIter, RemoteProxy, Returned};

/// Tunables for a client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for the worker to appear at connect time.
    pub connect_timeout: Timeout,
    /// Bound applied to each send/receive. `Infinite` by default: the
    /// protocol has no mid-request cancellation, and a timed-out channel is
    /// unusable anyway.
    pub io_timeout: Timeout,
    /// Upper bound for a single request or response message.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Timeout::Duration(Duration::from_secs(5)),
            io_timeout: Timeout::Infinite,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Errors surfaced by client-side operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The supplied address did not parse.
    #[error("invalid address: {0}")]
    Address(#[from] EndpointError),
    /// The channel failed. Recoverable only by reconnecting — the same
    /// in-flight request must not be retried on this channel.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// Client-side encoding or decoding failed.
    #[error("codec failure: {0}")]
    Codec(#[from] SerializationFailure),
    /// A received value did not convert to the requested type.
    #[error("conversion failure: {0}")]
    Convert(#[from] ValueError),
    /// The worker answered with an error; this is the remote error,
    /// re-raised locally with its original kind and message.
    #[error("{kind}: {message}")]
    Remote {
        /// Category to branch on, including the original error kind name
        /// for invocation errors.
        kind: ErrorKind,
        /// Original message, verbatim.
        message: String,
    },
    /// The worker answered with something the protocol does not allow here.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// The remote error kind, if this is a re-raised worker error.
    #[must_use]
    pub const fn remote_kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Shared state behind every proxy: the channel and its lock.
pub(crate) struct Connection {
    channel: Mutex<MessageChannel>,
}

impl Connection {
    /// Performs one strict request/response exchange.
    pub(crate) fn round_trip(&self, request: &Request) -> Result<Response, RemoteError> {
        let bytes = request.encode()?;
        let mut channel = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        channel.send(&bytes)?;
        let reply = channel.recv()?;
        Ok(Response::decode(&reply)?)
    }
}

/// A connected client.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Connects to the worker at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Address`] for an unparsable connection string
    /// and [`RemoteError::Transport`] if the worker cannot be reached within
    /// the configured connect timeout.
    pub fn connect(address: &str, config: ClientConfig) -> Result<Self, RemoteError> {
        let endpoint: Endpoint = address.parse()?;
        let channel =
            MessageChannel::connect(&endpoint, config.connect_timeout, config.max_frame_len)?;
        channel.set_io_timeout(config.io_timeout)?;
        debug!(endpoint = %endpoint, "connected to worker");
        Ok(Self {
            conn: Arc::new(Connection {
                channel: Mutex::new(channel),
            }),
        })
    }

    /// Returns a proxy for the worker's hosted root object.
    #[must_use]
    pub fn root(&self) -> RemoteProxy {
        RemoteProxy::root(Arc::clone(&self.conn))
    }
}

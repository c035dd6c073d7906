//! Worker process: hosts one object and serves the dispatch loop.
//!
//! The worker binds the transport address it was launched with, accepts one
//! client at a time, and answers requests in strict alternation until the
//! client goes away — then it returns to `accept`. The handle table lives
//! for the worker's lifetime, so a client that reconnects after a timeout
//! finds the worker in a consistent state.

pub mod dispatch;
pub mod handles;

use thiserror::Error;

use crate::object::HostObject;
use crate::trace::{debug, info, warn};
use crate::transport::channel::DEFAULT_MAX_FRAME_LEN;
use crate::transport::{Endpoint, EndpointError, Listener, MessageChannel, TransportError};
use crate::wire::envelope::{ErrorKind, Request, Response};

pub use dispatch::Dispatcher;
pub use handles::{HandleEntry, HandleTable};

/// Tunables for a worker. The launch environment supplies only the address;
/// everything else has a sensible default.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound for a single request or response message.
    pub max_frame_len: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Errors that keep a worker from serving.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The supplied address did not parse.
    #[error("invalid address: {0}")]
    Address(#[from] EndpointError),
    /// The transport failed at bind or accept time.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A bound worker, ready to host an object.
pub struct Worker {
    listener: Listener,
}

impl Worker {
    /// Parses `address` and binds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Address`] for an unparsable connection string
    /// and [`WorkerError::Transport`] if binding fails.
    pub fn bind(address: &str, config: WorkerConfig) -> Result<Self, WorkerError> {
        let endpoint: Endpoint = address.parse()?;
        let listener = Listener::bind(&endpoint, config.max_frame_len)?;
        info!(endpoint = %listener.local_endpoint(), "worker bound");
        Ok(Self { listener })
    }

    /// The endpoint this worker is reachable at (with the real port for
    /// `tcp://..:0` binds).
    #[must_use]
    pub const fn local_endpoint(&self) -> &Endpoint {
        self.listener.local_endpoint()
    }

    /// Hosts `root` and serves requests until externally terminated.
    ///
    /// Blocks forever in normal operation: when a client disconnects, the
    /// worker simply waits for the next one. Handles survive reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Transport`] only if `accept` itself fails —
    /// per-connection failures are logged and absorbed.
    pub fn run(self, root: impl HostObject + 'static) -> Result<(), WorkerError> {
        let mut dispatcher = Dispatcher::new(Box::new(root));
        loop {
            let mut channel = self.listener.accept()?;
            debug!("client connected");
            match serve(&mut channel, &mut dispatcher) {
                Ok(()) => {
                    debug!("client disconnected");
                }
                Err(err) => {
                    warn!(error = %err, "session ended abnormally");
                    let _ = err;
                }
            }
        }
    }
}

/// Serves one connected client until it disconnects.
///
/// Request-level failures (undecodable envelope, hosted-object errors) are
/// answered, not fatal; only a transport failure ends the session.
fn serve(channel: &mut MessageChannel, dispatcher: &mut Dispatcher) -> Result<(), TransportError> {
    loop {
        let frame = match channel.recv() {
            Ok(frame) => frame,
            Err(TransportError::Disconnected) => return Ok(()),
            Err(err) => return Err(err),
        };

        let response = match Request::decode(&frame) {
            Ok(request) => {
                debug!(on = %request.target, op = request.op.label(), "request");
                dispatcher.dispatch(request)
            }
            Err(err) => {
                // Malformed envelope: a protocol violation, answered
                // explicitly rather than silently dropped.
                warn!(error = %err, "undecodable request envelope");
                Response::Error {
                    kind: ErrorKind::Serialization,
                    message: err.to_string(),
                }
            }
        };

        match response.encode() {
            Ok(bytes) => channel.send(&bytes)?,
            Err(err) => {
                // Cannot answer at all; the lock-step contract is broken
                // for this client, so end the session.
                warn!(error = %err, "response refused encoding");
                let _ = err;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_rejects_malformed_addresses() {
        assert!(matches!(
            Worker::bind("nowhere", WorkerConfig::default()),
            Err(WorkerError::Address(_))
        ));
    }

    #[test]
    fn bind_reports_real_tcp_port() {
        let worker = Worker::bind("tcp://127.0.0.1:0", WorkerConfig::default()).unwrap();
        match worker.local_endpoint() {
            Endpoint::Tcp(addr) => assert_ne!(addr.port(), 0),
            other => panic!("expected tcp endpoint, got {other}"),
        }
    }
}

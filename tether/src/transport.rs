//! Lock-step transport between one client and one worker.
//!
//! The channel carries whole messages (length-prefixed over a Unix or TCP
//! stream socket) and is used strictly alternately: the client sends one
//! request and blocks for one response; the worker blocks for one request
//! and answers it before reading the next.

pub mod channel;
pub mod endpoint;

use std::time::Duration;

pub use channel::{DEFAULT_MAX_FRAME_LEN, Listener, MessageChannel, TransportError};
pub use endpoint::{Endpoint, EndpointError};

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

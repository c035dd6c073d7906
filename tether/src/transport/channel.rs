//! Blocking message channel over a stream socket.
//!
//! The underlying sockets are byte streams, so each message is carried as
//! `[len:4 (LE)][payload:len]` — the minimal layer needed to restore
//! message-oriented delivery. There is no other framing: one request message
//! out, one response message back.
//!
//! A channel that fails mid-exchange is *poisoned*: the lock-step protocol
//! has no way to resynchronize a half-finished round trip, so every further
//! operation fails fast until the caller reconnects.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

use super::endpoint::Endpoint;
use super::Timeout;

/// Default upper bound for a single message, in bytes.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// How long to wait between connect attempts while the worker is binding.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Errors raised by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying socket failure.
    #[error("io error: {0}")]
    Io(io::Error),
    /// A blocking operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
    /// The peer went away.
    #[error("connection closed by peer")]
    Disconnected,
    /// A message exceeded the configured frame limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Offending message length.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// The channel already failed mid-exchange and must be replaced.
    #[error("channel is poisoned by an earlier failure; reconnect")]
    Poisoned,
}

fn classify(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => TransportError::Disconnected,
        _ => TransportError::Io(err),
    }
}

enum Stream {
    Ipc(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    fn set_io_timeout(&self, timeout: Timeout) -> io::Result<()> {
        let limit = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(d),
        };
        match self {
            Self::Ipc(s) => {
                s.set_read_timeout(limit)?;
                s.set_write_timeout(limit)
            }
            Self::Tcp(s) => {
                s.set_read_timeout(limit)?;
                s.set_write_timeout(limit)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Ipc(s) => s.read(buf),
            Self::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Ipc(s) => s.write(buf),
            Self::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Ipc(s) => s.flush(),
            Self::Tcp(s) => s.flush(),
        }
    }
}

/// One end of a connected message channel.
pub struct MessageChannel {
    stream: Stream,
    max_frame_len: usize,
    poisoned: bool,
}

impl MessageChannel {
    /// Connects to a worker at `endpoint`.
    ///
    /// Retries while the worker is still binding (socket file absent,
    /// connection refused) until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if no worker shows up in time,
    /// or the underlying socket error otherwise.
    pub fn connect(
        endpoint: &Endpoint,
        timeout: Timeout,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        let stream = match endpoint {
            Endpoint::Ipc(path) => Stream::Ipc(connect_ipc(path, deadline)?),
            Endpoint::Tcp(addr) => {
                let stream = connect_tcp(*addr, deadline)?;
                stream.set_nodelay(true).map_err(classify)?;
                Stream::Tcp(stream)
            }
        };
        Ok(Self {
            stream,
            max_frame_len,
            poisoned: false,
        })
    }

    /// Applies a timeout to subsequent send/receive operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket rejects the option.
    pub fn set_io_timeout(&self, timeout: Timeout) -> Result<(), TransportError> {
        self.stream.set_io_timeout(timeout).map_err(classify)
    }

    /// Whether an earlier failure has made this channel unusable.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FrameTooLarge`] if `payload` exceeds the
    /// frame limit (the channel stays usable — nothing was written), or a
    /// poisoning transport error otherwise.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.poisoned {
            return Err(TransportError::Poisoned);
        }
        if payload.len() > self.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }
        let len = payload.len() as u32;
        self.guard(|stream| {
            stream.write_all(&len.to_le_bytes())?;
            stream.write_all(payload)?;
            stream.flush()
        })
    }

    /// Receives one message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disconnected`] when the peer has closed the
    /// connection, [`TransportError::Timeout`] if an io timeout is set and
    /// expires, or another poisoning transport error.
    pub fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.poisoned {
            return Err(TransportError::Poisoned);
        }
        let mut header = [0u8; 4];
        self.guard(|stream| stream.read_exact(&mut header))?;
        let len = u32::from_le_bytes(header) as usize;
        if len > self.max_frame_len {
            // The peer is already mid-message; there is no recovery.
            self.poisoned = true;
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        let mut payload = vec![0u8; len];
        self.guard(|stream| stream.read_exact(&mut payload))?;
        Ok(payload)
    }

    /// Runs an io operation, poisoning the channel on failure.
    fn guard<T>(&mut self, op: impl FnOnce(&mut Stream) -> io::Result<T>) -> Result<T, TransportError> {
        match op(&mut self.stream) {
            Ok(v) => Ok(v),
            Err(err) => {
                self.poisoned = true;
                Err(classify(err))
            }
        }
    }
}

fn connect_ipc(path: &Path, deadline: Option<Instant>) -> Result<UnixStream, TransportError> {
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err) => match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                    check_deadline(deadline)?;
                    thread::sleep(CONNECT_RETRY_INTERVAL);
                }
                _ => return Err(classify(err)),
            },
        }
    }
}

fn connect_tcp(addr: SocketAddr, deadline: Option<Instant>) -> Result<TcpStream, TransportError> {
    loop {
        let attempt = match deadline {
            None => TcpStream::connect(addr),
            Some(dl) => {
                let Some(remaining) = dl.checked_duration_since(Instant::now()) else {
                    return Err(TransportError::Timeout);
                };
                TcpStream::connect_timeout(&addr, remaining)
            }
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => match err.kind() {
                io::ErrorKind::ConnectionRefused => {
                    check_deadline(deadline)?;
                    thread::sleep(CONNECT_RETRY_INTERVAL);
                }
                _ => return Err(classify(err)),
            },
        }
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), TransportError> {
    match deadline {
        Some(dl) if Instant::now() >= dl => Err(TransportError::Timeout),
        _ => Ok(()),
    }
}

enum ListenerKind {
    Ipc(UnixListener),
    Tcp(TcpListener),
}

/// Bound listening socket on the worker side.
pub struct Listener {
    kind: ListenerKind,
    endpoint: Endpoint,
    max_frame_len: usize,
}

impl Listener {
    /// Binds to `endpoint`.
    ///
    /// For `ipc://` endpoints a stale socket file from a previous worker is
    /// removed first, mirroring bind-side ownership of the path.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error if binding fails.
    pub fn bind(endpoint: &Endpoint, max_frame_len: usize) -> Result<Self, TransportError> {
        match endpoint {
            Endpoint::Ipc(path) => {
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path).map_err(classify)?;
                Ok(Self {
                    kind: ListenerKind::Ipc(listener),
                    endpoint: endpoint.clone(),
                    max_frame_len,
                })
            }
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr).map_err(classify)?;
                // Re-read the address so `tcp://..:0` reports the real port.
                let actual = listener.local_addr().map_err(classify)?;
                Ok(Self {
                    kind: ListenerKind::Tcp(listener),
                    endpoint: Endpoint::Tcp(actual),
                    max_frame_len,
                })
            }
        }
    }

    /// The endpoint this listener is actually bound to.
    #[must_use]
    pub const fn local_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Blocks until a client connects.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error if accepting fails.
    pub fn accept(&self) -> Result<MessageChannel, TransportError> {
        let stream = match &self.kind {
            ListenerKind::Ipc(listener) => {
                let (stream, _) = listener.accept().map_err(classify)?;
                Stream::Ipc(stream)
            }
            ListenerKind::Tcp(listener) => {
                let (stream, _) = listener.accept().map_err(classify)?;
                stream.set_nodelay(true).map_err(classify)?;
                Stream::Tcp(stream)
            }
        };
        Ok(MessageChannel {
            stream,
            max_frame_len: self.max_frame_len,
            poisoned: false,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Endpoint::Ipc(path) = &self.endpoint {
            let _ = std::fs::remove_file(path);
        }
    }
}

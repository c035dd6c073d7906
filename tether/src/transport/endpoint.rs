//! Transport addresses.
//!
//! An endpoint is parsed from the single connection string both processes
//! receive at launch: `ipc://<socket-path>` for a Unix domain socket or
//! `tcp://<ip:port>` for a TCP socket. The string is used verbatim on both
//! ends; nothing else about the launch environment is interpreted here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// A transport address for one worker/client pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Unix domain socket at the given filesystem path.
    Ipc(PathBuf),
    /// TCP socket at the given address. Numeric IP only — name resolution
    /// is a launch-environment concern, not a transport one.
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Returns the scheme prefix for this endpoint.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Ipc(_) => "ipc",
            Self::Tcp(_) => "tcp",
        }
    }
}

/// Error parsing a connection string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The string has no `scheme://` prefix.
    #[error("missing scheme in `{address}` (expected ipc:// or tcp://)")]
    MissingScheme {
        /// The offending input.
        address: String,
    },
    /// The scheme is not one we speak.
    #[error("unsupported scheme `{scheme}` (expected ipc or tcp)")]
    UnsupportedScheme {
        /// The offending scheme.
        scheme: String,
    },
    /// An `ipc://` address with no path.
    #[error("ipc address has an empty path")]
    EmptyPath,
    /// A `tcp://` address that is not `ip:port`.
    #[error("invalid tcp address `{address}`")]
    InvalidAddress {
        /// The offending authority part.
        address: String,
    },
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s.split_once("://").ok_or_else(|| {
            EndpointError::MissingScheme {
                address: s.to_owned(),
            }
        })?;
        match scheme {
            "ipc" => {
                if rest.is_empty() {
                    return Err(EndpointError::EmptyPath);
                }
                Ok(Self::Ipc(PathBuf::from(rest)))
            }
            "tcp" => rest
                .parse::<SocketAddr>()
                .map(Self::Tcp)
                .map_err(|_| EndpointError::InvalidAddress {
                    address: rest.to_owned(),
                }),
            other => Err(EndpointError::UnsupportedScheme {
                scheme: other.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::Tcp(addr)
    }
}

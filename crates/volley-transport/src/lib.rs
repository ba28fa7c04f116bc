//! # Volley Transport
//!
//! Socket layer for the Volley file-transfer engine.
//!
//! This crate provides:
//! - TCP/UDP socket creation in non-blocking mode (via `socket2`)
//! - Server binding and client connect / ephemeral bind
//! - Hostname and IPv4-literal resolution
//! - Classification of platform socket errors into alert categories
//! - An explicit process-wide networking lifecycle ([`NetContext`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod context;
pub mod error;
pub mod resolve;

pub use connection::{Connection, ConnectionManager};
pub use context::NetContext;
pub use error::{ErrorCategory, TransportError, TransportResult, is_transient};
pub use resolve::{Remote, is_valid_ipv4, resolve_remote};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest UDP payload accepted by a client session.
///
/// IPv4 limits a datagram payload to 65507 bytes; packet sizes must stay
/// strictly below 65508.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// How long a TCP client waits for its connect to complete.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Backlog passed to `listen` by TCP servers.
pub const LISTEN_BACKLOG: i32 = 5;

/// Socket transport kind.
///
/// Fixed when a [`Connection`] is created and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    /// Stream socket (`SOCK_STREAM`)
    Tcp,
    /// Datagram socket (`SOCK_DGRAM`)
    Udp,
}

impl Transport {
    /// Upper-case protocol name, as shown to users.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(TransportError::UnknownTransport(other.to_string())),
        }
    }
}

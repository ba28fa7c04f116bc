//! Remote address resolution.
//!
//! Clients name their peer either by host name or by IPv4 literal. Both are
//! resolved here, before any socket is created, to a single IPv4 address.

use crate::error::{ErrorCategory, TransportError, TransportResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use tracing::debug;

/// How the caller identified the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Remote {
    /// DNS host name (or anything the system resolver accepts)
    Host(String),
    /// IPv4 dotted-decimal literal
    Ip(String),
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(name) => f.write_str(name),
            Self::Ip(ip) => f.write_str(ip),
        }
    }
}

/// Check whether `text` is a usable IPv4 literal.
///
/// The limited broadcast address doubles as the "no address" sentinel, so it
/// is rejected along with anything that does not parse.
///
/// # Examples
/// ```
/// use volley_transport::is_valid_ipv4;
///
/// assert!(is_valid_ipv4("192.168.0.10"));
/// assert!(!is_valid_ipv4("255.255.255.255"));
/// assert!(!is_valid_ipv4("example.com"));
/// ```
#[must_use]
pub fn is_valid_ipv4(text: &str) -> bool {
    text.parse::<Ipv4Addr>()
        .is_ok_and(|addr| addr != Ipv4Addr::BROADCAST)
}

/// Resolve `remote` to the IPv4 socket address used for `port`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidAddress`] for a malformed literal and
/// [`TransportError::Resolve`] when a host name cannot be resolved to an IPv4
/// address.
pub fn resolve_remote(remote: &Remote, port: u16) -> TransportResult<SocketAddrV4> {
    match remote {
        Remote::Ip(text) => {
            if !is_valid_ipv4(text) {
                return Err(TransportError::InvalidAddress(text.clone()));
            }
            let ip: Ipv4Addr = text
                .parse()
                .map_err(|_| TransportError::InvalidAddress(text.clone()))?;
            Ok(SocketAddrV4::new(ip, port))
        }
        Remote::Host(name) => resolve_host(name, port),
    }
}

fn resolve_host(name: &str, port: u16) -> TransportResult<SocketAddrV4> {
    let addrs = (name, port).to_socket_addrs().map_err(|e| {
        debug!("Lookup of {} failed: {}", name, e);
        let category = match ErrorCategory::classify(&e) {
            ErrorCategory::Unexpected => ErrorCategory::HostNotFound,
            other => other,
        };
        TransportError::Resolve {
            host: name.to_string(),
            category,
        }
    })?;

    let addr = addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| TransportError::Resolve {
            host: name.to_string(),
            category: ErrorCategory::AddressNotFound,
        })?;

    debug!("Resolved {} to {}", name, addr);
    Ok(addr)
}

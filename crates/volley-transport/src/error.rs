//! Transport errors and platform error classification.
//!
//! Setup failures are reported to the user as alerts. Raw OS error codes are
//! folded into a small fixed set of [`ErrorCategory`] values so the message
//! stays stable across platforms.

use crate::Transport;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Human-facing category of a socket or resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Name is valid but has no usable address record
    AddressNotFound,
    /// Temporary failure, the operation may succeed later
    TryAgain,
    /// Host could not be found
    HostNotFound,
    /// Another blocking operation is still in progress
    OperationInProgress,
    /// Network subsystem or route is down
    NetworkDown,
    /// Anything else
    Unexpected,
}

impl ErrorCategory {
    /// Map an I/O error onto a category.
    ///
    /// Raw platform codes win over the portable [`io::ErrorKind`].
    #[must_use]
    pub fn classify(err: &io::Error) -> Self {
        if let Some(category) = err.raw_os_error().and_then(classify_raw) {
            return category;
        }

        match err.kind() {
            io::ErrorKind::AddrNotAvailable => Self::AddressNotFound,
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut => {
                Self::TryAgain
            }
            io::ErrorKind::NotFound | io::ErrorKind::HostUnreachable => Self::HostNotFound,
            io::ErrorKind::NetworkDown | io::ErrorKind::NetworkUnreachable => Self::NetworkDown,
            _ => Self::Unexpected,
        }
    }

    /// Alert text for this category.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::AddressNotFound => "IP address not found",
            Self::TryAgain => "server failed, try again",
            Self::HostNotFound => "host not found",
            Self::OperationInProgress => "a blocking call is already in progress",
            Self::NetworkDown => "network subsystem failed",
            Self::Unexpected => "unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(unix)]
fn classify_raw(code: i32) -> Option<ErrorCategory> {
    let category = match code {
        libc::EADDRNOTAVAIL => ErrorCategory::AddressNotFound,
        libc::EAGAIN | libc::EINTR | libc::ENOBUFS => ErrorCategory::TryAgain,
        libc::EHOSTUNREACH | libc::EHOSTDOWN => ErrorCategory::HostNotFound,
        libc::EINPROGRESS | libc::EALREADY => ErrorCategory::OperationInProgress,
        libc::ENETDOWN | libc::ENETUNREACH | libc::ENETRESET => ErrorCategory::NetworkDown,
        _ => return None,
    };
    Some(category)
}

#[cfg(not(unix))]
fn classify_raw(_code: i32) -> Option<ErrorCategory> {
    None
}

/// Whether a socket error should be retried rather than reported.
///
/// Covers would-block, interrupted calls, expired read timeouts, and
/// exhausted kernel buffers.
#[must_use]
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    ) {
        return true;
    }

    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::ENOBUFS) {
        return true;
    }

    false
}

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket allocation failed
    #[error("can't create {transport} socket: {source}")]
    SocketCreate {
        /// Requested transport
        transport: Transport,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Binding to a local address failed
    #[error("can't bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound
        addr: SocketAddr,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// TCP connect did not complete in time (or the readiness wait failed)
    #[error("can't connect to {addr} within {timeout:?}: {source}")]
    ConnectTimeout {
        /// Remote address
        addr: SocketAddr,
        /// Connect budget
        timeout: Duration,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Host name or address could not be resolved
    #[error("can't resolve {host}: {category}")]
    Resolve {
        /// Host as given by the caller
        host: String,
        /// Failure category
        category: ErrorCategory,
    },

    /// Text is not a usable IPv4 literal
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// Transport name not recognised
    #[error("unknown transport: {0} (expected tcp or udp)")]
    UnknownTransport(String),

    /// Connection used in the wrong role or state
    #[error("connection not usable: {0}")]
    NotConnected(&'static str),

    /// Socket option or conversion error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Failure category, for alert reporting.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SocketCreate { source, .. }
            | Self::Bind { source, .. }
            | Self::ConnectTimeout { source, .. } => ErrorCategory::classify(source),
            Self::Resolve { category, .. } => *category,
            Self::InvalidAddress(_) => ErrorCategory::AddressNotFound,
            Self::Io(e) => ErrorCategory::classify(e),
            Self::UnknownTransport(_) | Self::NotConnected(_) => ErrorCategory::Unexpected,
        }
    }

    /// Text shown to the user when this error stops a session from starting.
    #[must_use]
    pub fn alert_message(&self) -> String {
        match self {
            Self::SocketCreate { .. } => format!("Can't create socket ({})", self.category()),
            Self::Bind { .. } | Self::ConnectTimeout { .. } => {
                format!("Can't connect to socket ({})", self.category())
            }
            Self::Resolve { host, category } => format!("Network error: {category} ({host})"),
            Self::InvalidAddress(text) => format!(
                "Please enter either a host name or a valid numeric IP address \
                 in 'X.X.X.X' format (got '{text}')"
            ),
            other => format!("Network error: {other}"),
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

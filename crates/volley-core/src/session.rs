//! Session parameters.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use volley_transport::{Remote, Transport};

/// Which side of a transfer this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Builds a packet and sends it repeatedly
    Client,
    /// Receives and appends to an output file
    Server,
}

/// Validated parameters for one connect action.
///
/// Values arrive already checked by the caller; the controller only rejects
/// combinations it cannot run at all (a client without a remote, a TCP server
/// without an expected packet size).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSession {
    /// Client or server
    pub role: Role,
    /// TCP or UDP
    pub transport: Transport,
    /// Where a client sends; unused by servers
    pub remote: Option<Remote>,
    /// Remote port (client) or listening port (server)
    pub port: u16,
    /// Source file (client) or output file (server)
    pub file_path: PathBuf,
    /// Bytes per packet (client)
    pub packet_size: usize,
    /// Times to send the packet (client)
    pub packet_count: u64,
    /// Bytes per unit when counting TCP receives (server)
    pub expected_packet_size: usize,
}

impl TransferSession {
    /// Client session sending `packet_count` copies of a `packet_size` packet
    /// built from `file_path`.
    pub fn client(
        transport: Transport,
        remote: Remote,
        port: u16,
        file_path: impl Into<PathBuf>,
        packet_size: usize,
        packet_count: u64,
    ) -> Self {
        Self {
            role: Role::Client,
            transport,
            remote: Some(remote),
            port,
            file_path: file_path.into(),
            packet_size,
            packet_count,
            expected_packet_size: 0,
        }
    }

    /// Server session appending everything received on `port` to `file_path`.
    pub fn server(transport: Transport, port: u16, file_path: impl Into<PathBuf>) -> Self {
        Self {
            role: Role::Server,
            transport,
            remote: None,
            port,
            file_path: file_path.into(),
            packet_size: 0,
            packet_count: 0,
            expected_packet_size: 0,
        }
    }

    /// Set the unit size used to count TCP receives.
    #[must_use]
    pub fn with_expected_packet_size(mut self, size: usize) -> Self {
        self.expected_packet_size = size;
        self
    }
}

//! Command-line input checks, applied before a session is built.

use thiserror::Error;
use volley_core::{Remote, Transport};
use volley_transport::{MAX_UDP_PAYLOAD, is_valid_ipv4};

/// Input rejected before any socket is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Port 0 for a client
    #[error("Please enter a port number")]
    MissingPort,

    /// Zero packet size
    #[error("Packet size must be 1 or greater.")]
    PacketSize,

    /// Datagram larger than IPv4 allows
    #[error("UDP Packet size must be less than ~64KB or 65508 Bytes.")]
    UdpPacketSize,

    /// Zero send count
    #[error("Times to transmit must be 1 or greater.")]
    PacketCount,

    /// Neither a host name nor a usable IP literal
    #[error(
        "Please enter either a host name, or alternatively a valid numeric IP address, in 'X.X.X.X' format"
    )]
    Remote,
}

/// Check client parameters.
pub fn check_send(
    transport: Transport,
    port: u16,
    packet_size: usize,
    packet_count: u64,
) -> Result<(), InputError> {
    if port == 0 {
        return Err(InputError::MissingPort);
    }
    if packet_size == 0 {
        return Err(InputError::PacketSize);
    }
    if transport == Transport::Udp && packet_size > MAX_UDP_PAYLOAD {
        return Err(InputError::UdpPacketSize);
    }
    if packet_count == 0 {
        return Err(InputError::PacketCount);
    }
    Ok(())
}

/// Check server parameters. Only TCP counts in units of an expected size.
pub fn check_receive(transport: Transport, expected_size: usize) -> Result<(), InputError> {
    if transport == Transport::Tcp && expected_size == 0 {
        return Err(InputError::PacketSize);
    }
    Ok(())
}

/// Remotes to try, in order: the host name first, then the IP literal.
///
/// An IP that fails [`is_valid_ipv4`] is dropped; if nothing usable is left
/// the input is rejected.
pub fn remote_candidates(host: Option<&str>, ip: Option<&str>) -> Result<Vec<Remote>, InputError> {
    let mut remotes = Vec::with_capacity(2);

    if let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) {
        remotes.push(Remote::Host(host.to_string()));
    }
    if let Some(ip) = ip.map(str::trim).filter(|ip| is_valid_ipv4(ip)) {
        remotes.push(Remote::Ip(ip.to_string()));
    }

    if remotes.is_empty() {
        return Err(InputError::Remote);
    }
    Ok(remotes)
}

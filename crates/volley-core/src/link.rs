//! Outbound side of an established connection.
//!
//! The [`Transmitter`](crate::Transmitter) only needs "push these bytes
//! once"; [`Outbound`] is that seam, implemented for real sockets by
//! [`SocketLink`] and by scripted links in tests.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use volley_transport::{Connection, Transport, TransportError, TransportResult};

/// A connection the Transmitter can push units through.
pub trait Outbound: Send {
    /// Transport in use; selects the retry policy.
    fn transport(&self) -> Transport;

    /// Try once to send `buf`.
    ///
    /// Stream links may accept only a prefix and return its length; datagram
    /// links send all of `buf` or fail.
    fn send_unit(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Outbound link over a real socket.
#[derive(Debug)]
pub enum SocketLink {
    /// Connected TCP stream
    Tcp(TcpStream),
    /// UDP socket and its fixed destination
    Udp {
        /// Locally bound socket
        socket: UdpSocket,
        /// Server address
        dest: SocketAddr,
    },
}

impl SocketLink {
    /// Wrap a client connection produced by
    /// [`ConnectionManager::open_client`](volley_transport::ConnectionManager::open_client).
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] for a server-side connection.
    pub fn from_connection(connection: Connection) -> TransportResult<Self> {
        let dest = connection
            .peer_addr()
            .ok_or(TransportError::NotConnected("client connection has no peer"))?;

        match connection.transport() {
            Transport::Tcp => Ok(Self::Tcp(connection.into_tcp_stream()?)),
            Transport::Udp => Ok(Self::Udp {
                socket: connection.into_udp_socket()?,
                dest,
            }),
        }
    }
}

impl Outbound for SocketLink {
    fn transport(&self) -> Transport {
        match self {
            Self::Tcp(_) => Transport::Tcp,
            Self::Udp { .. } => Transport::Udp,
        }
    }

    fn send_unit(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            Self::Udp { socket, dest } => socket.send_to(buf, *dest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use volley_transport::{ConnectionManager, NetContext};

    #[test]
    fn test_udp_link_sends_datagram() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let SocketAddr::V4(dest) = server.local_addr().unwrap() else {
            unreachable!("bound an IPv4 socket");
        };

        let manager = ConnectionManager::new(&NetContext::init());
        let conn = manager.open_client(Transport::Udp, dest).unwrap();
        let mut link = SocketLink::from_connection(conn).unwrap();
        assert_eq!(link.transport(), Transport::Udp);

        assert_eq!(link.send_unit(b"datagram").unwrap(), 8);

        let mut buf = [0u8; 32];
        let (n, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"datagram");
    }

    #[test]
    fn test_server_connection_rejected() {
        let manager = ConnectionManager::new(&NetContext::init());
        let conn = manager.open_server(Transport::Udp, 0).unwrap();
        assert!(SocketLink::from_connection(conn).is_err());
    }

    #[test]
    fn test_tcp_link_transport() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let manager = ConnectionManager::new(&NetContext::init());
        let conn = manager
            .open_client(Transport::Tcp, SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
            .unwrap();
        let link = SocketLink::from_connection(conn).unwrap();
        assert_eq!(link.transport(), Transport::Tcp);
    }
}

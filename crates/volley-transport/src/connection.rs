//! Socket creation, binding, and connecting.
//!
//! Every socket is created IPv4 and non-blocking. Servers bind the wildcard
//! address on their port; TCP clients connect with a bounded wait; UDP
//! clients bind an ephemeral port and remember where to send.

use crate::context::NetContext;
use crate::error::{TransportError, TransportResult};
use crate::{DEFAULT_CONNECT_TIMEOUT, Transport};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, UdpSocket};
use std::time::Duration;
use tracing::{debug, info};

/// An open socket together with its transport kind and address pair.
///
/// Owned by exactly one worker at a time; dropping it closes the socket.
#[derive(Debug)]
pub struct Connection {
    socket: Socket,
    transport: Transport,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
}

impl Connection {
    /// Transport kind, fixed at creation.
    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Local address once bound or connected.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Remote address for client connections.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Borrow the underlying socket.
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Give up the connection wrapper and keep the raw socket.
    #[must_use]
    pub fn into_socket(self) -> Socket {
        self.socket
    }

    /// Convert a connected TCP client into a standard stream.
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] for UDP or unconnected sockets.
    pub fn into_tcp_stream(self) -> TransportResult<TcpStream> {
        if self.transport != Transport::Tcp || self.peer_addr.is_none() {
            return Err(TransportError::NotConnected("expected a connected TCP socket"));
        }
        Ok(self.socket.into())
    }

    /// Convert a bound UDP socket into a standard socket.
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] for TCP or unbound sockets.
    pub fn into_udp_socket(self) -> TransportResult<UdpSocket> {
        if self.transport != Transport::Udp || self.local_addr.is_none() {
            return Err(TransportError::NotConnected("expected a bound UDP socket"));
        }
        Ok(self.socket.into())
    }

    fn refresh_local_addr(&mut self) -> TransportResult<()> {
        self.local_addr = self.socket.local_addr()?.as_socket();
        Ok(())
    }
}

/// Creates sockets and establishes bindings/connections.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    _net: NetContext,
    connect_timeout: Duration,
}

impl ConnectionManager {
    /// Create a manager tied to a live networking context.
    #[must_use]
    pub fn new(net: &NetContext) -> Self {
        Self {
            _net: net.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the TCP connect budget.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// TCP connect budget.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Allocate a non-blocking IPv4 socket of the requested kind.
    ///
    /// # Errors
    /// Returns [`TransportError::SocketCreate`] if allocation or switching to
    /// non-blocking mode fails.
    ///
    /// # Examples
    /// ```no_run
    /// use volley_transport::{ConnectionManager, NetContext, Transport};
    ///
    /// let net = NetContext::init();
    /// let manager = ConnectionManager::new(&net);
    /// let conn = manager.create_socket(Transport::Udp).unwrap();
    /// assert_eq!(conn.transport(), Transport::Udp);
    /// ```
    pub fn create_socket(&self, transport: Transport) -> TransportResult<Connection> {
        let (ty, protocol) = match transport {
            Transport::Tcp => (Type::STREAM, Protocol::TCP),
            Transport::Udp => (Type::DGRAM, Protocol::UDP),
        };

        let socket = Socket::new(Domain::IPV4, ty, Some(protocol))
            .and_then(|socket| {
                socket.set_nonblocking(true)?;
                Ok(socket)
            })
            .map_err(|source| TransportError::SocketCreate { transport, source })?;

        debug!("Created non-blocking {} socket", transport);
        Ok(Connection {
            socket,
            transport,
            local_addr: None,
            peer_addr: None,
        })
    }

    /// Bind a server socket to the wildcard address on `port`.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`] if the address is unavailable.
    pub fn bind(&self, connection: &mut Connection, port: u16) -> TransportResult<()> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));

        if connection.transport == Transport::Tcp {
            // Quick restarts must not trip over TIME_WAIT.
            connection.socket.set_reuse_address(true)?;
        }

        connection
            .socket
            .bind(&SockAddr::from(addr))
            .map_err(|source| TransportError::Bind { addr, source })?;
        connection.refresh_local_addr()?;

        info!(
            "{} server bound to {}",
            connection.transport,
            connection.local_addr.unwrap_or(addr)
        );
        Ok(())
    }

    /// Prepare a client socket to reach `remote`.
    ///
    /// TCP initiates a connect and waits up to the connect budget for the
    /// socket to become writable. Writability is success; a peer that refused
    /// or reset shows up later as failed sends. The socket stays non-blocking.
    /// UDP binds an ephemeral local port and records `remote` as the
    /// destination.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectTimeout`] (TCP) or
    /// [`TransportError::Bind`] (UDP).
    pub fn connect_client(
        &self,
        connection: &mut Connection,
        remote: SocketAddrV4,
    ) -> TransportResult<()> {
        let remote = SocketAddr::V4(remote);

        match connection.transport {
            Transport::Tcp => {
                let timeout = self.connect_timeout;
                connect_writable(&connection.socket, &SockAddr::from(remote), timeout).map_err(
                    |source| TransportError::ConnectTimeout {
                        addr: remote,
                        timeout,
                        source,
                    },
                )?;
            }
            Transport::Udp => {
                let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
                connection
                    .socket
                    .bind(&SockAddr::from(local))
                    .map_err(|source| TransportError::Bind {
                        addr: local,
                        source,
                    })?;
            }
        }

        connection.peer_addr = Some(remote);
        connection.refresh_local_addr()?;
        info!(
            "{} client ready: {:?} -> {}",
            connection.transport, connection.local_addr, remote
        );
        Ok(())
    }

    /// Create and bind a server connection in one step.
    ///
    /// # Errors
    /// See [`create_socket`](Self::create_socket) and [`bind`](Self::bind).
    pub fn open_server(&self, transport: Transport, port: u16) -> TransportResult<Connection> {
        let mut connection = self.create_socket(transport)?;
        self.bind(&mut connection, port)?;
        Ok(connection)
    }

    /// Create and connect a client connection in one step.
    ///
    /// # Errors
    /// See [`create_socket`](Self::create_socket) and
    /// [`connect_client`](Self::connect_client).
    pub fn open_client(
        &self,
        transport: Transport,
        remote: SocketAddrV4,
    ) -> TransportResult<Connection> {
        let mut connection = self.create_socket(transport)?;
        self.connect_client(&mut connection, remote)?;
        Ok(connection)
    }
}

/// Start a non-blocking connect and wait for the socket to become writable.
///
/// Only an expired wait or a failed poll is an error.
#[cfg(unix)]
fn connect_writable(socket: &Socket, addr: &SockAddr, timeout: Duration) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    if let Err(e) = socket.connect(addr) {
        // EINPROGRESS is the normal case; anything else surfaces on send.
        debug!("connect to {:?} returned: {}", addr.as_socket(), e);
    }

    let mut pollfd = libc::pollfd {
        fd: socket.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `pollfd` is a single valid entry that outlives the call.
    match unsafe { libc::poll(&mut pollfd, 1, millis) } {
        -1 => Err(io::Error::last_os_error()),
        0 => Err(io::Error::new(io::ErrorKind::TimedOut, "socket not writable in time")),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn connect_writable(socket: &Socket, addr: &SockAddr, timeout: Duration) -> io::Result<()> {
    socket.connect_timeout(addr, timeout)?;
    socket.set_nonblocking(true)
}

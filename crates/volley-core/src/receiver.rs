//! Receive worker.
//!
//! Polls a server connection until cancelled and appends everything that
//! arrives to the output file.
//!
//! - UDP: each non-empty datagram is one unit, appended with an
//!   open-append-close cycle.
//! - TCP: connections are accepted one at a time and read to EOF; the bytes of
//!   a finished connection are counted in units of the expected packet size.
//!
//! Cancellation is checked once per loop iteration. The listener and the UDP
//! socket are non-blocking and accepted streams carry a read timeout, so no
//! call blocks longer than one poll interval.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::RECV_BUFFER_SIZE;
use crate::event::WorkerEvent;
use crossbeam_channel::Sender;
use socket2::Socket;
use std::io::{self, Read};
use std::net::{TcpStream, UdpSocket};
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use volley_files::OutputSink;
use volley_transport::{
    Connection, LISTEN_BACKLOG, Transport, TransportError, TransportResult, is_transient,
};

/// Receiver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// Built, not yet running
    Idle,
    /// Receive loop in progress
    Polling,
    /// Cancelled, connection closed
    Stopped,
}

/// Totals for one receive run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    /// Units counted
    pub units: u64,
    /// Bytes read from the network
    pub bytes: u64,
    /// TCP connections accepted (always 0 for UDP)
    pub connections: u64,
}

enum Inbound {
    Datagram(UdpSocket),
    Stream {
        listener: Socket,
        expected: NonZeroUsize,
        listening: bool,
    },
}

/// Server-side receive loop.
pub struct Receiver {
    inbound: Inbound,
    sink: OutputSink,
    buffer: Vec<u8>,
    poll_interval: Duration,
    read_timeout: Duration,
    cancel: CancelToken,
    events: Sender<WorkerEvent>,
    state: ReceiveState,
    summary: ReceiveSummary,
}

impl Receiver {
    /// UDP receiver over a bound server socket.
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] unless `connection` is a bound
    /// UDP socket.
    pub fn udp(
        connection: Connection,
        sink: OutputSink,
        config: &EngineConfig,
        cancel: CancelToken,
        events: Sender<WorkerEvent>,
    ) -> TransportResult<Self> {
        let socket = connection.into_udp_socket()?;
        socket.set_nonblocking(true)?;
        Ok(Self::with_inbound(Inbound::Datagram(socket), sink, config, cancel, events))
    }

    /// TCP receiver over a bound server socket, counting in units of
    /// `expected` bytes.
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] unless `connection` is a bound
    /// TCP socket.
    pub fn tcp(
        connection: Connection,
        sink: OutputSink,
        expected: NonZeroUsize,
        config: &EngineConfig,
        cancel: CancelToken,
        events: Sender<WorkerEvent>,
    ) -> TransportResult<Self> {
        if connection.transport() != Transport::Tcp || connection.local_addr().is_none() {
            return Err(TransportError::NotConnected("expected a bound TCP socket"));
        }
        let listener = connection.into_socket();
        listener.set_nonblocking(true)?;
        // Listen up front so clients can connect as soon as setup returns;
        // the poll loop retries if this fails.
        let listening = match listener.listen(LISTEN_BACKLOG) {
            Ok(()) => true,
            Err(e) => {
                warn!("listen failed, will retry: {}", e);
                false
            }
        };
        let inbound = Inbound::Stream {
            listener,
            expected,
            listening,
        };
        Ok(Self::with_inbound(inbound, sink, config, cancel, events))
    }

    fn with_inbound(
        inbound: Inbound,
        sink: OutputSink,
        config: &EngineConfig,
        cancel: CancelToken,
        events: Sender<WorkerEvent>,
    ) -> Self {
        // A datagram must fit whole or recvfrom truncates it.
        let buffer_size = match &inbound {
            Inbound::Datagram(_) => config.recv_buffer_size.max(RECV_BUFFER_SIZE),
            Inbound::Stream { .. } => config.recv_buffer_size.max(1),
        };
        Self {
            inbound,
            sink,
            buffer: vec![0u8; buffer_size],
            poll_interval: config.poll_interval,
            read_timeout: config.read_timeout,
            cancel,
            events,
            state: ReceiveState::Idle,
            summary: ReceiveSummary::default(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Receive until cancelled, then close the connection.
    pub fn run(mut self) -> ReceiveSummary {
        self.state = ReceiveState::Polling;
        info!("Receiving into {}", self.sink.path().display());

        while !self.cancel.is_cancelled() {
            if matches!(self.inbound, Inbound::Datagram(_)) {
                self.poll_datagram();
            } else {
                self.poll_stream();
            }
        }

        self.state = ReceiveState::Stopped;
        info!(
            "Receive stopped: {} unit(s), {} bytes, {} connection(s)",
            self.summary.units, self.summary.bytes, self.summary.connections
        );
        self.summary
    }

    fn poll_datagram(&mut self) {
        let Inbound::Datagram(socket) = &self.inbound else {
            return;
        };

        match socket.recv_from(&mut self.buffer) {
            Ok((0, from)) => debug!("Skipping empty datagram from {}", from),
            Ok((n, from)) => {
                self.summary.units += 1;
                self.summary.bytes += n as u64;
                debug!("Datagram {} ({} bytes) from {}", self.summary.units, n, from);
                self.emit(WorkerEvent::UnitReceived {
                    size: n,
                    total: self.summary.units,
                });
                if let Err(e) = self.sink.append(&self.buffer[..n]) {
                    warn!("Append failed: {}", e);
                    self.emit(WorkerEvent::Alert(format!("Can't write received data: {e}")));
                }
            }
            Err(e) => {
                if !is_transient(&e) {
                    warn!("recvfrom failed: {}", e);
                }
                thread::sleep(self.poll_interval);
            }
        }
    }

    fn poll_stream(&mut self) {
        let Inbound::Stream {
            listener,
            expected,
            listening,
        } = &mut self.inbound
        else {
            return;
        };
        let expected = *expected;

        if !*listening {
            match listener.listen(LISTEN_BACKLOG) {
                Ok(()) => *listening = true,
                Err(e) => {
                    warn!("listen failed: {}", e);
                    thread::sleep(self.poll_interval);
                    return;
                }
            }
        }

        let stream = match listener.accept() {
            Ok((socket, from)) => {
                debug!("Accepted connection from {:?}", from.as_socket());
                TcpStream::from(socket)
            }
            Err(e) => {
                if !is_transient(&e) {
                    warn!("accept failed: {}", e);
                }
                thread::sleep(self.poll_interval);
                return;
            }
        };

        self.summary.connections += 1;
        self.emit(WorkerEvent::ConnectionStarted);

        let Some(bytes) = self.drain_stream(stream) else {
            debug!("Connection abandoned on stop request");
            return;
        };

        let units = bytes / expected.get() as u64;
        self.summary.bytes += bytes;
        self.summary.units += units;
        debug!(
            "Connection closed after {} bytes: {} unit(s), {} total",
            bytes, units, self.summary.units
        );
        self.emit(WorkerEvent::UnitReceived {
            size: expected.get(),
            total: self.summary.units,
        });
    }

    /// Read an accepted stream to EOF, appending as it goes.
    ///
    /// Returns `None` when a stop request arrives first.
    fn drain_stream(&mut self, mut stream: TcpStream) -> Option<u64> {
        if let Err(e) = configure_stream(&stream, self.read_timeout) {
            warn!("Can't configure accepted stream: {}", e);
        }

        let mut file = match self.sink.open() {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("{}", e);
                self.emit(WorkerEvent::Alert(format!("Can't write received data: {e}")));
                None
            }
        };

        let mut bytes = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match stream.read(&mut self.buffer) {
                Ok(0) => return Some(bytes),
                Ok(n) => {
                    bytes += n as u64;
                    let appended = file.as_mut().map(|out| out.write(&self.buffer[..n]));
                    if let Some(Err(e)) = appended {
                        warn!("{}", e);
                        self.emit(WorkerEvent::Alert(format!("Can't write received data: {e}")));
                        file = None;
                    }
                }
                Err(e) if is_transient(&e) => {}
                Err(e) => {
                    warn!("recv failed: {}", e);
                    return Some(bytes);
                }
            }
        }
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.events.send(event);
    }
}

fn configure_stream(stream: &TcpStream, read_timeout: Duration) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(read_timeout))
}

//! Session controller.
//!
//! Turns a [`TransferSession`] into running threads:
//!
//! - a worker ([`Transmitter`] for clients, [`Receiver`] for servers) that
//!   owns the connection and reports [`WorkerEvent`]s
//! - a coordination thread that owns the [`TransferStats`], converts worker
//!   events into [`SessionEvent`]s, and emits the closing events once the
//!   worker is gone
//!
//! Only one session is active per controller. Connecting again, calling
//! [`SessionController::finish`], or dropping the controller tears the
//! current one down.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::SetupError;
use crate::event::{SessionEvent, TransferResult, WorkerEvent};
use crate::link::SocketLink;
use crate::receiver::Receiver;
use crate::session::{Role, TransferSession};
use crate::stats::TransferStats;
use crate::transmitter::Transmitter;
use crossbeam_channel::{Sender, unbounded};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use volley_files::{OutputSink, PacketBuilder};
use volley_transport::{ConnectionManager, NetContext, Transport, resolve_remote};

const SEND_THREAD: &str = "volley-send";
const RECV_THREAD: &str = "volley-recv";
const COORD_THREAD: &str = "volley-coord";

struct ActiveSession {
    role: Role,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
    coordinator: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ActiveSession {
    fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("{:?} worker panicked", self.role);
            }
        }
        if let Some(handle) = self.coordinator.take() {
            if handle.join().is_err() {
                error!("Coordinator panicked");
            }
        }
    }
}

/// Owns the active session and its event stream.
pub struct SessionController {
    manager: ConnectionManager,
    config: EngineConfig,
    events: Sender<SessionEvent>,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// Controller plus the receiving end of its event stream.
    pub fn new(
        net: &NetContext,
        config: EngineConfig,
    ) -> (Self, crossbeam_channel::Receiver<SessionEvent>) {
        let (events, rx) = unbounded();
        let manager = ConnectionManager::new(net).with_connect_timeout(config.connect_timeout);
        let controller = Self {
            manager,
            config,
            events,
            active: None,
        };
        (controller, rx)
    }

    /// Engine tunables in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a session, finishing any previous one first.
    ///
    /// # Errors
    /// Any [`SetupError`]; it is also delivered as [`SessionEvent::Alert`] and
    /// no session is left running.
    pub fn connect(&mut self, session: TransferSession) -> Result<(), SetupError> {
        self.finish();

        let started = match session.role {
            Role::Client => self.start_client(&session),
            Role::Server => self.start_server(&session),
        };

        match started {
            Ok(active) => {
                info!(
                    "{:?} session started ({}, port {})",
                    session.role, session.transport, session.port
                );
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                error!("Session setup failed: {}", e);
                self.emit(SessionEvent::Alert(e.alert_message()));
                Err(e)
            }
        }
    }

    /// Stop the active session and wait for its threads.
    ///
    /// A server is told to stop and its final result is emitted. A client is
    /// not interrupted: this returns once every packet has been sent.
    pub fn finish(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!("Finishing {:?} session", active.role);
            active.cancel.cancel();
            active.join();
        }
    }

    /// Wait for the active session to end on its own.
    ///
    /// Server sessions never end on their own, so for them this is
    /// [`finish`](Self::finish).
    pub fn wait(&mut self) {
        match self.active.as_ref().map(|a| a.role) {
            Some(Role::Client) => {
                if let Some(mut active) = self.active.take() {
                    active.join();
                }
            }
            Some(Role::Server) => self.finish(),
            None => {}
        }
    }

    /// Whether a session is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|active| {
            active
                .coordinator
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
        })
    }

    /// Local address of the active session's socket.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().and_then(|active| active.local_addr)
    }

    fn start_client(&self, session: &TransferSession) -> Result<ActiveSession, SetupError> {
        let remote = session.remote.as_ref().ok_or(SetupError::MissingRemote)?;
        let addr = resolve_remote(remote, session.port)?;
        debug!("Resolved {} to {}", remote, addr);

        let packet = PacketBuilder::with_max_size(self.config.max_packet_size)
            .build(&session.file_path, session.packet_size)?;

        let connection = self.manager.open_client(session.transport, addr)?;
        let local_addr = connection.local_addr();
        let link = SocketLink::from_connection(connection)?;

        let (worker_tx, worker_rx) = unbounded();
        let packet_count = session.packet_count;
        let retry = self.config.retry;
        let worker = spawn(SEND_THREAD, move || {
            Transmitter::new(link, packet, packet_count, retry, worker_tx).run();
        })?;

        let coordinator = Coordinator {
            role: Role::Client,
            transport: session.transport,
            events: self.events.clone(),
        };
        let preamble = vec![SessionEvent::Status(
            "-Client sending in background".to_string(),
        )];
        let mut active = ActiveSession {
            role: Role::Client,
            cancel: CancelToken::new(),
            worker: Some(worker),
            coordinator: None,
            local_addr,
        };
        let handle = spawn_coordinator(&mut active, coordinator, preamble, worker_rx)?;
        active.coordinator = Some(handle);
        Ok(active)
    }

    fn start_server(&self, session: &TransferSession) -> Result<ActiveSession, SetupError> {
        let expected = match session.transport {
            Transport::Tcp => Some(
                NonZeroUsize::new(session.expected_packet_size)
                    .ok_or(SetupError::ExpectedPacketSize)?,
            ),
            Transport::Udp => None,
        };

        let sink = OutputSink::new(&session.file_path);
        sink.check()?;

        let connection = self.manager.open_server(session.transport, session.port)?;
        let local_addr = connection.local_addr();

        let cancel = CancelToken::new();
        let (worker_tx, worker_rx) = unbounded();
        let receiver = match expected {
            Some(expected) => Receiver::tcp(
                connection,
                sink,
                expected,
                &self.config,
                cancel.clone(),
                worker_tx,
            )?,
            None => Receiver::udp(connection, sink, &self.config, cancel.clone(), worker_tx)?,
        };

        let worker = spawn(RECV_THREAD, move || {
            receiver.run();
        })?;

        let preamble = vec![
            SessionEvent::Result(TransferResult::cleared(session.transport)),
            SessionEvent::Status("-Server receiving in background".to_string()),
            SessionEvent::ConnectionReady(true),
        ];
        let coordinator = Coordinator {
            role: Role::Server,
            transport: session.transport,
            events: self.events.clone(),
        };
        let mut active = ActiveSession {
            role: Role::Server,
            cancel,
            worker: Some(worker),
            coordinator: None,
            local_addr,
        };
        let handle = spawn_coordinator(&mut active, coordinator, preamble, worker_rx)?;
        active.coordinator = Some(handle);
        Ok(active)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Start the coordination thread for an already running worker.
///
/// On failure the worker is stopped and joined before returning.
fn spawn_coordinator(
    active: &mut ActiveSession,
    coordinator: Coordinator,
    preamble: Vec<SessionEvent>,
    worker_rx: crossbeam_channel::Receiver<WorkerEvent>,
) -> Result<JoinHandle<()>, SetupError> {
    spawn(COORD_THREAD, move || coordinator.run(preamble, worker_rx)).inspect_err(|_| {
        warn!("Stopping {:?} worker after failed setup", active.role);
        active.cancel.cancel();
        active.join();
    })
}

fn spawn<F>(name: &'static str, f: F) -> Result<JoinHandle<()>, SetupError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| SetupError::Spawn { name, source })
}

/// Coordination thread state.
struct Coordinator {
    role: Role,
    transport: Transport,
    events: Sender<SessionEvent>,
}

impl Coordinator {
    fn run(self, preamble: Vec<SessionEvent>, worker_rx: crossbeam_channel::Receiver<WorkerEvent>) {
        for event in preamble {
            self.emit(event);
        }

        let mut stats = TransferStats::new();
        for event in worker_rx {
            match event {
                WorkerEvent::Status(text) => self.emit(SessionEvent::Status(text)),
                WorkerEvent::Alert(text) => self.emit(SessionEvent::Alert(text)),
                WorkerEvent::ConnectionStarted => stats.record_connection_started(Instant::now()),
                WorkerEvent::UnitReceived { size, total } => {
                    stats.record_units(size, total, Instant::now());
                    self.emit(SessionEvent::Result(stats.snapshot(self.transport)));
                    self.emit(SessionEvent::Status("-received packet(s)".to_string()));
                }
                WorkerEvent::SendFinished(report) => {
                    self.emit(SessionEvent::Result(TransferResult {
                        packet_size: report.packet_size,
                        packet_count: report.sent,
                        elapsed_millis: u64::try_from(report.elapsed.as_millis())
                            .unwrap_or(u64::MAX),
                        transport: self.transport,
                    }));
                }
            }
        }

        // Worker gone: its connection is closed.
        if self.role == Role::Server {
            self.emit(SessionEvent::Status("-Receive finished".to_string()));
            self.emit(SessionEvent::Result(stats.snapshot(self.transport)));
        }
        self.emit(SessionEvent::ConnectionReady(false));
        debug!("Coordinator for {:?} session exiting", self.role);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

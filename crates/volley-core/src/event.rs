//! Events flowing from workers to the controller and from the controller to
//! the caller.
//!
//! Every payload is immutable once constructed and travels one way only.

use crate::transmitter::SendReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use volley_transport::Transport;

/// Reported by a Transmitter or Receiver to the coordination thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Routine progress text
    Status(String),

    /// Failure the user should see
    Alert(String),

    /// A TCP connection was accepted; starts the clock, carries no count
    ConnectionStarted,

    /// Units arrived
    UnitReceived {
        /// Datagram length (UDP) or expected packet size (TCP)
        size: usize,
        /// Units received so far this session
        total: u64,
    },

    /// The Transmitter finished its run
    SendFinished(SendReport),
}

/// Delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Routine, high-frequency progress text
    Status(String),

    /// Session-breaking failure
    Alert(String),

    /// Statistics snapshot
    Result(TransferResult),

    /// Whether the caller's disconnect action is available
    ConnectionReady(bool),
}

/// Snapshot of a session's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Last unit size
    pub packet_size: usize,
    /// Units counted
    pub packet_count: u64,
    /// Milliseconds between first and last report
    pub elapsed_millis: u64,
    /// Session transport
    pub transport: Transport,
}

impl TransferResult {
    /// All-zero result, used to clear the caller's display at session start.
    #[must_use]
    pub fn cleared(transport: Transport) -> Self {
        Self {
            packet_size: 0,
            packet_count: 0,
            elapsed_millis: 0,
            transport,
        }
    }
}

impl fmt::Display for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} packet(s) of {} bytes in {} ms",
            self.transport, self.packet_count, self.packet_size, self.elapsed_millis
        )
    }
}

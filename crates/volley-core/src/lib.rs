//! # Volley Core
//!
//! Session engine for the Volley point-to-point transfer tool.
//!
//! A client session builds one packet from a file and sends it a fixed number
//! of times; a server session receives datagrams or streams, appends them to
//! an output file, and times the transfer.
//!
//! ## Architecture
//!
//! ```text
//!  caller ◀── SessionEvent ──┐
//!                            │
//!                  ┌─────────┴──────────┐
//!                  │  SessionController │  (coordination thread owns stats)
//!                  └────┬──────────▲────┘
//!          CancelToken  │          │ WorkerEvent
//!                  ┌────▼──────────┴────┐
//!                  │ Transmitter  or    │  (one worker thread per session,
//!                  │ Receiver           │   owns its Connection)
//!                  └────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod link;
pub mod receiver;
pub mod session;
pub mod stats;
pub mod transmitter;

pub use cancel::CancelToken;
pub use config::{EngineConfig, RetryPolicy};
pub use controller::SessionController;
pub use error::SetupError;
pub use event::{SessionEvent, TransferResult, WorkerEvent};
pub use link::{Outbound, SocketLink};
pub use receiver::{ReceiveState, ReceiveSummary, Receiver};
pub use session::{Role, TransferSession};
pub use stats::TransferStats;
pub use transmitter::{SendReport, TransmitState, Transmitter};

pub use volley_transport::{Remote, Transport};

/// Size of the reusable receive buffer (64 KiB).
///
/// Large enough for any IPv4 UDP datagram.
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

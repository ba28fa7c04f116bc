//! Session setup errors

use std::io;
use volley_files::{PacketError, SinkError};
use volley_transport::TransportError;

/// Failure to start a session.
///
/// Every variant is fatal to the connect action only; it is reported once as
/// an alert and nothing is left running.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Socket, bind, connect, or resolution failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Source file could not be packetized
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// Output file is not writable
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// TCP server started without a unit size to count by
    #[error("expected packet size must be 1 or greater")]
    ExpectedPacketSize,

    /// Client session started without a remote
    #[error("no host name or IP address given")]
    MissingRemote,

    /// Worker thread could not be started
    #[error("can't start {name} thread: {source}")]
    Spawn {
        /// Thread name
        name: &'static str,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },
}

impl SetupError {
    /// Text delivered to the caller as an alert.
    #[must_use]
    pub fn alert_message(&self) -> String {
        match self {
            Self::Transport(e) => e.alert_message(),
            Self::Packet(PacketError::FileOpen { path, .. } | PacketError::Read { path, .. })
            | Self::Sink(SinkError::Open { path, .. } | SinkError::Write { path, .. }) => {
                format!("Can't open file at:\n{}", path.display())
            }
            Self::Packet(PacketError::PacketTooLarge { limit, .. }) => {
                format!("Packet size too big, use a number no larger than {limit}")
            }
            Self::ExpectedPacketSize => "Expected packet size must be 1 or greater.".to_string(),
            Self::MissingRemote => {
                "Please enter either a host name or a valid numeric IP address.".to_string()
            }
            Self::Spawn { .. } => format!("Unexpected error: {self}"),
        }
    }
}

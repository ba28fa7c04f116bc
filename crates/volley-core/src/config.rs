//! Engine configuration

use crate::RECV_BUFFER_SIZE;
use std::time::Duration;
use volley_files::MAX_PACKET_SIZE;
use volley_transport::DEFAULT_CONNECT_TIMEOUT;

/// Retry policy for transient TCP send failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries per unit after the first attempt
    pub max_retries: u32,

    /// Sleep between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Total attempts a unit can receive (first try plus retries).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Tunables for the session engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TCP send retry policy
    pub retry: RetryPolicy,

    /// TCP client connect budget
    pub connect_timeout: Duration,

    /// Sleep between receive polls after a transient error or empty accept
    pub poll_interval: Duration,

    /// Read timeout on accepted TCP streams, bounds how long a stop request
    /// can go unnoticed mid-connection
    pub read_timeout: Duration,

    /// Receive scratch buffer size
    pub recv_buffer_size: usize,

    /// Packet size ceiling for client sessions
    pub max_packet_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: Duration::from_millis(100),
            read_timeout: Duration::from_millis(100),
            recv_buffer_size: RECV_BUFFER_SIZE,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

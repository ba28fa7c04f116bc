//! Receive-side timing and counters.

use crate::event::TransferResult;
use std::time::{Duration, Instant};
use volley_transport::Transport;

/// Statistics for one server session.
///
/// Owned by the coordination thread. The first report of a session fixes the
/// start time; every later report moves the end time.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    last_unit_size: usize,
    total_units: u64,
    start: Option<Instant>,
    end: Option<Instant>,
}

impl TransferStats {
    /// Empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, ready for a new session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// A connection was accepted: timing only, counts untouched.
    pub fn record_connection_started(&mut self, now: Instant) {
        self.touch(now);
    }

    /// Units arrived.
    pub fn record_units(&mut self, size: usize, total: u64, now: Instant) {
        self.touch(now);
        self.last_unit_size = size;
        self.total_units = total;
    }

    fn touch(&mut self, now: Instant) {
        match self.start {
            None => {
                self.start = Some(now);
                self.end = Some(now);
            }
            Some(_) => self.end = Some(now),
        }
    }

    /// Size of the most recent unit.
    #[must_use]
    pub fn last_unit_size(&self) -> usize {
        self.last_unit_size
    }

    /// Units counted so far.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.total_units
    }

    /// Time between first and last report (zero before any report).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Snapshot for the caller.
    #[must_use]
    pub fn snapshot(&self, transport: Transport) -> TransferResult {
        TransferResult {
            packet_size: self.last_unit_size,
            packet_count: self.total_units,
            elapsed_millis: u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX),
            transport,
        }
    }
}

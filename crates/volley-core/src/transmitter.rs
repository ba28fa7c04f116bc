//! Send worker.
//!
//! Pushes one prebuilt packet `packet_count` times through an [`Outbound`]
//! link, one unit after another.
//!
//! # Retry contract
//! - TCP: a transient failure retries the same unit up to
//!   [`RetryPolicy::max_retries`] times in a row with a fixed backoff, then
//!   the unit is reported and skipped. A write that makes progress resets the
//!   count. Other errors are reported and skipped at once.
//! - UDP: failures are reported and skipped; nothing is retried.
//! - No per-unit failure aborts the run.

use crate::config::RetryPolicy;
use crate::event::WorkerEvent;
use crate::link::Outbound;
use crossbeam_channel::Sender;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use volley_files::Packet;
use volley_transport::{Transport, is_transient};

/// Transmitter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitState {
    /// Built, not yet running
    Idle,
    /// Send loop in progress
    Sending,
    /// Loop finished, link closed
    Done,
}

/// Outcome of a send run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Link transport
    pub transport: Transport,
    /// Bytes per unit
    pub packet_size: usize,
    /// Units requested
    pub requested: u64,
    /// Units fully sent
    pub sent: u64,
    /// Units skipped after failing
    pub failed: u64,
    /// Calls made into the link
    pub attempts: u64,
    /// Transient-failure retries performed
    pub retries: u64,
    /// Wall time of the send loop
    pub elapsed: Duration,
}

enum UnitOutcome {
    Sent,
    Failed,
}

/// Repeated sender for one client session.
pub struct Transmitter<L: Outbound> {
    link: L,
    packet: Packet,
    packet_count: u64,
    retry: RetryPolicy,
    events: Sender<WorkerEvent>,
    state: TransmitState,
    report: SendReport,
}

impl<L: Outbound> Transmitter<L> {
    /// Prepare a run of `packet_count` sends of `packet` over `link`.
    pub fn new(
        link: L,
        packet: Packet,
        packet_count: u64,
        retry: RetryPolicy,
        events: Sender<WorkerEvent>,
    ) -> Self {
        let report = SendReport {
            transport: link.transport(),
            packet_size: packet.len(),
            requested: packet_count,
            sent: 0,
            failed: 0,
            attempts: 0,
            retries: 0,
            elapsed: Duration::ZERO,
        };

        Self {
            link,
            packet,
            packet_count,
            retry,
            events,
            state: TransmitState::Idle,
            report,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransmitState {
        self.state
    }

    /// Run the send loop to completion, close the link, and report.
    ///
    /// The report is also delivered as [`WorkerEvent::SendFinished`].
    pub fn run(mut self) -> SendReport {
        self.state = TransmitState::Sending;
        let started = Instant::now();
        info!(
            "Sending {} x {} bytes over {}",
            self.packet_count,
            self.packet.len(),
            self.report.transport
        );

        for index in 0..self.packet_count {
            let outcome = match self.report.transport {
                Transport::Tcp => self.send_stream_unit(index),
                Transport::Udp => self.send_datagram_unit(index),
            };
            match outcome {
                UnitOutcome::Sent => self.report.sent += 1,
                UnitOutcome::Failed => self.report.failed += 1,
            }
        }

        self.report.elapsed = started.elapsed();
        self.emit(WorkerEvent::Status(
            "-Finished sending all packets.".to_string(),
        ));
        info!(
            "Send finished: {}/{} sent, {} failed, {} retries in {:?}",
            self.report.sent,
            self.report.requested,
            self.report.failed,
            self.report.retries,
            self.report.elapsed
        );

        let report = self.report;
        self.emit(WorkerEvent::SendFinished(report));
        self.state = TransmitState::Done;
        // Dropping self closes the link.
        report
    }

    fn send_stream_unit(&mut self, index: u64) -> UnitOutcome {
        let len = self.packet.len();
        let mut offset = 0;
        let mut retries = 0;

        loop {
            self.report.attempts += 1;
            match self.link.send_unit(&self.packet[offset..]) {
                Ok(written) => {
                    offset += written;
                    if offset >= len {
                        debug!("Unit {} sent", index);
                        self.emit(WorkerEvent::Status("-sent packet.".to_string()));
                        return UnitOutcome::Sent;
                    }
                    if written == 0 {
                        warn!("Unit {}: link accepted no bytes", index);
                        self.emit(WorkerEvent::Status(
                            "-send failed, connection accepted no data".to_string(),
                        ));
                        return UnitOutcome::Failed;
                    }
                    // Budget covers consecutive stalls only.
                    retries = 0;
                }
                Err(e) if is_transient(&e) => {
                    if retries >= self.retry.max_retries {
                        warn!("Unit {} dropped after {} retries: {}", index, retries, e);
                        self.emit(WorkerEvent::Status(
                            "-send failed, retransmitted too many times".to_string(),
                        ));
                        return UnitOutcome::Failed;
                    }
                    retries += 1;
                    self.report.retries += 1;
                    debug!("Unit {} retry {}: {}", index, retries, e);
                    self.emit(WorkerEvent::Status(format!(
                        "-send failed {retries} times, retransmitting..."
                    )));
                    thread::sleep(self.retry.backoff);
                }
                Err(e) => {
                    warn!("Unit {} failed: {}", index, e);
                    self.emit(WorkerEvent::Status(format!(
                        "-send failed, unexpected error: {e}"
                    )));
                    return UnitOutcome::Failed;
                }
            }
        }
    }

    fn send_datagram_unit(&mut self, index: u64) -> UnitOutcome {
        self.report.attempts += 1;
        match self.link.send_unit(&self.packet) {
            Ok(_) => {
                debug!("Datagram {} sent", index);
                self.emit(WorkerEvent::Status("-sendto'd packet.".to_string()));
                UnitOutcome::Sent
            }
            Err(e) => {
                warn!("Datagram {} failed: {}", index, e);
                self.emit(WorkerEvent::Status(format!(
                    "-sendto failed, unexpected error: {e}"
                )));
                UnitOutcome::Failed
            }
        }
    }

    fn emit(&self, event: WorkerEvent) {
        // The controller may already be gone; the run still completes.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::collections::VecDeque;
    use std::io;

    /// Link that replays a script of results, then repeats `fallback`.
    struct ScriptedLink {
        transport: Transport,
        script: VecDeque<io::Result<usize>>,
        fallback: fn(&[u8]) -> io::Result<usize>,
        calls: usize,
        delivered: Vec<u8>,
    }

    impl ScriptedLink {
        fn new(transport: Transport, fallback: fn(&[u8]) -> io::Result<usize>) -> Self {
            Self {
                transport,
                script: VecDeque::new(),
                fallback,
                calls: 0,
                delivered: Vec::new(),
            }
        }

        fn then(mut self, result: io::Result<usize>) -> Self {
            self.script.push_back(result);
            self
        }
    }

    impl Outbound for ScriptedLink {
        fn transport(&self) -> Transport {
            self.transport
        }

        fn send_unit(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            let result = self
                .script
                .pop_front()
                .unwrap_or_else(|| (self.fallback)(buf));
            if let Ok(n) = result {
                self.delivered.extend_from_slice(&buf[..n.min(buf.len())]);
            }
            result
        }
    }

    fn always_would_block(_: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }

    fn always_refused(_: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }

    fn accept_all(buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(1),
        }
    }

    fn statuses(rx: &crossbeam_channel::Receiver<WorkerEvent>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|event| match event {
                WorkerEvent::Status(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Runs on the test thread so the link's call count can be inspected.
    fn run_counting<L: Outbound>(
        link: &mut L,
        packet: Packet,
        count: u64,
        retry: RetryPolicy,
    ) -> (SendReport, crossbeam_channel::Receiver<WorkerEvent>) {
        let (tx, rx) = unbounded();
        let report = Transmitter::new(link, packet, count, retry, tx).run();
        (report, rx)
    }

    impl<L: Outbound> Outbound for &mut L {
        fn transport(&self) -> Transport {
            (**self).transport()
        }

        fn send_unit(&mut self, buf: &[u8]) -> io::Result<usize> {
            (**self).send_unit(buf)
        }
    }

    #[test]
    fn test_tcp_all_sent() {
        let mut link = ScriptedLink::new(Transport::Tcp, accept_all);
        let packet = Packet::from_bytes(vec![7u8; 16]);
        let (report, rx) = run_counting(&mut link, packet, 5, fast_retry());

        assert_eq!(report.sent, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(report.retries, 0);
        assert_eq!(link.calls, 5);
        assert_eq!(link.delivered.len(), 80);

        let texts = statuses(&rx);
        assert_eq!(texts.iter().filter(|t| *t == "-sent packet.").count(), 5);
        assert_eq!(texts.last().unwrap(), "-Finished sending all packets.");
    }

    #[test]
    fn test_tcp_always_transient_attempts_four_times_per_unit() {
        let mut link = ScriptedLink::new(Transport::Tcp, always_would_block);
        let packet = Packet::from_bytes(vec![1u8; 8]);
        let (report, rx) = run_counting(&mut link, packet, 3, fast_retry());

        assert_eq!(link.calls, 12);
        assert_eq!(report.attempts, 12);
        assert_eq!(report.retries, 9);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 3);

        let texts = statuses(&rx);
        let retry_msgs = texts.iter().filter(|t| t.contains("retransmitting")).count();
        let giveups = texts.iter().filter(|t| t.contains("too many times")).count();
        assert_eq!(retry_msgs, 9);
        assert_eq!(giveups, 3);
    }

    #[test]
    fn test_tcp_retry_then_success_resets_counter() {
        let would_block = || Err(io::Error::from(io::ErrorKind::WouldBlock));
        let mut link = ScriptedLink::new(Transport::Tcp, accept_all)
            .then(would_block())
            .then(would_block())
            .then(Ok(4))
            .then(would_block())
            .then(would_block())
            .then(would_block())
            .then(Ok(4));
        let packet = Packet::from_bytes(vec![3u8; 4]);
        let (report, _rx) = run_counting(&mut link, packet, 2, fast_retry());

        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.retries, 5);
    }

    #[test]
    fn test_tcp_progress_resets_stall_budget() {
        // Slow reader: every write moves two bytes, then the buffer is full.
        let mut link = ScriptedLink::new(Transport::Tcp, accept_all);
        for _ in 0..5 {
            link = link
                .then(Ok(2))
                .then(Err(io::Error::from(io::ErrorKind::WouldBlock)));
        }
        link = link.then(Ok(2));
        let packet = Packet::from_bytes((0u8..12).collect::<Vec<u8>>());
        let (report, rx) = run_counting(&mut link, packet, 1, fast_retry());

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.retries, 5);
        assert_eq!(link.calls, 11);
        assert_eq!(link.delivered, (0u8..12).collect::<Vec<_>>());
        assert!(!statuses(&rx).iter().any(|t| t.contains("too many times")));
    }

    #[test]
    fn test_tcp_failed_unit_not_resent_later() {
        let mut link = ScriptedLink::new(Transport::Tcp, accept_all)
            .then(Err(io::Error::from(io::ErrorKind::WouldBlock)))
            .then(Err(io::Error::from(io::ErrorKind::WouldBlock)))
            .then(Err(io::Error::from(io::ErrorKind::WouldBlock)))
            .then(Err(io::Error::from(io::ErrorKind::WouldBlock)));
        let packet = Packet::from_bytes(vec![9u8; 4]);
        let (report, _rx) = run_counting(&mut link, packet, 3, fast_retry());

        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 2);
        assert_eq!(link.calls, 6);
    }

    #[test]
    fn test_tcp_other_error_not_retried() {
        let mut link = ScriptedLink::new(Transport::Tcp, always_refused);
        let packet = Packet::from_bytes(vec![0u8; 4]);
        let (report, rx) = run_counting(&mut link, packet, 4, fast_retry());

        assert_eq!(link.calls, 4);
        assert_eq!(report.retries, 0);
        assert_eq!(report.failed, 4);
        let texts = statuses(&rx);
        assert_eq!(
            texts.iter().filter(|t| t.contains("unexpected error")).count(),
            4
        );
    }

    #[test]
    fn test_tcp_partial_writes_resume() {
        let mut link = ScriptedLink::new(Transport::Tcp, accept_all)
            .then(Ok(3))
            .then(Err(io::Error::from(io::ErrorKind::WouldBlock)))
            .then(Ok(2));
        let packet = Packet::from_bytes(b"abcdefgh".to_vec());
        let (report, _rx) = run_counting(&mut link, packet, 1, fast_retry());

        assert_eq!(report.sent, 1);
        assert_eq!(link.delivered, b"abcdefgh");
        assert_eq!(link.calls, 4);
    }

    #[test]
    fn test_udp_always_failing_never_retries() {
        let mut link = ScriptedLink::new(Transport::Udp, always_would_block);
        let packet = Packet::from_bytes(vec![5u8; 8]);
        let (report, rx) = run_counting(&mut link, packet, 6, fast_retry());

        assert_eq!(link.calls, 6);
        assert_eq!(report.retries, 0);
        assert_eq!(report.failed, 6);

        let texts = statuses(&rx);
        let failures = texts.iter().filter(|t| t.contains("sendto failed")).count();
        assert_eq!(failures, 6);
        assert!(!texts.iter().any(|t| t.contains("retransmitting")));
    }

    #[test]
    fn test_finished_event_carries_report() {
        let (tx, rx) = unbounded();
        let link = ScriptedLink::new(Transport::Udp, accept_all);
        let packet = Packet::from_bytes(vec![1u8; 2]);
        let transmitter = Transmitter::new(link, packet, 2, fast_retry(), tx);
        assert_eq!(transmitter.state(), TransmitState::Idle);
        let report = transmitter.run();

        let finished: Vec<_> = rx
            .try_iter()
            .filter_map(|event| match event {
                WorkerEvent::SendFinished(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![report]);
        assert_eq!(report.sent, 2);
    }

    #[test]
    fn test_run_survives_dropped_receiver() {
        let (tx, rx) = unbounded();
        drop(rx);
        let link = ScriptedLink::new(Transport::Tcp, accept_all);
        let packet = Packet::from_bytes(vec![1u8; 2]);
        let report = Transmitter::new(link, packet, 3, fast_retry(), tx).run();
        assert_eq!(report.sent, 3);
    }
}

//! Helpers shared by the Volley integration tests.
//!
//! Loopback sessions are timing-sensitive; waits here are generous and
//! stretched further on CI.

use crossbeam_channel::Receiver;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use volley_core::{SessionEvent, TransferResult};

/// Check if running in CI environment
pub fn is_ci_environment() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
}

/// Upper bound for waiting on a loopback event.
pub fn event_timeout() -> Duration {
    if is_ci_environment() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(5)
    }
}

/// Scheduling slack added to timing assertions.
pub fn timing_slack() -> Duration {
    if is_ci_environment() {
        Duration::from_millis(1500)
    } else {
        Duration::from_millis(400)
    }
}

/// Collect events until `done` matches one (inclusive) or the timeout runs
/// out.
///
/// # Panics
///
/// Panics if no event matches before [`event_timeout`].
pub fn collect_until<F>(events: &Receiver<SessionEvent>, mut done: F) -> Vec<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + event_timeout();
    let mut seen = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) => {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    return seen;
                }
            }
            Err(_) => panic!("timed out waiting for event; saw {seen:?}"),
        }
    }
}

/// Wait for a result reporting at least `count` packets.
pub fn wait_for_count(events: &Receiver<SessionEvent>, count: u64) -> TransferResult {
    let seen = collect_until(events, |event| {
        matches!(event, SessionEvent::Result(r) if r.packet_count >= count)
    });
    match seen.last() {
        Some(SessionEvent::Result(result)) => *result,
        other => panic!("expected a result, got {other:?}"),
    }
}

/// Write a source file for a client session.
pub fn source_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// The packet a client builds from `contents` at `size` bytes.
pub fn expected_packet(contents: &[u8], size: usize) -> Vec<u8> {
    let mut packet = contents[..contents.len().min(size)].to_vec();
    packet.resize(size, 0);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_packet_pads_and_truncates() {
        assert_eq!(expected_packet(b"abc", 5), b"abc\0\0");
        assert_eq!(expected_packet(b"abcdef", 2), b"ab");
    }
}

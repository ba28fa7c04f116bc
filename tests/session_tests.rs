//! End-to-end sessions over loopback.
//!
//! Each test runs a real server and client through `SessionController`.

use std::fs;
use std::net::{Ipv4Addr, TcpListener};
use std::time::Instant;
use tempfile::TempDir;
use volley_core::{
    EngineConfig, Remote, SessionController, SessionEvent, SetupError, TransferResult,
    TransferSession, Transport,
};
use volley_integration_tests::{
    collect_until, expected_packet, source_file, timing_slack, wait_for_count,
};
use volley_transport::NetContext;

fn controller(
    net: &NetContext,
) -> (SessionController, crossbeam_channel::Receiver<SessionEvent>) {
    SessionController::new(net, EngineConfig::default())
}

fn loopback() -> Remote {
    Remote::Ip(Ipv4Addr::LOCALHOST.to_string())
}

fn start_server(
    net: &NetContext,
    transport: Transport,
    output: &std::path::Path,
    expected: usize,
) -> (SessionController, crossbeam_channel::Receiver<SessionEvent>, u16) {
    let (mut server, events) = controller(net);
    server
        .connect(TransferSession::server(transport, 0, output).with_expected_packet_size(expected))
        .unwrap();
    let port = server.local_addr().unwrap().port();

    // Start-of-session events arrive before anything else.
    let preamble = collect_until(&events, |e| *e == SessionEvent::ConnectionReady(true));
    assert_eq!(
        preamble[0],
        SessionEvent::Result(TransferResult::cleared(transport))
    );

    (server, events, port)
}

#[test]
fn test_udp_round_trip_three_copies() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let output = dir.path().join("received.bin");
    let (mut server, server_events, port) = start_server(&net, Transport::Udp, &output, 0);

    let contents = b"volley over udp";
    let source = source_file(dir.path(), "source.txt", contents);
    let (mut client, client_events) = controller(&net);
    client
        .connect(TransferSession::client(
            Transport::Udp,
            loopback(),
            port,
            &source,
            32,
            3,
        ))
        .unwrap();
    client.wait();

    let result = wait_for_count(&server_events, 3);
    assert_eq!(result.packet_size, 32);
    assert_eq!(result.transport, Transport::Udp);
    server.finish();

    let packet = expected_packet(contents, 32);
    assert_eq!(fs::read(&output).unwrap(), packet.repeat(3));

    let sent = client_events
        .try_iter()
        .find_map(|e| match e {
            SessionEvent::Result(r) => Some(r),
            _ => None,
        })
        .unwrap();
    assert_eq!(sent.packet_count, 3);
}

#[test]
fn test_tcp_round_trip_counts_units() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let output = dir.path().join("received.bin");
    let (mut server, server_events, port) = start_server(&net, Transport::Tcp, &output, 64);

    let source = source_file(dir.path(), "source.bin", &[0xAB; 100]);
    let (mut client, _client_events) = controller(&net);
    client
        .connect(TransferSession::client(
            Transport::Tcp,
            loopback(),
            port,
            &source,
            64,
            4,
        ))
        .unwrap();
    client.wait();

    let result = wait_for_count(&server_events, 4);
    assert_eq!(result.packet_count, 4);
    assert_eq!(result.packet_size, 64);
    server.finish();

    assert_eq!(fs::read(&output).unwrap(), vec![0xAB; 256]);
}

#[test]
fn test_server_finish_emits_final_events_in_order() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let output = dir.path().join("received.bin");
    let (mut server, server_events, port) = start_server(&net, Transport::Udp, &output, 0);

    let source = source_file(dir.path(), "source.txt", b"x");
    let (mut client, _) = controller(&net);
    client
        .connect(TransferSession::client(
            Transport::Udp,
            loopback(),
            port,
            &source,
            4,
            1,
        ))
        .unwrap();
    client.wait();
    let last_live = wait_for_count(&server_events, 1);

    server.finish();
    let tail: Vec<_> = server_events.try_iter().collect();
    let n = tail.len();
    assert!(n >= 3, "missing closing events: {tail:?}");
    assert_eq!(tail[n - 3], SessionEvent::Status("-Receive finished".into()));
    assert_eq!(tail[n - 2], SessionEvent::Result(last_live));
    assert_eq!(tail[n - 1], SessionEvent::ConnectionReady(false));
}

#[test]
fn test_output_accumulates_across_sessions() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let output = dir.path().join("received.bin");
    fs::write(&output, b"old").unwrap();

    for round in 1..=2u8 {
        let (mut server, events, port) = start_server(&net, Transport::Udp, &output, 0);
        let source = source_file(dir.path(), "source.bin", &[round; 2]);
        let (mut client, _) = controller(&net);
        client
            .connect(TransferSession::client(
                Transport::Udp,
                loopback(),
                port,
                &source,
                2,
                1,
            ))
            .unwrap();
        client.wait();
        wait_for_count(&events, 1);
        server.finish();
    }

    assert_eq!(fs::read(&output).unwrap(), b"old\x01\x01\x02\x02");
}

#[test]
fn test_tcp_refused_peer_reports_each_failed_send() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let port = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let source = source_file(dir.path(), "source.txt", b"data");

    let (mut client, events) = controller(&net);
    let started = Instant::now();
    client
        .connect(TransferSession::client(
            Transport::Tcp,
            loopback(),
            port,
            &source,
            4,
            2,
        ))
        .unwrap();
    assert!(started.elapsed() < EngineConfig::default().connect_timeout + timing_slack());
    client.wait();

    let seen = collect_until(&events, |e| *e == SessionEvent::ConnectionReady(false));
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Alert(_))));
    let failures = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::Status(t) if t.starts_with("-send failed")))
        .count();
    assert_eq!(failures, 2);
    let sent = seen.iter().find_map(|e| match e {
        SessionEvent::Result(r) => Some(r.packet_count),
        _ => None,
    });
    assert_eq!(sent, Some(0));
}

#[test]
fn test_packet_ceiling_alerts_before_connecting() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let source = source_file(dir.path(), "source.txt", b"data");
    let config = EngineConfig {
        max_packet_size: 8,
        ..EngineConfig::default()
    };
    let (mut client, events) = SessionController::new(&net, config);

    // Nothing listens on port 9; the ceiling check fails before any connect.
    let err = client
        .connect(TransferSession::client(
            Transport::Tcp,
            loopback(),
            9,
            &source,
            16,
            1,
        ))
        .unwrap_err();

    assert!(matches!(err, SetupError::Packet(_)));
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Alert("Packet size too big, use a number no larger than 8".into())
    );
}

#[test]
fn test_unwritable_output_alerts() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let (mut server, events) = controller(&net);

    // A directory cannot be opened for appending.
    let err = server
        .connect(TransferSession::server(Transport::Udp, 0, dir.path()))
        .unwrap_err();

    assert!(matches!(err, SetupError::Sink(_)));
    match events.try_recv().unwrap() {
        SessionEvent::Alert(text) => assert!(text.starts_with("Can't open file at:")),
        other => panic!("expected alert, got {other:?}"),
    }
}

#[test]
fn test_dropping_controller_stops_server() {
    let dir = TempDir::new().unwrap();
    let net = NetContext::init();
    let output = dir.path().join("received.bin");
    let (server, events, _port) = start_server(&net, Transport::Tcp, &output, 16);

    let started = Instant::now();
    drop(server);
    assert!(started.elapsed() < timing_slack() * 2);

    let tail: Vec<_> = events.try_iter().collect();
    assert_eq!(tail.last(), Some(&SessionEvent::ConnectionReady(false)));
}

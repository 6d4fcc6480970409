use rcon_client::{call_with, CycleConfig, RconError, Session};
use rcon_core::{ErrorKind, Label, Outcome, ServerDescriptor};
use rcon_mock::{MockConfig, MockEvent, MockServer, Responder};
use std::net::TcpListener;
use std::time::{Duration, Instant};

const PASSWORD: &str = "hunter2";

fn config(timeout_ms: u64) -> CycleConfig {
    CycleConfig::new(Duration::from_millis(timeout_ms)).with_response_idle(Duration::from_millis(50))
}

fn fragments(bodies: &[&str]) -> Responder {
    Responder::Fragments(bodies.iter().map(|b| b.to_string()).collect())
}

#[test]
fn returns_trimmed_reply() {
    let server = MockServer::start(MockConfig::new(PASSWORD, fragments(&["Day 214, 13:05\n", ""]))).unwrap();
    let outcome = call_with(&server.descriptor(PASSWORD, "Island"), "getgametime", &config(2000));
    assert_eq!(outcome, Outcome::success("Day 214, 13:05"));
}

#[test]
fn concatenates_three_packet_reply() {
    let server = MockServer::start(MockConfig::new(PASSWORD, fragments(&["foo", "bar", ""]))).unwrap();
    let outcome = call_with(&server.descriptor(PASSWORD, "Island"), "listplayers", &config(2000));
    assert_eq!(outcome.text(), Some("foobar"));
}

#[test]
fn reply_without_terminator_ends_after_quiet_period() {
    let server = MockServer::start(MockConfig::new(
        PASSWORD,
        fragments(&["Server received, But no response!!"]),
    ))
    .unwrap();
    let started = Instant::now();
    let outcome = call_with(&server.descriptor(PASSWORD, "Island"), "broadcast hi", &config(5000));
    assert!(outcome.is_acknowledgement());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn world_saved_is_acknowledgement() {
    let server = MockServer::start(MockConfig::new(PASSWORD, Responder::Echo)).unwrap();
    let outcome = call_with(&server.descriptor(PASSWORD, "Island"), "saveworld", &config(2000));
    assert!(outcome.is_acknowledgement());
}

#[test]
fn wrong_password_is_authentication_failure() {
    let server = MockServer::start(MockConfig::new(PASSWORD, Responder::Echo)).unwrap();
    let outcome = call_with(&server.descriptor("letmein", "Island"), "listplayers", &config(2000));
    assert_eq!(outcome.kind(), Some(ErrorKind::AuthenticationFailed));
    assert!(server.wait_for(&MockEvent::Authenticated { ok: false }, Duration::from_secs(2)));
    assert!(server.wait_for(&MockEvent::Closed, Duration::from_secs(2)));
}

#[test]
fn silent_server_times_out_and_is_closed() {
    let server = MockServer::start(MockConfig::new(PASSWORD, Responder::Silent)).unwrap();
    let timeout = Duration::from_millis(500);

    let started = Instant::now();
    let outcome = call_with(&server.descriptor(PASSWORD, "Island"), "listplayers", &CycleConfig::new(timeout));
    let elapsed = started.elapsed();

    assert_eq!(outcome.kind(), Some(ErrorKind::ConnectionTimeout));
    assert!(elapsed >= Duration::from_millis(450), "returned early: {:?}", elapsed);
    assert!(elapsed < timeout + Duration::from_secs(1), "overran: {:?}", elapsed);
    assert!(server.wait_for(&MockEvent::Closed, Duration::from_secs(2)));
}

#[test]
fn silent_after_login_times_out() {
    let server = MockServer::start(MockConfig::new(PASSWORD, Responder::SilentAfterAuth)).unwrap();
    let outcome = call_with(&server.descriptor(PASSWORD, "Island"), "listplayers", &config(400));
    match outcome {
        Outcome::Failure { kind, detail } => {
            assert_eq!(kind, ErrorKind::ConnectionTimeout);
            assert!(detail.contains("awaiting response"), "{}", detail);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn closed_port_is_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let server = ServerDescriptor::new("127.0.0.1", port, PASSWORD, Label::new("Gone", "PvE"));
    let outcome = call_with(&server, "listplayers", &config(2000));
    assert_eq!(outcome.kind(), Some(ErrorKind::ConnectionRefused));
}

#[test]
fn gateway_reply_is_relay_error() {
    let server = MockServer::start(MockConfig::new(
        PASSWORD,
        Responder::Http("HTTP/1.1 502 Bad Gateway\r\nServer: cloudflare\r\n\r\n".to_string()),
    ))
    .unwrap();
    let outcome = call_with(&server.descriptor(PASSWORD, "Island"), "listplayers", &config(2000));
    assert_eq!(outcome.kind(), Some(ErrorKind::UpstreamRelayError));
    assert!(!outcome.should_alert());
}

#[test]
fn sequential_calls_use_independent_sessions() {
    let server = MockServer::start(MockConfig::new(PASSWORD, Responder::Echo)).unwrap();
    let descriptor = server.descriptor(PASSWORD, "Island");

    for _ in 0..2 {
        let outcome = call_with(&descriptor, "listplayers", &config(2000));
        assert_eq!(outcome.text(), Some("listplayers"));
    }

    let mut connects = 0;
    let mut ids = vec![];
    while let Some(event) = server.next_event(Duration::from_millis(500)) {
        match event {
            MockEvent::Connected => connects += 1,
            MockEvent::Command { request_id, .. } => ids.push(request_id),
            _ => {}
        }
    }
    assert_eq!(connects, 2);
    assert_eq!(ids, vec![1, 1]);
}

#[test]
fn session_runs_several_commands() {
    let server = MockServer::start(MockConfig::new(PASSWORD, Responder::Echo)).unwrap();
    let mut session =
        Session::connect_and_authenticate("127.0.0.1", server.port(), PASSWORD, Duration::from_secs(2)).unwrap();
    assert!(session.is_authenticated());

    assert_eq!(session.run_command("first", Duration::from_secs(2)).unwrap(), "first");
    assert_eq!(session.run_command("second", Duration::from_secs(2)).unwrap(), "second");

    session.close();
    assert!(!session.is_connected());
    assert!(matches!(
        session.run_command("third", Duration::from_secs(1)),
        Err(RconError::Unknown(_))
    ));
}

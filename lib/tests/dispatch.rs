use rcon_fanout::{dispatch_all, Coordinator, CycleConfig, ErrorKind, ServerDescriptor};
use rcon_mock::{MockConfig, MockServer, Responder};
use std::time::Duration;

const PASSWORD: &str = "hunter2";

fn config(timeout_ms: u64) -> CycleConfig {
    CycleConfig::new(Duration::from_millis(timeout_ms)).with_response_idle(Duration::from_millis(50))
}

fn echo_server() -> MockServer {
    MockServer::start(MockConfig::new(PASSWORD, Responder::Echo)).unwrap()
}

fn silent_server() -> MockServer {
    MockServer::start(MockConfig::new(PASSWORD, Responder::Silent)).unwrap()
}

#[test]
fn dead_server_does_not_delay_others() {
    let servers = vec![echo_server(), silent_server(), echo_server(), echo_server()];
    let descriptors: Vec<ServerDescriptor> = servers
        .iter()
        .enumerate()
        .map(|(i, s)| s.descriptor(PASSWORD, &format!("Server{}", i)))
        .collect();

    let coordinator = Coordinator::with_config(config(1000));
    let deliveries: Vec<_> = coordinator.dispatch(&descriptors, "listplayers").collect();

    assert_eq!(deliveries.len(), 4);
    let last = deliveries.last().unwrap();
    assert_eq!(last.index, 1);
    assert_eq!(last.outcome.kind(), Some(ErrorKind::ConnectionTimeout));

    for delivery in &deliveries[..3] {
        assert_ne!(delivery.index, 1);
        assert_eq!(delivery.outcome.text(), Some("listplayers"));
        assert!(delivery.elapsed < Duration::from_millis(900), "{:?}", delivery.elapsed);
    }
}

#[test]
fn every_descriptor_gets_a_result() {
    let good = echo_server();
    let wrong_password = echo_server();
    let mut refused = good.descriptor(PASSWORD, "Gone");
    refused.port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let descriptors = vec![
        good.descriptor(PASSWORD, "Good"),
        wrong_password.descriptor("nope", "BadPassword"),
        refused,
    ];

    let mut deliveries = dispatch_all(&descriptors, "saveworld", config(2000));
    deliveries.sort_by_key(|d| d.index);

    assert_eq!(deliveries.len(), 3);
    assert!(deliveries[0].outcome.is_acknowledgement());
    assert_eq!(deliveries[1].outcome.kind(), Some(ErrorKind::AuthenticationFailed));
    assert_eq!(deliveries[2].outcome.kind(), Some(ErrorKind::ConnectionRefused));
    assert_eq!(deliveries[1].server.label.name, "BadPassword");
}

#[test]
fn pairs_carry_their_own_commands() {
    let server = echo_server();
    let descriptor = server.descriptor(PASSWORD, "Island");
    let coordinator = Coordinator::with_config(config(2000));

    let mut texts: Vec<(usize, String)> = coordinator
        .dispatch_pairs(vec![
            (descriptor.clone(), "first".to_string()),
            (descriptor, "second".to_string()),
        ])
        .map(|d| (d.index, d.outcome.text().unwrap_or_default().to_string()))
        .collect();
    texts.sort();

    assert_eq!(texts, vec![(0, "first".to_string()), (1, "second".to_string())]);
}

#[test]
fn cancelled_cycle_is_not_delivered() {
    let fast = echo_server();
    let slow = silent_server();
    let slow_descriptor = slow.descriptor(PASSWORD, "Slow");

    let coordinator = Coordinator::with_config(config(600));
    let mut dispatch = coordinator.dispatch(&[fast.descriptor(PASSWORD, "Fast"), slow_descriptor.clone()], "listplayers");
    assert_eq!(dispatch.len(), 2);
    assert!(coordinator.in_flight(&slow_descriptor.key()));

    assert_eq!(coordinator.cancel(&slow_descriptor.key()), 1);
    assert_eq!(coordinator.cancel(&slow_descriptor.key()), 0);
    // Still holding its socket until the deadline
    assert!(coordinator.in_flight(&slow_descriptor.key()));

    let first = dispatch.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.index, 0);
    // Channel closes once the cancelled worker gives up
    assert!(dispatch.next().is_none());
    assert_eq!(dispatch.delivered(), 1);
    assert!(!coordinator.in_flight(&slow_descriptor.key()));
}

#[test]
fn refresh_replaces_in_flight_cycle() {
    let slow = MockServer::start(MockConfig::new(PASSWORD, Responder::SilentAfterAuth)).unwrap();
    let descriptor = slow.descriptor(PASSWORD, "Slow");
    let coordinator = Coordinator::with_config(config(400));

    let stale = coordinator.dispatch(std::slice::from_ref(&descriptor), "listplayers");
    let fresh = coordinator.refresh(&descriptor, "listplayers");
    // The cancelled cycle and its replacement are both still running
    assert!(coordinator.in_flight(&descriptor.key()));

    assert_eq!(stale.count(), 0);
    let results: Vec<_> = fresh.collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome.kind(), Some(ErrorKind::ConnectionTimeout));
    assert!(!coordinator.in_flight(&descriptor.key()));
}

#[test]
fn results_arrive_through_callback() {
    let servers = [echo_server(), echo_server()];
    let descriptors: Vec<_> = servers.iter().map(|s| s.descriptor(PASSWORD, "Island")).collect();

    let mut seen = 0;
    Coordinator::with_config(config(2000))
        .dispatch(&descriptors, "getchat")
        .for_each_delivery(|delivery| {
            assert!(delivery.outcome.is_success());
            seen += 1;
        });
    assert_eq!(seen, 2);
}

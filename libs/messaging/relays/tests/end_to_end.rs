//! Host and client monitors relaying over real loopback connections

use parking_lot::Mutex;
use state_relay::{
    Framing, MonitorConfig, MonitorError, MonitorState, PrintCallback, ProcessType, RelayLimits,
    StateMessage, StateMonitor, Tensor, Value, RUNNING_MESSAGE,
};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a host on a background thread; `start()` blocks until a client arrives
fn start_host(config: MonitorConfig) -> JoinHandle<Result<StateMonitor, MonitorError>> {
    std::thread::spawn(move || {
        let mut host = StateMonitor::new(config)?;
        host.start()?;
        Ok(host)
    })
}

fn start_client(config: MonitorConfig) -> StateMonitor {
    let deadline = Instant::now() + WAIT;
    let mut client = StateMonitor::new(config).unwrap();
    loop {
        match client.start() {
            Ok(()) => return client,
            Err(e) if Instant::now() < deadline => {
                assert!(matches!(e, MonitorError::Transport(_)), "unexpected error: {e}");
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("client never connected: {e}"),
        }
    }
}

fn connected_pair(host: MonitorConfig, client: MonitorConfig) -> (StateMonitor, StateMonitor) {
    let host = start_host(host);
    let client = start_client(client);
    let host = host.join().unwrap().unwrap();
    (host, client)
}

fn next_message(host: &StateMonitor) -> Option<StateMessage> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(message) = host.get().unwrap() {
            return Some(message);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

fn sample_message() -> StateMessage {
    let t = Tensor::from_slice(vec![2, 2], &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    StateMessage::new().with("x", 1).unwrap().with("t", t).unwrap()
}

fn limits(framing: Framing) -> RelayLimits {
    RelayLimits {
        framing,
        ..Default::default()
    }
}

fn relays_message_with_tensor(framing: Framing) {
    let port = free_port();
    let (mut host, mut client) = connected_pair(
        MonitorConfig::host("127.0.0.1", port).with_limits(limits(framing)),
        MonitorConfig::client("127.0.0.1", port).with_limits(limits(framing)),
    );
    assert!(host.is_running());
    assert!(client.is_running());

    client.put(sample_message()).unwrap();
    let received = next_message(&host).expect("host never received the message");

    assert_eq!(received, sample_message());
    assert!(!received.contains_key("HeLlO"));
    let tensor = received.get("t").and_then(Value::as_tensor).unwrap();
    assert_eq!(tensor.shape(), &[2, 2]);
    assert_eq!(tensor.as_bytes().len(), 16);
    assert_eq!(tensor.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

    client.end().unwrap();
    host.end().unwrap();
}

#[test]
fn relays_message_with_tensor_length_prefixed() {
    relays_message_with_tensor(Framing::LengthPrefixed);
}

#[test]
fn relays_message_with_tensor_single_read() {
    relays_message_with_tensor(Framing::SingleRead);
}

#[test]
fn relays_many_messages_in_order() {
    let port = free_port();
    let (mut host, mut client) = connected_pair(
        MonitorConfig::host("127.0.0.1", port),
        MonitorConfig::client("127.0.0.1", port),
    );

    for seq in 0..50 {
        client.put(StateMessage::new().with("seq", seq).unwrap()).unwrap();
    }

    let mut seen = Vec::new();
    while seen.len() < 50 {
        let message = next_message(&host).expect("relay stalled");
        seen.push(message.get("seq").and_then(Value::as_i64).unwrap());
    }
    assert_eq!(seen, (0..50).collect::<Vec<i64>>());
    assert_eq!(host.stats().messages_relayed, 50);
    let deadline = Instant::now() + WAIT;
    while client.stats().messages_relayed < 50 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(client.stats().messages_relayed, 50);

    client.end().unwrap();
    host.end().unwrap();
}

#[test]
fn oversized_message_is_dropped_silently() {
    let port = free_port();
    let small = RelayLimits {
        max_message_size: 256,
        ..Default::default()
    };
    let (mut host, mut client) = connected_pair(
        MonitorConfig::host("127.0.0.1", port),
        MonitorConfig::client("127.0.0.1", port).with_limits(small),
    );

    let big = StateMessage::new().with("blob", vec![0u8; 4096]).unwrap();
    client.put(big).unwrap();
    client.put(sample_message()).unwrap();

    assert_eq!(next_message(&host), Some(sample_message()));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(host.get().unwrap(), None);
    assert_eq!(client.stats().oversized_dropped, 1);

    client.end().unwrap();
    host.end().unwrap();
}

#[test]
fn roles_are_enforced_after_start() {
    let port = free_port();
    let (mut host, mut client) = connected_pair(
        MonitorConfig::host("127.0.0.1", port),
        MonitorConfig::client("127.0.0.1", port),
    );

    assert!(host.put(sample_message()).unwrap_err().is_role_mismatch());
    assert!(client.get().unwrap_err().is_role_mismatch());
    assert!(matches!(client.start(), Err(MonitorError::AlreadyStarted)));

    // The rejected put never reached the client side
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(host.get().unwrap(), None);

    client.end().unwrap();
    host.end().unwrap();
    assert!(client.put(sample_message()).is_err());
    assert!(host.put(sample_message()).unwrap_err().is_role_mismatch());
}

#[test]
fn shutdown_handle_interrupts_blocked_start() {
    let port = free_port();
    let mut host = StateMonitor::new(MonitorConfig::host("127.0.0.1", port)).unwrap();
    let handle = host.shutdown_handle();

    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        handle.trigger();
    });

    let started = Instant::now();
    let err = host.start().unwrap_err();
    assert!(err.is_cancelled(), "unexpected error: {err}");
    assert!(started.elapsed() < WAIT);
    trigger.join().unwrap();

    assert_eq!(host.state(), MonitorState::Stopped);
    assert!(matches!(host.start(), Err(MonitorError::Stopped)));
    host.end().unwrap();
}

#[test]
fn host_survives_client_going_away() {
    let port = free_port();
    let (mut host, mut client) = connected_pair(
        MonitorConfig::host("127.0.0.1", port),
        MonitorConfig::client("127.0.0.1", port),
    );

    client.put(sample_message()).unwrap();
    assert_eq!(next_message(&host), Some(sample_message()));
    client.end().unwrap();

    let deadline = Instant::now() + WAIT;
    while host.is_relaying() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!host.is_relaying());
    assert!(host.stats().connection_lost);

    // A dead relay still looks idle to the caller
    assert_eq!(host.get().unwrap(), None);
    assert!(host.is_running());
    host.end().unwrap();
}

#[test]
fn milestones_reach_print_callback() {
    let lines = Arc::new(Mutex::new(Vec::<(String, bool)>::new()));
    let sink = Arc::clone(&lines);
    let callback: PrintCallback = Arc::new(move |message: &str, verbose: bool| {
        sink.lock().push((message.to_string(), verbose));
    });

    let port = free_port();
    let host_config = MonitorConfig::host("127.0.0.1", port).with_verbose(true);
    let host = std::thread::spawn(move || {
        let mut host = StateMonitor::new(host_config)?.with_print_callback(callback);
        host.start()?;
        Ok::<_, MonitorError>(host)
    });
    let mut client = start_client(MonitorConfig::client("127.0.0.1", port));
    let mut host = host.join().unwrap().unwrap();

    let lines = lines.lock().clone();
    let messages: Vec<&str> = lines.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(messages.first(), Some(&"Waiting for client connecting..."));
    assert!(messages[1].starts_with("Client @ 127.0.0.1:"));
    assert!(messages[1].ends_with("connected!"));
    assert_eq!(messages.last(), Some(&RUNNING_MESSAGE));
    assert!(lines.iter().all(|(_, verbose)| *verbose));

    client.end().unwrap();
    host.end().unwrap();
}

#[test]
fn dropping_a_running_monitor_stops_it() {
    let port = free_port();
    let (host, client) = connected_pair(
        MonitorConfig::host("127.0.0.1", port),
        MonitorConfig::client("127.0.0.1", port),
    );

    let started = Instant::now();
    drop(client);
    drop(host);
    assert!(started.elapsed() < WAIT);
}

#[cfg(unix)]
#[test]
fn process_worker_relays_to_host() {
    let port = free_port();
    let (mut host, mut client) = connected_pair(
        MonitorConfig::host("127.0.0.1", port).with_process_type(ProcessType::Process),
        MonitorConfig::client("127.0.0.1", port).with_process_type(ProcessType::Process),
    );

    for seq in 0..5 {
        client
            .put(sample_message().with("seq", seq).unwrap())
            .unwrap();
    }
    for seq in 0..5 {
        let message = next_message(&host).expect("process relay stalled");
        assert_eq!(message.get("seq").and_then(Value::as_i64), Some(seq));
        assert_eq!(message.get("t"), sample_message().get("t"));
    }

    client.end().unwrap();
    host.end().unwrap();
    assert!(!host.is_relaying());
}

//! Relay worker loops over real loopback sockets

use network::{read_frame, shutdown_channel, write_frame, EstablishedStream, Framing};
use relay_config::RelayLimits;
use relay_core::{
    BoundedQueue, Direction, MessageQueue, RelayJob, RelaySpawner, RelayStats, ThreadSpawner,
    WorkerHandle,
};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use types::{StateMessage, Tensor, Value};

const WAIT: Duration = Duration::from_secs(5);

fn loopback_pair() -> (EstablishedStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = TcpStream::connect(addr).unwrap();
    let (stream, peer_addr) = listener.accept().unwrap();
    peer.set_read_timeout(Some(WAIT)).unwrap();
    (
        EstablishedStream {
            stream,
            peer_addr,
            local_addr: addr,
        },
        peer,
    )
}

fn spawn_worker(
    direction: Direction,
    stream: EstablishedStream,
    queue: Arc<BoundedQueue<StateMessage>>,
    limits: RelayLimits,
) -> (Box<dyn WorkerHandle>, RelayStats) {
    let stats = RelayStats::new();
    let (shutdown, _signal) = shutdown_channel();
    let job = RelayJob {
        direction,
        stream,
        queue,
        limits,
        stats: stats.clone(),
        shutdown,
    };
    (ThreadSpawner::default().spawn(job).unwrap(), stats)
}

fn message(seq: i64) -> StateMessage {
    let tensor = Tensor::from_slice(vec![2, 2], &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    StateMessage::new()
        .with("seq", seq)
        .and_then(|m| m.with("t", tensor))
        .unwrap()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn host_worker_queues_decoded_envelopes() {
    let (stream, mut peer) = loopback_pair();
    let queue = Arc::new(BoundedQueue::new(100));
    let (mut worker, stats) = spawn_worker(
        Direction::HostInbound,
        stream,
        Arc::clone(&queue),
        RelayLimits::default(),
    );

    write_frame(&mut peer, &codec::encode(&message(1)).unwrap()).unwrap();
    write_frame(&mut peer, b"definitely not msgpack").unwrap();
    write_frame(&mut peer, &codec::encode(&message(2)).unwrap()).unwrap();

    let mut received = Vec::new();
    assert!(wait_until(|| {
        if let Some(m) = queue.try_get() {
            received.push(m);
        }
        received.len() == 2
    }));
    assert_eq!(received, vec![message(1), message(2)]);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.messages_relayed, 2);
    assert_eq!(snapshot.decode_failures, 1);
    assert!(!snapshot.connection_lost);

    worker.stop().unwrap();
    assert!(worker.is_finished());
}

#[test]
fn host_worker_exits_when_peer_closes() {
    let (stream, peer) = loopback_pair();
    let queue = Arc::new(BoundedQueue::new(4));
    let (mut worker, stats) = spawn_worker(
        Direction::HostInbound,
        stream,
        queue,
        RelayLimits::default(),
    );

    drop(peer);
    assert!(wait_until(|| worker.is_finished()));
    assert!(stats.connection_lost());
    worker.stop().unwrap();
}

#[test]
fn host_worker_skips_oversized_frames() {
    let (stream, mut peer) = loopback_pair();
    let queue = Arc::new(BoundedQueue::new(4));
    let limits = RelayLimits {
        max_message_size: 512,
        ..Default::default()
    };
    let (mut worker, stats) = spawn_worker(Direction::HostInbound, stream, Arc::clone(&queue), limits);

    let big = StateMessage::new().with("blob", vec![0u8; 4096]).unwrap();
    write_frame(&mut peer, &codec::encode(&big).unwrap()).unwrap();
    write_frame(&mut peer, &codec::encode(&message(3)).unwrap()).unwrap();

    let mut got = None;
    assert!(wait_until(|| {
        got = queue.try_get();
        got.is_some()
    }));
    assert_eq!(got, Some(message(3)));
    assert_eq!(stats.snapshot().oversized_dropped, 1);
    worker.stop().unwrap();
}

#[test]
fn host_worker_single_read_framing() {
    let (stream, mut peer) = loopback_pair();
    let queue = Arc::new(BoundedQueue::new(4));
    let limits = RelayLimits {
        framing: Framing::SingleRead,
        ..Default::default()
    };
    let (mut worker, _stats) = spawn_worker(Direction::HostInbound, stream, Arc::clone(&queue), limits);

    peer.write_all(&codec::encode(&message(9)).unwrap()).unwrap();

    let mut got = None;
    assert!(wait_until(|| {
        got = queue.try_get();
        got.is_some()
    }));
    assert_eq!(got, Some(message(9)));
    worker.stop().unwrap();
}

#[test]
fn client_worker_sends_in_queue_order_and_drops_oversized() {
    let (stream, mut peer) = loopback_pair();
    let queue = Arc::new(BoundedQueue::new(100));
    let limits = RelayLimits {
        max_message_size: 512,
        ..Default::default()
    };

    queue.put_overflow_aware(message(1));
    queue.put_overflow_aware(StateMessage::new().with("blob", Value::Bytes(vec![7; 4096])).unwrap());
    queue.put_overflow_aware(message(2));

    let (mut worker, stats) = spawn_worker(Direction::ClientOutbound, stream, Arc::clone(&queue), limits);

    let first = read_frame(&mut peer, 1 << 20).unwrap().unwrap();
    let second = read_frame(&mut peer, 1 << 20).unwrap().unwrap();
    assert_eq!(codec::decode(&first), Some(message(1)));
    assert_eq!(codec::decode(&second), Some(message(2)));

    // Wakes on put, not only on the idle poll
    queue.put_overflow_aware(message(3));
    let third = read_frame(&mut peer, 1 << 20).unwrap().unwrap();
    assert_eq!(codec::decode(&third), Some(message(3)));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.messages_relayed, 3);
    assert_eq!(snapshot.oversized_dropped, 1);

    worker.stop().unwrap();
    assert!(MessageQueue::is_empty(queue.as_ref()));
}

#[test]
fn stop_interrupts_idle_workers() {
    for direction in [Direction::HostInbound, Direction::ClientOutbound] {
        let (stream, _peer) = loopback_pair();
        let queue = Arc::new(BoundedQueue::new(4));
        let (mut worker, _stats) = spawn_worker(direction, stream, queue, RelayLimits::default());

        std::thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        worker.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(worker.is_finished());
    }
}

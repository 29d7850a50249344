//! Inter-process bounded queue
//!
//! Created before the worker process is forked. Afterwards each process
//! attaches one endpoint:
//!
//! - the producer gets a local outgoing buffer and a feeder thread that
//!   encodes buffered messages onto the socket pair;
//! - the consumer gets a collector thread that decodes frames off the
//!   socket into a local incoming buffer.
//!
//! Both buffers are [`BoundedQueue`]s, so each side keeps drop-oldest
//! semantics and neither `put` nor `get` waits on the other process.
//!
//! Capacity bounds each local buffer, not the channel as a whole. The
//! producer buffer, the socket pair and the consumer buffer together can
//! hold roughly twice `capacity` plus whatever the kernel has in flight,
//! and `len()` only reports this process's buffers.

use super::{BoundedQueue, Endpoint, MessageQueue};
use crate::{RelayError, RelayResult};
use network::{read_frame, write_frame, MAX_FRAME_LEN};
use parking_lot::Mutex;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};
use types::StateMessage;

const FEEDER_POLL: Duration = Duration::from_millis(50);

pub struct IpcQueue {
    capacity: usize,
    outgoing: Arc<BoundedQueue<StateMessage>>,
    incoming: Arc<BoundedQueue<StateMessage>>,
    producer_end: Mutex<Option<UnixStream>>,
    consumer_end: Mutex<Option<UnixStream>>,
    attached: Mutex<Vec<AttachedEnd>>,
    closed: Arc<AtomicBool>,
    dropped_frames: Arc<AtomicU64>,
}

struct AttachedEnd {
    control: UnixStream,
    pump: JoinHandle<()>,
}

impl IpcQueue {
    pub fn new(capacity: usize) -> RelayResult<Self> {
        let (producer_end, consumer_end) = UnixStream::pair()
            .map_err(|e| RelayError::ipc(format!("failed to create socket pair: {e}")))?;

        Ok(Self {
            capacity: capacity.max(1),
            outgoing: Arc::new(BoundedQueue::new(capacity)),
            incoming: Arc::new(BoundedQueue::new(capacity)),
            producer_end: Mutex::new(Some(producer_end)),
            consumer_end: Mutex::new(Some(consumer_end)),
            attached: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicBool::new(false)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Frames that could not cross the socket pair
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    fn start_feeder(&self, mut socket: UnixStream) -> RelayResult<JoinHandle<()>> {
        let outgoing = Arc::clone(&self.outgoing);
        let closed = Arc::clone(&self.closed);
        let dropped = Arc::clone(&self.dropped_frames);

        spawn_pump("ipc-feeder", move || {
            while !closed.load(Ordering::Acquire) {
                let Some(message) = outgoing.pop_timeout(FEEDER_POLL) else {
                    continue;
                };
                let frame = match codec::encode(&message) {
                    Ok(frame) => frame,
                    Err(e) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(error = %e, "Dropped unencodable message");
                        continue;
                    }
                };
                if let Err(e) = write_frame(&mut socket, &frame) {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    if e.is_fatal() {
                        debug!(error = %e, "IPC peer gone, feeder exiting");
                        break;
                    }
                    debug!(error = %e, bytes = frame.len(), "Dropped frame on IPC channel");
                }
            }
        })
    }

    fn start_collector(&self, mut socket: UnixStream) -> RelayResult<JoinHandle<()>> {
        let incoming = Arc::clone(&self.incoming);
        let closed = Arc::clone(&self.closed);
        let dropped = Arc::clone(&self.dropped_frames);

        spawn_pump("ipc-collector", move || loop {
            match read_frame(&mut socket, MAX_FRAME_LEN) {
                Ok(Some(frame)) => match codec::decode_checked(&frame) {
                    Ok(message) => {
                        incoming.put_overflow_aware(message);
                    }
                    Err(e) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(error = %e, "Discarded undecodable IPC frame");
                    }
                },
                Ok(None) => {
                    debug!("IPC channel closed");
                    break;
                }
                Err(e) => {
                    if !closed.load(Ordering::Acquire) && !e.is_fatal() {
                        warn!(error = %e, "IPC channel read failed");
                    }
                    break;
                }
            }
        })
    }
}

impl MessageQueue for IpcQueue {
    fn put_overflow_aware(&self, message: StateMessage) -> Option<StateMessage> {
        self.outgoing.put_overflow_aware(message)
    }

    fn try_get(&self) -> Option<StateMessage> {
        self.incoming.try_get()
    }

    fn len(&self) -> usize {
        self.outgoing.len() + self.incoming.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn notifier(&self) -> Arc<Notify> {
        self.incoming.notifier()
    }

    fn attach(&self, endpoint: Endpoint) -> RelayResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::ipc("queue is closed"));
        }

        let end = match endpoint {
            Endpoint::Producer => &self.producer_end,
            Endpoint::Consumer => &self.consumer_end,
        };
        let socket = end
            .lock()
            .take()
            .ok_or_else(|| RelayError::ipc(format!("{endpoint:?} end already attached")))?;

        let control = socket
            .try_clone()
            .map_err(|e| RelayError::ipc(format!("failed to clone IPC socket: {e}")))?;
        let pump = match endpoint {
            Endpoint::Producer => self.start_feeder(socket)?,
            Endpoint::Consumer => self.start_collector(socket)?,
        };

        debug!(?endpoint, "Attached IPC queue endpoint");
        self.attached.lock().push(AttachedEnd { control, pump });
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.outgoing.wake_all();

        let attached = std::mem::take(&mut *self.attached.lock());
        for end in attached {
            let _ = end.control.shutdown(Shutdown::Both);
            if end.pump.join().is_err() {
                warn!("IPC pump thread panicked");
            }
        }
        drop(self.producer_end.lock().take());
        drop(self.consumer_end.lock().take());
    }
}

impl Drop for IpcQueue {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_pump<F>(name: &str, body: F) -> RelayResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| RelayError::spawn(format!("failed to start {name} thread: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn msg(i: i64) -> StateMessage {
        StateMessage::new().with("seq", i).unwrap()
    }

    fn collect(queue: &IpcQueue, count: usize) -> Vec<StateMessage> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = Vec::new();
        while received.len() < count && Instant::now() < deadline {
            match queue.try_get() {
                Some(m) => received.push(m),
                None => std::thread::sleep(Duration::from_millis(2)),
            }
        }
        received
    }

    // Both endpoints attached in one process stand in for parent and child

    #[test]
    fn test_messages_cross_in_order() {
        let queue = IpcQueue::new(16).unwrap();
        queue.attach(Endpoint::Consumer).unwrap();
        queue.attach(Endpoint::Producer).unwrap();

        for i in 0..10 {
            queue.put_overflow_aware(msg(i));
        }
        let received = collect(&queue, 10);
        assert_eq!(received, (0..10).map(msg).collect::<Vec<_>>());
        assert_eq!(queue.dropped_frames(), 0);
        queue.close();
    }

    #[test]
    fn test_producer_buffer_drops_oldest_before_attach() {
        let queue = IpcQueue::new(4).unwrap();
        for i in 0..20 {
            queue.put_overflow_aware(msg(i));
            assert!(queue.len() <= queue.capacity());
        }
        assert_eq!(queue.len(), 4);
        queue.attach(Endpoint::Consumer).unwrap();
        queue.attach(Endpoint::Producer).unwrap();

        let received = collect(&queue, 4);
        assert_eq!(received, (16..20).map(msg).collect::<Vec<_>>());
        queue.close();
    }

    #[test]
    fn test_endpoint_attaches_once() {
        let queue = IpcQueue::new(4).unwrap();
        queue.attach(Endpoint::Consumer).unwrap();
        assert!(matches!(
            queue.attach(Endpoint::Consumer),
            Err(RelayError::Ipc { .. })
        ));
        queue.close();
        assert!(queue.attach(Endpoint::Producer).is_err());
    }

    #[test]
    fn test_close_unblocks_collector() {
        let queue = IpcQueue::new(4).unwrap();
        queue.attach(Endpoint::Consumer).unwrap();

        let started = Instant::now();
        queue.close();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(queue.try_get().is_none());
    }
}

//! Command queue engine integration tests
//!
//! Exercise the transaction discipline end to end against a recording mock
//! port and the simulated demo display. Paused tokio time makes the timeout
//! paths deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use displaypilot_core::demo::DemoDisplay;
use displaypilot_core::device::{PowerControllable, PowerState, VolumeControllable};
use displaypilot_core::drivers::{SharpDriver, VendorProfile};
use displaypilot_core::framing::DelimiterBuffer;
use displaypilot_core::transaction::{
    CommandQueue, QueueConfig, QueueEvent, QueueEvents, RawCommand,
};
use displaypilot_core::transport::{TransportError, TransportPort};

/// Recording mock port; optionally fails every write.
#[derive(Clone)]
struct MockPort {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: bool,
}

impl MockPort {
    fn new() -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sent: sent.clone(),
                fail: false,
            },
            sent,
        )
    }

    fn failing() -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
        let (mut port, sent) = Self::new();
        port.fail = true;
        (port, sent)
    }
}

impl TransportPort for MockPort {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        if self.fail {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn description(&self) -> String {
        "mock".to_string()
    }
}

/// Let the engine task drain its control channel.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn sent_frames(sent: &Arc<Mutex<Vec<Vec<u8>>>>) -> Vec<Vec<u8>> {
    sent.lock().unwrap().clone()
}

fn drain(events: &mut QueueEvents) -> Vec<QueueEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn cmd(bytes: &[u8], label: &str) -> RawCommand {
    RawCommand::new(bytes.to_vec(), label)
}

/// Spawn a queue with a CR-framed buffer and a recording port bound.
async fn queue_with_port() -> (CommandQueue, QueueEvents, Arc<Mutex<Vec<Vec<u8>>>>) {
    let (queue, events) = CommandQueue::spawn(QueueConfig::default());
    queue.set_buffer(Box::new(DelimiterBuffer::new(&[b'\r'], false)));
    let (port, sent) = MockPort::new();
    queue.bind_port(Some(Box::new(port)));
    settle().await;
    (queue, events, sent)
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_in_flight() {
    let (queue, mut events, sent) = queue_with_port().await;
    drain(&mut events);

    queue.enqueue(cmd(b"A\r", "a"));
    queue.enqueue(cmd(b"B\r", "b"));
    queue.enqueue(cmd(b"C\r", "c"));
    settle().await;

    // Only the first command ever reaches the wire until it resolves.
    assert_eq!(sent_frames(&sent), vec![b"A\r".to_vec()]);
    let transmitted = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, QueueEvent::Transmitted(_)))
        .count();
    assert_eq!(transmitted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_response_advances_queue() {
    let (queue, mut events, sent) = queue_with_port().await;

    queue.enqueue(cmd(b"A\r", "a"));
    queue.enqueue(cmd(b"B\r", "b"));
    settle().await;

    queue.ingest(b"OK\r");
    settle().await;

    assert_eq!(sent_frames(&sent), vec![b"A\r".to_vec(), b"B\r".to_vec()]);
    let responded: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::Responded { command, frame } => Some((command.label().to_string(), frame)),
            _ => None,
        })
        .collect();
    assert_eq!(responded, vec![("a".to_string(), b"OK".to_vec())]);
}

#[tokio::test(start_paused = true)]
async fn test_priority_ordering() {
    let (queue, mut events, sent) = queue_with_port().await;

    // Hold transmission while the pending set fills up.
    queue.set_online(false);
    settle().await;

    queue.enqueue_priority(cmd(b"A\r", "a"), 10);
    queue.enqueue_priority(cmd(b"B\r", "b"), 5);
    queue.enqueue_priority(cmd(b"C\r", "c"), 10);
    settle().await;
    assert!(sent_frames(&sent).is_empty());

    queue.set_online(true);
    settle().await;
    for _ in 0..3 {
        queue.ingest(b"OK\r");
        settle().await;
    }

    // Priority 5 first, then the two priority-10 entries in FIFO order.
    assert_eq!(
        sent_frames(&sent),
        vec![b"B\r".to_vec(), b"A\r".to_vec(), b"C\r".to_vec()]
    );
    drain(&mut events);
}

#[tokio::test(start_paused = true)]
async fn test_equivalent_pending_replaced_in_place() {
    let (queue, mut events, sent) = queue_with_port().await;

    // Occupy the in-flight slot so the rest stays pending.
    queue.enqueue(cmd(b"D\r", "d"));
    settle().await;

    queue.enqueue(cmd(b"X\r", "x"));
    queue.enqueue(cmd(b"VOL10\r", "vol").with_key("volume"));
    queue.enqueue(cmd(b"Y\r", "y"));
    // Equivalent command replaces the queued one in its original position.
    queue.enqueue(cmd(b"VOL20\r", "vol").with_key("volume"));
    settle().await;

    for _ in 0..4 {
        queue.ingest(b"OK\r");
        settle().await;
    }

    assert_eq!(
        sent_frames(&sent),
        vec![
            b"D\r".to_vec(),
            b"X\r".to_vec(),
            b"VOL20\r".to_vec(),
            b"Y\r".to_vec(),
        ]
    );
    drain(&mut events);
}

#[tokio::test(start_paused = true)]
async fn test_replacement_takes_more_urgent_priority() {
    let (queue, mut events, sent) = queue_with_port().await;

    queue.enqueue(cmd(b"D\r", "d"));
    settle().await;

    queue.enqueue_with_key(cmd(b"X\r", "x"), 0, "x");
    queue.enqueue_with_key(cmd(b"VOL10\r", "vol"), 0, "volume");
    // A retry-style re-enqueue of the equivalent command elevates it past X.
    queue.enqueue_with_key(cmd(b"VOL20\r", "vol"), -5, "volume");
    settle().await;

    for _ in 0..3 {
        queue.ingest(b"OK\r");
        settle().await;
    }

    assert_eq!(
        sent_frames(&sent),
        vec![b"D\r".to_vec(), b"VOL20\r".to_vec(), b"X\r".to_vec()]
    );
    drain(&mut events);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_frees_the_slot() {
    let (queue, mut events, sent) = queue_with_port().await;

    queue.enqueue(cmd(b"A\r", "a"));
    queue.enqueue(cmd(b"B\r", "b"));
    settle().await;
    assert_eq!(sent_frames(&sent).len(), 1);
    drain(&mut events);

    // Default window is 2000ms; let it elapse with no reply.
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let events_after = drain(&mut events);
    let timeouts: Vec<_> = events_after
        .iter()
        .filter_map(|e| match e {
            QueueEvent::TimedOut(c) => Some(c.label().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(timeouts, vec!["a".to_string()]);

    // The next pending command went out immediately after the timeout.
    assert_eq!(sent_frames(&sent), vec![b"A\r".to_vec(), b"B\r".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn test_unbind_stops_the_pump() {
    let (queue, mut events, sent) = queue_with_port().await;

    queue.enqueue(cmd(b"A\r", "a"));
    queue.enqueue(cmd(b"B\r", "b"));
    settle().await;
    drain(&mut events);

    queue.bind_port(None);
    settle().await;

    let events_after = drain(&mut events);
    // Exactly one timeout for the abandoned in-flight command, plus the
    // offline edge.
    assert!(events_after
        .iter()
        .any(|e| matches!(e, QueueEvent::TimedOut(c) if c.label() == "a")));
    assert!(events_after
        .iter()
        .any(|e| matches!(e, QueueEvent::ConnectionChanged(false))));

    // Nothing further transmits, even with new work.
    queue.enqueue(cmd(b"C\r", "c"));
    settle().await;
    assert_eq!(sent_frames(&sent), vec![b"A\r".to_vec()]);

    // No stale timeout fires later for the abandoned command.
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rebind_drops_pending() {
    let (queue, mut events, sent) = queue_with_port().await;

    queue.enqueue(cmd(b"A\r", "a"));
    queue.enqueue(cmd(b"B\r", "b"));
    settle().await;
    drain(&mut events);

    // Rebind to a fresh port: pending B is dropped with the old link, and
    // both connection edges surface so a driver re-polls the new one.
    let (port, sent2) = MockPort::new();
    queue.bind_port(Some(Box::new(port)));
    settle().await;

    let events_after = drain(&mut events);
    assert!(events_after
        .iter()
        .any(|e| matches!(e, QueueEvent::TimedOut(c) if c.label() == "a")));
    assert!(events_after
        .iter()
        .any(|e| matches!(e, QueueEvent::ConnectionChanged(false))));
    assert!(events_after
        .iter()
        .any(|e| matches!(e, QueueEvent::ConnectionChanged(true))));

    queue.ingest(b"OK\r");
    settle().await;

    assert_eq!(sent_frames(&sent), vec![b"A\r".to_vec()]);
    assert!(sent_frames(&sent2).is_empty());

    // New work flows on the new port.
    queue.enqueue(cmd(b"C\r", "c"));
    settle().await;
    assert_eq!(sent_frames(&sent2), vec![b"C\r".to_vec()]);
    drain(&mut events);
}

#[tokio::test(start_paused = true)]
async fn test_offline_keeps_pending() {
    let (queue, mut events, sent) = queue_with_port().await;

    queue.enqueue(cmd(b"A\r", "a"));
    queue.enqueue(cmd(b"B\r", "b"));
    settle().await;
    drain(&mut events);

    // Link drops mid-flight: A is abandoned, B survives.
    queue.set_online(false);
    settle().await;
    let events_after = drain(&mut events);
    assert!(events_after
        .iter()
        .any(|e| matches!(e, QueueEvent::TimedOut(c) if c.label() == "a")));

    queue.set_online(true);
    settle().await;
    assert_eq!(sent_frames(&sent), vec![b"A\r".to_vec(), b"B\r".to_vec()]);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, QueueEvent::ConnectionChanged(true))));
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_frame_surfaces() {
    let (queue, mut events, _sent) = queue_with_port().await;
    drain(&mut events);

    queue.ingest(b"STATUS 1\r");
    settle().await;

    let frames: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::Unsolicited(frame) => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(frames, vec![b"STATUS 1".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_resolves_as_timeout() {
    let (queue, mut events) = CommandQueue::spawn(QueueConfig::default());
    queue.set_buffer(Box::new(DelimiterBuffer::new(&[b'\r'], false)));
    let (port, sent) = MockPort::failing();
    queue.bind_port(Some(Box::new(port)));
    settle().await;

    queue.enqueue(cmd(b"A\r", "a"));
    queue.enqueue(cmd(b"B\r", "b"));
    settle().await;

    // Both writes were attempted and both commands resolved immediately.
    assert_eq!(sent_frames(&sent).len(), 2);
    let timeouts: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::TimedOut(c) => Some(c.label().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(timeouts, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_track_traffic() {
    let (queue, mut events, _sent) = queue_with_port().await;

    queue.enqueue(cmd(b"A\r", "a"));
    settle().await;
    queue.ingest(b"OK\r");
    settle().await;

    let metrics = queue.metrics().borrow().clone();
    assert_eq!(metrics.tx_frames, 1);
    assert_eq!(metrics.tx_bytes, 2);
    assert_eq!(metrics.rx_frames, 1);
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.timeouts, 0);
    drain(&mut events);
}

/// Pump driver and queue together until no further events arrive.
async fn run_driver(driver: &mut SharpDriver, events: &mut QueueEvents) {
    loop {
        settle().await;
        match events.try_recv() {
            Some(event) => driver.handle_event(event),
            None => {
                settle().await;
                match events.try_recv() {
                    Some(event) => driver.handle_event(event),
                    None => break,
                }
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_demo_display_end_to_end() {
    let (queue, mut events) = CommandQueue::spawn(QueueConfig::default());
    queue.set_buffer(Box::new(DelimiterBuffer::new(&[b'\r'], false)));
    let demo = DemoDisplay::new(queue.clone());
    queue.bind_port(Some(Box::new(demo)));

    let mut driver = SharpDriver::new(queue.clone(), VendorProfile::sharp());
    driver.power_on();
    driver.set_volume(35);
    run_driver(&mut driver, &mut events).await;

    // Power verified on, and the volume write confirmed by re-query.
    assert_eq!(driver.state().power(), Some(PowerState::On));
    assert_eq!(driver.state().volume(), Some(35));
}

#[tokio::test(start_paused = true)]
async fn test_demo_display_busy_retry() {
    let (queue, mut events) = CommandQueue::spawn(QueueConfig::default());
    queue.set_buffer(Box::new(DelimiterBuffer::new(&[b'\r'], false)));
    // First two commands answered WAIT, like a warming panel.
    let demo = DemoDisplay::new(queue.clone()).with_busy_replies(2);
    queue.bind_port(Some(Box::new(demo)));

    let mut driver = SharpDriver::new(queue.clone(), VendorProfile::sharp());
    driver.power_on();
    run_driver(&mut driver, &mut events).await;

    // The driver retried through the busy phase and verified the result.
    assert_eq!(driver.state().power(), Some(PowerState::On));
}

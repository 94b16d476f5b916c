//! Command queue engine
//!
//! Owns the single in-flight slot for one physical port. Commands are queued
//! with a priority, sent strictly one at a time, and matched to the next
//! complete frame the buffer produces; a one-shot timeout frees the slot when
//! a display never answers. All queue state lives inside one task, so pop,
//! send, resolve and expire can never race each other.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::command::{QueueEntry, SerialCommand};
use super::{DEFAULT_PRIORITY, DEFAULT_TIMEOUT_MS};
use crate::framing::{Frame, SerialBuffer};
use crate::transport::TransportPort;

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Tag used in log output, e.g. the driver or room name
    pub label: String,
    /// Response window for each transmitted command, in milliseconds
    pub timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            label: "display".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Notifications delivered to the owning driver, in order of occurrence.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// The command's bytes were handed to the port. Trust-mode drivers update
    /// cached state here instead of waiting for a confirmed response.
    Transmitted(Arc<dyn SerialCommand>),
    /// A complete frame was matched to the in-flight command.
    Responded {
        /// The command that was awaiting a response
        command: Arc<dyn SerialCommand>,
        /// The raw frame the buffer produced
        frame: Frame,
    },
    /// The response window elapsed, or the in-flight command was abandoned by
    /// a port unbind or connection loss. The slot is free either way.
    TimedOut(Arc<dyn SerialCommand>),
    /// A frame completed while nothing was in flight (async device report).
    Unsolicited(Frame),
    /// The transport went online (`true`) or offline (`false`).
    ConnectionChanged(bool),
}

/// Counters published after every engine step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueMetrics {
    /// Commands handed to the port
    pub tx_frames: u64,
    /// Bytes handed to the port
    pub tx_bytes: u64,
    /// Complete frames produced by the buffer
    pub rx_frames: u64,
    /// Raw bytes ingested from the transport
    pub rx_bytes: u64,
    /// Commands resolved by a matched response
    pub completed: u64,
    /// Commands resolved by timeout or abandonment
    pub timeouts: u64,
    /// Pending commands dropped by port rebind
    pub dropped_pending: u64,
    /// Latency of the most recent completed transaction, in milliseconds
    pub last_latency_ms: Option<u64>,
}

enum QueueCtl {
    Enqueue {
        command: Arc<dyn SerialCommand>,
        priority: i32,
        key: Option<String>,
    },
    SetTimeout(Duration),
    BindPort(Option<Box<dyn TransportPort>>),
    SetBuffer(Box<dyn SerialBuffer>),
    Ingest(Vec<u8>),
    SetOnline(bool),
    Shutdown,
}

/// Handle to a running command queue.
///
/// Cheap to clone; every method is non-blocking and safe to call from any
/// thread or task. The engine itself runs on a spawned tokio task and owns
/// all mutable state.
#[derive(Clone)]
pub struct CommandQueue {
    ctl: mpsc::UnboundedSender<QueueCtl>,
    metrics: watch::Receiver<QueueMetrics>,
}

/// Receiving side of the queue's event stream. Single consumer.
pub struct QueueEvents {
    rx: mpsc::UnboundedReceiver<QueueEvent>,
}

impl QueueEvents {
    /// Wait for the next event. Returns `None` once the engine has stopped.
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<QueueEvent> {
        self.rx.try_recv().ok()
    }
}

impl CommandQueue {
    /// Start an engine task and return its control handle plus event stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: QueueConfig) -> (CommandQueue, QueueEvents) {
        let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (metrics_tx, metrics_rx) = watch::channel(QueueMetrics::default());

        tokio::spawn(engine_task(config, ctl_rx, event_tx, metrics_tx));

        (
            CommandQueue {
                ctl: ctl_tx,
                metrics: metrics_rx,
            },
            QueueEvents { rx: event_rx },
        )
    }

    /// Queue a command at the default priority.
    ///
    /// If an equivalent pending command exists (same dedup key) it is
    /// replaced in place instead of queued again.
    pub fn enqueue(&self, command: impl SerialCommand) {
        self.send_enqueue(Arc::new(command), DEFAULT_PRIORITY, None);
    }

    /// Queue a command with an explicit priority; lower is sent sooner.
    pub fn enqueue_priority(&self, command: impl SerialCommand, priority: i32) {
        self.send_enqueue(Arc::new(command), priority, None);
    }

    /// Queue a command with an explicit equivalence key, overriding the
    /// command's own [`SerialCommand::dedup_key`].
    pub fn enqueue_with_key(
        &self,
        command: impl SerialCommand,
        priority: i32,
        key: impl Into<String>,
    ) {
        self.send_enqueue(Arc::new(command), priority, Some(key.into()));
    }

    /// Re-queue a command recovered from a queue event (the retry path).
    pub fn requeue(&self, command: Arc<dyn SerialCommand>, priority: i32) {
        self.send_enqueue(command, priority, None);
    }

    fn send_enqueue(&self, command: Arc<dyn SerialCommand>, priority: i32, key: Option<String>) {
        self.send_ctl(QueueCtl::Enqueue {
            command,
            priority,
            key,
        });
    }

    /// Set the response window for subsequently transmitted commands.
    pub fn set_timeout(&self, timeout: Duration) {
        self.send_ctl(QueueCtl::SetTimeout(timeout));
    }

    /// Bind or unbind the transport port.
    ///
    /// Binding (and unbinding) abandons any in-flight command with a timeout
    /// event, drops all pending commands and clears the framing buffer; the
    /// queue restarts from a clean slate on the new link.
    pub fn bind_port(&self, port: Option<Box<dyn TransportPort>>) {
        self.send_ctl(QueueCtl::BindPort(port));
    }

    /// Install the frame-extraction strategy for the bound link.
    pub fn set_buffer(&self, buffer: Box<dyn SerialBuffer>) {
        self.send_ctl(QueueCtl::SetBuffer(buffer));
    }

    /// Feed raw inbound bytes from the transport's receive path.
    pub fn ingest(&self, bytes: &[u8]) {
        self.send_ctl(QueueCtl::Ingest(bytes.to_vec()));
    }

    /// Signal transport connectivity. Going offline abandons the in-flight
    /// command; pending commands are kept and resume on reconnect.
    pub fn set_online(&self, online: bool) {
        self.send_ctl(QueueCtl::SetOnline(online));
    }

    /// Stop the engine task. Pending commands are discarded.
    pub fn shutdown(&self) {
        self.send_ctl(QueueCtl::Shutdown);
    }

    /// Watch the engine's counters.
    pub fn metrics(&self) -> watch::Receiver<QueueMetrics> {
        self.metrics.clone()
    }

    fn send_ctl(&self, msg: QueueCtl) {
        if self.ctl.send(msg).is_err() {
            warn!("command queue engine is not running; request dropped");
        }
    }
}

struct InFlight {
    command: Arc<dyn SerialCommand>,
    deadline: Instant,
    sent_at: Instant,
}

struct Engine {
    label: String,
    pending: Vec<QueueEntry>,
    in_flight: Option<InFlight>,
    timeout: Duration,
    port: Option<Box<dyn TransportPort>>,
    buffer: Option<Box<dyn SerialBuffer>>,
    online: bool,
    seq: u64,
    metrics: QueueMetrics,
    events: mpsc::UnboundedSender<QueueEvent>,
}

async fn engine_task(
    config: QueueConfig,
    mut ctl_rx: mpsc::UnboundedReceiver<QueueCtl>,
    events: mpsc::UnboundedSender<QueueEvent>,
    metrics_tx: watch::Sender<QueueMetrics>,
) {
    let mut engine = Engine {
        label: config.label,
        pending: Vec::new(),
        in_flight: None,
        timeout: Duration::from_millis(config.timeout_ms),
        port: None,
        buffer: None,
        online: false,
        seq: 0,
        metrics: QueueMetrics::default(),
        events,
    };

    loop {
        let deadline = engine.in_flight.as_ref().map(|f| f.deadline);
        let expiry = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            ctl = ctl_rx.recv() => match ctl {
                Some(QueueCtl::Shutdown) | None => break,
                Some(msg) => engine.handle_ctl(msg),
            },
            _ = expiry => engine.expire_in_flight("response window elapsed"),
        }

        engine.pump();
        let _ = metrics_tx.send(engine.metrics.clone());
    }

    debug!(queue = %engine.label, "command queue engine stopped");
}

impl Engine {
    fn handle_ctl(&mut self, msg: QueueCtl) {
        match msg {
            QueueCtl::Enqueue {
                command,
                priority,
                key,
            } => self.enqueue(command, priority, key),
            QueueCtl::SetTimeout(timeout) => self.timeout = timeout,
            QueueCtl::BindPort(port) => self.bind_port(port),
            QueueCtl::SetBuffer(mut buffer) => {
                buffer.clear();
                self.buffer = Some(buffer);
            }
            QueueCtl::Ingest(bytes) => self.ingest(&bytes),
            QueueCtl::SetOnline(online) => self.set_online(online),
            QueueCtl::Shutdown => unreachable!("handled by the select loop"),
        }
    }

    fn enqueue(&mut self, command: Arc<dyn SerialCommand>, priority: i32, key: Option<String>) {
        let key = key.or_else(|| command.dedup_key());

        // In-place replacement of an equivalent pending command: the entry
        // keeps its sequence number (original queue position) and takes the
        // more urgent of the two priorities. In-flight commands are never
        // replaced.
        if let Some(k) = key.as_deref() {
            if let Some(entry) = self
                .pending
                .iter_mut()
                .find(|e| e.key.as_deref() == Some(k))
            {
                trace!(
                    queue = %self.label,
                    key = k,
                    old = entry.command.label(),
                    new = command.label(),
                    "replacing equivalent pending command"
                );
                entry.command = command;
                entry.priority = entry.priority.min(priority);
                return;
            }
        }

        self.seq += 1;
        self.pending.push(QueueEntry {
            command,
            priority,
            seq: self.seq,
            key,
        });
    }

    fn bind_port(&mut self, port: Option<Box<dyn TransportPort>>) {
        self.expire_in_flight("abandoned by port rebind");

        if !self.pending.is_empty() {
            debug!(
                queue = %self.label,
                dropped = self.pending.len(),
                "dropping pending commands on port rebind"
            );
            self.metrics.dropped_pending += self.pending.len() as u64;
            self.pending.clear();
        }

        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }

        // A swap is a loss of the old link followed by a new one; surfacing
        // both edges lets an attached driver re-poll the replacement.
        if self.online {
            self.online = false;
            let _ = self.events.send(QueueEvent::ConnectionChanged(false));
        }
        self.port = port;
        if self.port.is_some() {
            self.online = true;
            let _ = self.events.send(QueueEvent::ConnectionChanged(true));
        }
    }

    fn set_online(&mut self, online: bool) {
        let online = online && self.port.is_some();
        if online == self.online {
            return;
        }

        self.online = online;
        if !online {
            self.expire_in_flight("abandoned by connection loss");
            if let Some(buffer) = self.buffer.as_mut() {
                buffer.clear();
            }
        }
        let _ = self.events.send(QueueEvent::ConnectionChanged(online));
    }

    fn ingest(&mut self, bytes: &[u8]) {
        self.metrics.rx_bytes += bytes.len() as u64;

        let frames = match self.buffer.as_mut() {
            Some(buffer) => buffer.enqueue(bytes),
            None => {
                trace!(queue = %self.label, len = bytes.len(), "inbound data with no buffer bound");
                return;
            }
        };

        for frame in frames {
            self.metrics.rx_frames += 1;
            self.resolve_frame(frame);
        }
    }

    fn resolve_frame(&mut self, frame: Frame) {
        match self.in_flight.take() {
            Some(flight) => {
                let latency = flight.sent_at.elapsed();
                self.metrics.completed += 1;
                self.metrics.last_latency_ms = Some(latency.as_millis() as u64);
                trace!(
                    queue = %self.label,
                    command = flight.command.label(),
                    latency_ms = latency.as_millis() as u64,
                    "response matched"
                );
                let _ = self.events.send(QueueEvent::Responded {
                    command: flight.command,
                    frame,
                });
            }
            None => {
                let _ = self.events.send(QueueEvent::Unsolicited(frame));
            }
        }
    }

    fn expire_in_flight(&mut self, reason: &str) {
        if let Some(flight) = self.in_flight.take() {
            self.metrics.timeouts += 1;
            debug!(
                queue = %self.label,
                command = flight.command.label(),
                reason,
                "in-flight command timed out"
            );
            let _ = self.events.send(QueueEvent::TimedOut(flight.command));
        }
    }

    /// Transmit the next pending command if the slot is free. A write failure
    /// resolves that command as timed out and the next one is attempted, so a
    /// dead write path cannot stall the queue.
    fn pump(&mut self) {
        while self.in_flight.is_none() && self.online {
            let Some(port) = self.port.as_mut() else {
                return;
            };
            let Some(idx) = self
                .pending
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| (e.priority, e.seq))
                .map(|(i, _)| i)
            else {
                return;
            };

            let entry = self.pending.remove(idx);
            let bytes = entry.command.serialize();

            match port.send(&bytes) {
                Ok(()) => {
                    self.metrics.tx_frames += 1;
                    self.metrics.tx_bytes += bytes.len() as u64;
                    let now = Instant::now();
                    trace!(
                        queue = %self.label,
                        command = entry.command.label(),
                        len = bytes.len(),
                        "transmitted"
                    );
                    self.in_flight = Some(InFlight {
                        command: entry.command.clone(),
                        deadline: now + self.timeout,
                        sent_at: now,
                    });
                    let _ = self.events.send(QueueEvent::Transmitted(entry.command));
                }
                Err(e) => {
                    warn!(
                        queue = %self.label,
                        command = entry.command.label(),
                        error = %e,
                        "transmit failed"
                    );
                    self.metrics.timeouts += 1;
                    let _ = self.events.send(QueueEvent::TimedOut(entry.command));
                }
            }
        }
    }
}

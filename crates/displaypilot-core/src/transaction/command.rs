//! The serial command contract
//!
//! A command is an opaque unit the queue can put on the wire and, optionally,
//! recognize as equivalent to another queued command so rapid re-sends
//! collapse instead of flooding the link.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A unit of work for the command queue.
///
/// Implementations are built once by a driver and never mutated afterwards;
/// the queue shares them into events as `Arc<dyn SerialCommand>`.
pub trait SerialCommand: Send + Sync + fmt::Debug + 'static {
    /// Produce the wire bytes for this command.
    fn serialize(&self) -> Vec<u8>;

    /// Equivalence key used to replace queued (not yet sent) duplicates.
    ///
    /// Two pending commands are equivalent when both return `Some` and the
    /// keys are equal. Drivers typically return a command-family key
    /// (`"volume"`) so only the latest value in a burst is transmitted.
    /// `None` means the command is never replaced.
    fn dedup_key(&self) -> Option<String> {
        None
    }

    /// Short tag used in log output.
    fn label(&self) -> &str {
        "command"
    }

    /// Downcast support so drivers can recover their concrete command type
    /// from queue events.
    fn as_any(&self) -> &dyn Any;
}

/// A preassembled byte command.
///
/// Useful for drivers whose commands are fully determined at build time and
/// for tests; vendor drivers with richer grammars define their own types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    bytes: Vec<u8>,
    label: String,
    key: Option<String>,
}

impl RawCommand {
    /// Create a command from raw wire bytes.
    pub fn new(bytes: impl Into<Vec<u8>>, label: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            label: label.into(),
            key: None,
        }
    }

    /// Attach an equivalence key (see [`SerialCommand::dedup_key`]).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The wire bytes this command will transmit.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl SerialCommand for RawCommand {
    fn serialize(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    fn dedup_key(&self) -> Option<String> {
        self.key.clone()
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A queued command plus its scheduling metadata.
#[derive(Clone)]
pub(crate) struct QueueEntry {
    pub command: Arc<dyn SerialCommand>,
    /// Lower is sent sooner; ties broken by `seq`.
    pub priority: i32,
    /// Monotonic enqueue counter, preserved across in-place replacement.
    pub seq: u64,
    /// Resolved equivalence key (explicit key, falling back to the command's).
    pub key: Option<String>,
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("label", &self.command.label())
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .field("key", &self.key)
            .finish()
    }
}

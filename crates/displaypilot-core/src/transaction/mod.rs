//! Serial command transactions
//!
//! Implements the command queue at the heart of every display driver: one
//! command on the wire at a time, responses matched back to the command that
//! triggered them, timeouts enforced, equivalent queued commands collapsed.

mod command;
mod queue;

pub use command::{RawCommand, SerialCommand};
pub use queue::{CommandQueue, QueueConfig, QueueEvent, QueueEvents, QueueMetrics};

/// Default response window in milliseconds
///
/// Conservative enough for slow RS-232 displays that only answer after a
/// panel scan; drivers tune it per protocol via `CommandQueue::set_timeout`.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Priority assigned by plain `enqueue`; lower values are sent sooner
pub const DEFAULT_PRIORITY: i32 = 0;

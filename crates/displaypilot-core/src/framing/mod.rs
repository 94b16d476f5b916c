//! Frame extraction
//!
//! Converts the arbitrarily-chunked byte stream a transport delivers into
//! complete protocol frames, one strategy per vendor framing rule. A buffer
//! never emits a partial frame; bytes received before a valid start of frame
//! are discarded so keep-alive noise between frames cannot corrupt the next
//! parse.

mod bounded;
mod delimiter;
mod header;
mod sentinel;

pub use bounded::BoundedBuffer;
pub use delimiter::DelimiterBuffer;
pub use header::{FrameRule, HeaderFrameBuffer};
pub use sentinel::SentinelBuffer;

/// One complete protocol message, as delimited by the vendor's framing rule.
pub type Frame = Vec<u8>;

/// Cap on accumulated unframed bytes. A stream that never completes a frame
/// (wrong baud rate, wrong buffer for the protocol) is discarded at this
/// size rather than growing without bound.
pub const MAX_BUFFER_BYTES: usize = 8192;

/// Stateful byte-stream chunker.
///
/// The queue engine exclusively owns its buffer, so implementations do not
/// lock; a buffer shared across threads must be wrapped by its owner.
pub trait SerialBuffer: Send {
    /// Append raw inbound data and return every newly completed frame, in
    /// arrival order. A single call may yield zero, one, or many frames.
    fn enqueue(&mut self, chunk: &[u8]) -> Vec<Frame>;

    /// Discard all buffered partial data (used on disconnect or reset).
    /// Previously buffered bytes can never complete a frame afterwards.
    fn clear(&mut self);
}

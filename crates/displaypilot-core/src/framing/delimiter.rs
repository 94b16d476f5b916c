//! Delimiter-bounded framing
//!
//! A frame ends at any one of a set of delimiter bytes. Most ASCII display
//! protocols (Sharp, NEC monitors, projectors with CR-terminated replies)
//! frame this way.

use super::{Frame, SerialBuffer, MAX_BUFFER_BYTES};

/// Frames on designated delimiter bytes.
#[derive(Debug, Clone)]
pub struct DelimiterBuffer {
    delimiters: Vec<u8>,
    include_delimiter: bool,
    rx: Vec<u8>,
}

impl DelimiterBuffer {
    /// Create a buffer that closes a frame at every occurrence of any byte
    /// in `delimiters`. With `include_delimiter` the closing byte is part of
    /// the emitted frame; a frame consisting of only the delimiter (an ACK
    /// byte, say) is then still emitted. Without it the delimiter is
    /// stripped and empty frames (consecutive delimiters, stray `\n` after
    /// `\r`) are suppressed.
    pub fn new(delimiters: &[u8], include_delimiter: bool) -> Self {
        Self {
            delimiters: delimiters.to_vec(),
            include_delimiter,
            rx: Vec::new(),
        }
    }
}

impl SerialBuffer for DelimiterBuffer {
    fn enqueue(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if self.delimiters.contains(&byte) {
                let mut frame = std::mem::take(&mut self.rx);
                if self.include_delimiter {
                    frame.push(byte);
                }
                if !frame.is_empty() {
                    frames.push(frame);
                }
            } else {
                self.rx.push(byte);
                if self.rx.len() > MAX_BUFFER_BYTES {
                    self.rx.clear();
                }
            }
        }

        frames
    }

    fn clear(&mut self) {
        self.rx.clear();
    }
}

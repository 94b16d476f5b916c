//! Sentinel-pair framing
//!
//! A frame starts at one sentinel byte and ends at a second; everything in
//! between is payload. Used by the STX/ETX style protocols (Christie,
//! Panasonic) where the end sentinel cannot occur in the payload encoding.

use super::{Frame, SerialBuffer, MAX_BUFFER_BYTES};

/// Frames from a start sentinel to an end sentinel, both included.
#[derive(Debug, Clone)]
pub struct SentinelBuffer {
    start: u8,
    end: u8,
    rx: Vec<u8>,
    in_frame: bool,
}

impl SentinelBuffer {
    /// Create a buffer framing from `start` to `end`. Bytes before the
    /// start sentinel are discarded. `start` and `end` may be the same byte
    /// (HDLC-style flag framing).
    pub fn new(start: u8, end: u8) -> Self {
        Self {
            start,
            end,
            rx: Vec::new(),
            in_frame: false,
        }
    }
}

impl SerialBuffer for SentinelBuffer {
    fn enqueue(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if !self.in_frame {
                if byte == self.start {
                    self.rx.push(byte);
                    self.in_frame = true;
                }
                continue;
            }

            self.rx.push(byte);
            if byte == self.end {
                frames.push(std::mem::take(&mut self.rx));
                self.in_frame = false;
            } else if self.rx.len() > MAX_BUFFER_BYTES {
                self.rx.clear();
                self.in_frame = false;
            }
        }

        frames
    }

    fn clear(&mut self) {
        self.rx.clear();
        self.in_frame = false;
    }
}

//! Header-bounded framing
//!
//! A frame must begin with one of a set of known header bytes; the rule
//! registered for that header decides when the frame is complete. Binary
//! display protocols (Samsung MDC, Panasonic, Barco) frame this way: a fixed
//! sentinel header followed by either a fixed-size body or an embedded
//! length field.

use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;

use super::{Frame, SerialBuffer, MAX_BUFFER_BYTES};

/// Completeness rule for frames starting with a given header byte.
#[derive(Debug, Clone, Copy)]
pub enum FrameRule {
    /// The frame is exactly this many bytes long, header included.
    FixedLen(usize),
    /// The frame length is `base` plus the value of a length field embedded
    /// at `offset` (from the start of the frame), `width` bytes wide
    /// (1, or 2 big-endian).
    LenAtOffset {
        /// Byte offset of the length field from the start of the frame
        offset: usize,
        /// Width of the length field in bytes (1 or 2)
        width: usize,
        /// Fixed overhead added to the length field's value
        base: usize,
    },
}

/// Frames on registered header bytes with per-header completeness rules.
#[derive(Debug, Clone)]
pub struct HeaderFrameBuffer {
    rules: HashMap<u8, FrameRule>,
    rx: Vec<u8>,
}

impl HeaderFrameBuffer {
    /// Create a buffer from `(header byte, rule)` pairs. Bytes received
    /// while no registered header leads the accumulation are discarded.
    pub fn new(rules: impl IntoIterator<Item = (u8, FrameRule)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            rx: Vec::new(),
        }
    }

    /// Required total frame length, if it can be determined yet.
    fn required_len(&self) -> Option<usize> {
        let rule = self.rules.get(self.rx.first()?)?;
        match *rule {
            FrameRule::FixedLen(len) => Some(len),
            FrameRule::LenAtOffset {
                offset,
                width,
                base,
            } => {
                if self.rx.len() < offset + width {
                    return None;
                }
                let field = match width {
                    1 => self.rx[offset] as usize,
                    _ => BigEndian::read_u16(&self.rx[offset..offset + 2]) as usize,
                };
                Some(base + field)
            }
        }
    }
}

impl SerialBuffer for HeaderFrameBuffer {
    fn enqueue(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if self.rx.is_empty() && !self.rules.contains_key(&byte) {
                // Junk before a start of frame.
                continue;
            }
            self.rx.push(byte);

            if let Some(needed) = self.required_len() {
                if self.rx.len() >= needed {
                    let mut frame = std::mem::take(&mut self.rx);
                    // Surplus bytes past the frame boundary belong to the
                    // next frame; with per-byte accumulation there are none,
                    // but keep the frame exact regardless.
                    frame.truncate(needed);
                    frames.push(frame);
                }
            }

            if self.rx.len() > MAX_BUFFER_BYTES {
                self.rx.clear();
            }
        }

        frames
    }

    fn clear(&mut self) {
        self.rx.clear();
    }
}

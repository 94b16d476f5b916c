//! Demo Mode - Simulated display for testing without hardware
//!
//! Behaves like a Sharp-protocol panel on the other end of the wire: tracks
//! power, input, volume and mute, answers sets with `OK` and queries with
//! the value, and can be configured to reply `WAIT` while "warming up" or to
//! jitter its response latency like a real RS-232 link.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::time::Duration;
use tracing::trace;

use crate::transaction::CommandQueue;
use crate::transport::{TransportError, TransportPort};

/// Simulated Sharp-protocol display implementing [`TransportPort`].
///
/// Replies are fed straight back into the bound queue via `ingest`, either
/// immediately or after a randomized delay.
pub struct DemoDisplay {
    queue: CommandQueue,
    power: bool,
    volume: u8,
    mute: bool,
    input: String,
    scaling: String,
    /// Remaining commands to answer with WAIT (warm-up simulation)
    busy_replies: u8,
    /// Optional response latency range
    latency: Option<Range<u64>>,
    rng: StdRng,
}

impl DemoDisplay {
    /// Create a display wired back into `queue`. Starts powered off at
    /// volume 20 on input 1.
    pub fn new(queue: CommandQueue) -> Self {
        Self {
            queue,
            power: false,
            volume: 20,
            mute: false,
            input: "1".to_string(),
            scaling: "0".to_string(),
            busy_replies: 0,
            latency: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Answer the next `count` commands with `WAIT`, like a panel that is
    /// still warming up.
    pub fn with_busy_replies(mut self, count: u8) -> Self {
        self.busy_replies = count;
        self
    }

    /// Delay each reply by a random duration from `millis`.
    pub fn with_latency(mut self, millis: Range<u64>) -> Self {
        self.latency = Some(millis);
        self
    }

    /// Compute the reply for one received command, mutating simulated state.
    fn respond(&mut self, bytes: &[u8]) -> Vec<u8> {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return b"ERR\r".to_vec();
        };
        let body = text.trim_end_matches('\r');
        if body.len() != 8 {
            return b"ERR\r".to_vec();
        }

        if self.busy_replies > 0 {
            self.busy_replies -= 1;
            return b"WAIT\r".to_vec();
        }

        let (code, param) = body.split_at(4);
        let param = param.trim();
        let query = param == "????";

        match (code, query) {
            ("POWR", true) => reply_value(if self.power { "1" } else { "0" }),
            ("POWR", false) => match param {
                "1" => {
                    self.power = true;
                    b"OK\r".to_vec()
                }
                "0" => {
                    self.power = false;
                    b"OK\r".to_vec()
                }
                _ => b"ERR\r".to_vec(),
            },
            // Everything below needs the panel awake.
            (_, _) if !self.power => b"ERR\r".to_vec(),
            ("VOLM", true) => reply_value(&self.volume.to_string()),
            ("VOLM", false) => match param.parse::<u8>() {
                Ok(level) if level <= 100 => {
                    self.volume = level;
                    b"OK\r".to_vec()
                }
                _ => b"ERR\r".to_vec(),
            },
            ("INPS", true) => reply_value(&self.input),
            ("INPS", false) => {
                self.input = param.to_string();
                b"OK\r".to_vec()
            }
            ("MUTE", true) => reply_value(if self.mute { "1" } else { "0" }),
            ("MUTE", false) => match param {
                "1" => {
                    self.mute = true;
                    b"OK\r".to_vec()
                }
                "0" => {
                    self.mute = false;
                    b"OK\r".to_vec()
                }
                _ => b"ERR\r".to_vec(),
            },
            ("WIDE", true) => reply_value(&self.scaling),
            ("WIDE", false) => {
                self.scaling = param.to_string();
                b"OK\r".to_vec()
            }
            _ => b"ERR\r".to_vec(),
        }
    }
}

/// Format a query answer: right-aligned four characters plus CR.
fn reply_value(value: &str) -> Vec<u8> {
    format!("{:>4}\r", value).into_bytes()
}

impl TransportPort for DemoDisplay {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let reply = self.respond(bytes);
        trace!(
            rx = %String::from_utf8_lossy(bytes).trim_end(),
            tx = %String::from_utf8_lossy(&reply).trim_end(),
            "demo display"
        );

        match &self.latency {
            Some(range) => {
                let delay = Duration::from_millis(self.rng.gen_range(range.clone()));
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.ingest(&reply);
                });
            }
            None => self.queue.ingest(&reply),
        }
        Ok(())
    }

    fn description(&self) -> String {
        "demo:sharp".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::QueueConfig;

    fn display() -> DemoDisplay {
        let (queue, _events) = CommandQueue::spawn(QueueConfig::default());
        DemoDisplay::new(queue)
    }

    #[tokio::test]
    async fn test_power_cycle() {
        let mut demo = display();
        assert_eq!(demo.respond(b"POWR????\r"), b"   0\r".to_vec());
        assert_eq!(demo.respond(b"POWR   1\r"), b"OK\r".to_vec());
        assert_eq!(demo.respond(b"POWR????\r"), b"   1\r".to_vec());
    }

    #[tokio::test]
    async fn test_commands_rejected_while_off() {
        let mut demo = display();
        assert_eq!(demo.respond(b"VOLM  10\r"), b"ERR\r".to_vec());
    }

    #[tokio::test]
    async fn test_volume_set_and_query() {
        let mut demo = display();
        demo.respond(b"POWR   1\r");
        assert_eq!(demo.respond(b"VOLM  55\r"), b"OK\r".to_vec());
        assert_eq!(demo.respond(b"VOLM????\r"), b"  55\r".to_vec());
    }

    #[tokio::test]
    async fn test_busy_replies_then_ok() {
        let mut demo = display().with_busy_replies(2);
        assert_eq!(demo.respond(b"POWR   1\r"), b"WAIT\r".to_vec());
        assert_eq!(demo.respond(b"POWR   1\r"), b"WAIT\r".to_vec());
        assert_eq!(demo.respond(b"POWR   1\r"), b"OK\r".to_vec());
    }

    #[tokio::test]
    async fn test_garbage_gets_err() {
        let mut demo = display();
        assert_eq!(demo.respond(&[0xFF, 0x00]), b"ERR\r".to_vec());
        assert_eq!(demo.respond(b"XX\r"), b"ERR\r".to_vec());
    }
}

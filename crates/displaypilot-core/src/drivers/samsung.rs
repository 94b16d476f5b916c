//! Samsung display driver
//!
//! Binary MDC protocol: `0xAA`, command byte, display id, data length, data,
//! additive checksum over everything after the header. Replies arrive as
//! `0xAA 0xFF id len ack/nak rcmd value... checksum` and are framed with a
//! [`HeaderFrameBuffer`] keyed on the reply header.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{DriverError, POLL_PRIORITY, RETRY_PRIORITY};
use crate::device::{
    DisplayState, InputSelectable, InputSource, PowerControllable, PowerState, RetryTracker,
    StateChange, StateNotifier, VolumeControllable,
};
use crate::framing::{Frame, FrameRule, HeaderFrameBuffer};
use crate::transaction::{CommandQueue, QueueEvent, QueueEvents, SerialCommand};

/// Frame header for both directions.
const HEADER: u8 = 0xAA;
/// Command byte marking a reply frame.
const REPLY_MARKER: u8 = 0xFF;

/// Power control command byte
pub const CMD_POWER: u8 = 0x11;
/// Volume command byte
pub const CMD_VOLUME: u8 = 0x12;
/// Mute command byte
pub const CMD_MUTE: u8 = 0x13;
/// Input source command byte
pub const CMD_INPUT: u8 = 0x14;

/// Additive checksum over everything after the header byte.
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Wire code for an input, per the MDC input table.
fn input_code(input: InputSource) -> Option<u8> {
    match input {
        InputSource::Hdmi(1) => Some(0x21),
        InputSource::Hdmi(2) => Some(0x23),
        InputSource::Hdmi(_) => None,
        InputSource::DisplayPort => Some(0x25),
        InputSource::Vga => Some(0x14),
        InputSource::Component => Some(0x08),
        InputSource::Tv => Some(0x40),
    }
}

fn input_for_code(code: u8) -> Option<InputSource> {
    match code {
        0x21 => Some(InputSource::Hdmi(1)),
        0x23 => Some(InputSource::Hdmi(2)),
        0x25 => Some(InputSource::DisplayPort),
        0x14 => Some(InputSource::Vga),
        0x08 => Some(InputSource::Component),
        0x40 => Some(InputSource::Tv),
        _ => None,
    }
}

/// One MDC wire command. An empty data field makes it a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamsungCommand {
    command: u8,
    display_id: u8,
    data: Vec<u8>,
    family: Option<String>,
}

impl SamsungCommand {
    /// Build a set command.
    pub fn set(command: u8, display_id: u8, data: Vec<u8>) -> Self {
        Self {
            command,
            display_id,
            data,
            family: None,
        }
    }

    /// Build a status query (a command frame with no data).
    pub fn query(command: u8, display_id: u8) -> Self {
        Self::set(command, display_id, Vec::new())
    }

    /// Attach the command-family equivalence key.
    pub fn with_family(mut self, family: &str) -> Self {
        self.family = Some(family.to_string());
        self
    }

    /// The command byte.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Whether this is a status query.
    pub fn is_query(&self) -> bool {
        self.data.is_empty()
    }

    /// The framing strategy matching MDC reply frames.
    pub fn response_buffer() -> HeaderFrameBuffer {
        // Length at offset 3, plus four header bytes and one checksum.
        HeaderFrameBuffer::new([(
            HEADER,
            FrameRule::LenAtOffset {
                offset: 3,
                width: 1,
                base: 5,
            },
        )])
    }
}

impl SerialCommand for SamsungCommand {
    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len());
        bytes.push(HEADER);
        bytes.push(self.command);
        bytes.push(self.display_id);
        bytes.push(self.data.len() as u8);
        bytes.extend_from_slice(&self.data);
        bytes.push(checksum(&bytes[1..]));
        bytes
    }

    fn dedup_key(&self) -> Option<String> {
        self.family.clone()
    }

    fn label(&self) -> &str {
        match self.command {
            CMD_POWER => "power",
            CMD_VOLUME => "volume",
            CMD_MUTE => "mute",
            CMD_INPUT => "input",
            _ => "mdc",
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A decoded MDC reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamsungReply {
    /// Acknowledged (`true`) or rejected
    pub ack: bool,
    /// The command byte being answered
    pub command: u8,
    /// Reported value bytes
    pub value: Vec<u8>,
}

impl SamsungReply {
    /// Decode a reply frame, validating header, length and checksum.
    pub fn parse(frame: &[u8]) -> Result<Self, DriverError> {
        if frame.len() < 7 || frame[0] != HEADER || frame[1] != REPLY_MARKER {
            return Err(DriverError::MalformedFrame(frame.to_vec()));
        }
        let len = frame[3] as usize;
        if frame.len() != 4 + len + 1 || len < 2 {
            return Err(DriverError::MalformedFrame(frame.to_vec()));
        }
        let expected = checksum(&frame[1..frame.len() - 1]);
        if frame[frame.len() - 1] != expected {
            return Err(DriverError::MalformedFrame(frame.to_vec()));
        }

        Ok(Self {
            ack: frame[4] == b'A',
            command: frame[5],
            value: frame[6..4 + len].to_vec(),
        })
    }
}

/// Driver for Samsung MDC-protocol displays.
pub struct SamsungDriver {
    queue: CommandQueue,
    display_id: u8,
    state: DisplayState,
    notifier: StateNotifier,
    retries: RetryTracker,
}

impl SamsungDriver {
    /// Maximum send attempts per command before abandoning.
    const MAX_SEND_ATTEMPTS: u8 = 3;

    /// Create a driver for the display at `display_id` over a running queue.
    /// The queue should be framed with [`SamsungCommand::response_buffer`].
    pub fn new(queue: CommandQueue, display_id: u8) -> Self {
        Self {
            queue,
            display_id,
            state: DisplayState::default(),
            notifier: StateNotifier::default(),
            retries: RetryTracker::new(Self::MAX_SEND_ATTEMPTS),
        }
    }

    /// Last known display state.
    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    /// State-change fan-out for the embedding framework.
    pub fn notifier(&self) -> &StateNotifier {
        &self.notifier
    }

    /// Query power, volume, mute and input at poll priority.
    pub fn poll(&mut self) {
        for command in [CMD_POWER, CMD_VOLUME, CMD_MUTE, CMD_INPUT] {
            self.queue.enqueue_priority(
                SamsungCommand::query(command, self.display_id),
                POLL_PRIORITY,
            );
        }
    }

    /// Consume queue events until the engine stops.
    pub async fn run(&mut self, events: &mut QueueEvents) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
    }

    /// Apply one queue event to the driver's state machine.
    pub fn handle_event(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::Transmitted(_) => {}
            QueueEvent::Responded { command, frame } => self.handle_response(command, frame),
            QueueEvent::TimedOut(command) => self.handle_timeout(command),
            QueueEvent::Unsolicited(frame) => {
                debug!(display_id = self.display_id, frame = ?frame, "unsolicited frame");
            }
            QueueEvent::ConnectionChanged(true) => {
                self.retries.clear();
                self.poll();
            }
            QueueEvent::ConnectionChanged(false) => {
                self.state.invalidate();
                self.retries.clear();
            }
        }
    }

    fn handle_response(&mut self, command: Arc<dyn SerialCommand>, frame: Frame) {
        let Some(cmd) = command.as_any().downcast_ref::<SamsungCommand>() else {
            return;
        };
        let reply = match SamsungReply::parse(&frame) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(display_id = self.display_id, error = %e, "undecodable reply, state unchanged");
                return;
            }
        };
        let identity = format!("{:02x}", cmd.command());

        if !reply.ack {
            // MDC naks are definitive: the command or value is unsupported.
            warn!(
                display_id = self.display_id,
                command = cmd.label(),
                "display rejected command"
            );
            self.retries.reset(&identity);
            return;
        }

        self.retries.reset(&identity);
        self.apply_value(reply.command, &reply.value);
    }

    fn handle_timeout(&mut self, command: Arc<dyn SerialCommand>) {
        let Some(cmd) = command.as_any().downcast_ref::<SamsungCommand>() else {
            return;
        };
        let identity = format!("{:02x}", cmd.command());
        if self.retries.should_retry(&identity) {
            debug!(
                display_id = self.display_id,
                command = cmd.label(),
                "no response, retrying"
            );
            self.queue.requeue(command.clone(), RETRY_PRIORITY);
        }
    }

    fn apply_value(&mut self, command: u8, value: &[u8]) {
        let Some(&first) = value.first() else {
            return;
        };
        let mut changes: Vec<StateChange> = Vec::new();

        match command {
            CMD_POWER => {
                let power = if first == 1 {
                    PowerState::On
                } else {
                    PowerState::Off
                };
                if self.state.set_power(power) {
                    changes.push(StateChange::Power(power));
                }
            }
            CMD_VOLUME => {
                if self.state.set_volume(first) {
                    changes.push(StateChange::Volume(first));
                }
            }
            CMD_MUTE => {
                let mute = first == 1;
                if self.state.set_mute(mute) {
                    changes.push(StateChange::Mute(mute));
                }
            }
            CMD_INPUT => match input_for_code(first) {
                Some(input) => {
                    if self.state.set_input(input) {
                        changes.push(StateChange::Input(input));
                    }
                }
                None => {
                    warn!(display_id = self.display_id, code = first, "unknown input code")
                }
            },
            other => debug!(display_id = self.display_id, command = other, "unhandled reply"),
        }

        self.notifier.publish(&changes);
    }
}

impl PowerControllable for SamsungDriver {
    fn power_on(&mut self) {
        self.queue.enqueue(
            SamsungCommand::set(CMD_POWER, self.display_id, vec![1]).with_family("power"),
        );
    }

    fn power_off(&mut self) {
        self.queue.enqueue(
            SamsungCommand::set(CMD_POWER, self.display_id, vec![0]).with_family("power"),
        );
    }
}

impl InputSelectable for SamsungDriver {
    fn select_input(&mut self, input: InputSource) {
        match input_code(input) {
            Some(code) => self.queue.enqueue(
                SamsungCommand::set(CMD_INPUT, self.display_id, vec![code]).with_family("input"),
            ),
            None => warn!(
                display_id = self.display_id,
                input = ?input,
                "input not available on this display"
            ),
        }
    }
}

impl VolumeControllable for SamsungDriver {
    fn set_volume(&mut self, level: u8) {
        let level = level.min(100);
        self.queue.enqueue(
            SamsungCommand::set(CMD_VOLUME, self.display_id, vec![level]).with_family("volume"),
        );
    }

    fn volume(&self) -> Option<u8> {
        self.state.volume()
    }

    fn mute_on(&mut self) {
        self.queue
            .enqueue(SamsungCommand::set(CMD_MUTE, self.display_id, vec![1]).with_family("mute"));
    }

    fn mute_off(&mut self) {
        self.queue
            .enqueue(SamsungCommand::set(CMD_MUTE, self.display_id, vec![0]).with_family("mute"));
    }
}

//! Sharp display driver
//!
//! ASCII protocol: a four-character command mnemonic, a four-character
//! right-aligned parameter, and a trailing CR. Sets are acknowledged with
//! `OK`, rejected with `ERR`, or deferred with `WAIT` while the panel warms
//! up; queries use the parameter `????` and are answered with the value.
//!
//! Write acknowledgements are not trusted as state: after an `OK` the driver
//! re-queries the value at verification priority until the display reports
//! what was requested, bounded by the profile's attempt budget.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{ErrorClass, VendorProfile, POLL_PRIORITY, RETRY_PRIORITY, VERIFY_PRIORITY};
use crate::device::{
    DisplayState, InputSelectable, InputSource, PowerControllable, PowerState, RetryTracker,
    ScalingControllable, ScalingMode, StateChange, StateNotifier, VerifyOutcome, VerifyRetry,
    VolumeControllable,
};
use crate::framing::Frame;
use crate::transaction::{CommandQueue, QueueEvent, QueueEvents, SerialCommand};

/// Parameter value used for state queries.
const QUERY_PARAM: &str = "????";

/// One Sharp wire command: mnemonic, parameter, CR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharpCommand {
    code: String,
    param: String,
    family: Option<String>,
}

impl SharpCommand {
    /// Build a command from a mnemonic and a raw parameter field. The
    /// mnemonic is left-aligned and the parameter right-aligned, both
    /// space-padded to four characters.
    pub fn new(code: &str, param: &str) -> Self {
        let mut code = code.to_string();
        code.truncate(4);
        let mut param = param.to_string();
        param.truncate(4);
        Self {
            code: format!("{:<4}", code),
            param: format!("{:>4}", param),
            family: None,
        }
    }

    /// Build a set command carrying a numeric or textual value.
    pub fn set(code: &str, value: impl std::fmt::Display) -> Self {
        Self::new(code, &value.to_string())
    }

    /// Build a state query for a mnemonic.
    pub fn query(code: &str) -> Self {
        Self::new(code, QUERY_PARAM)
    }

    /// Attach the command-family equivalence key.
    pub fn with_family(mut self, family: &str) -> Self {
        self.family = Some(family.to_string());
        self
    }

    /// Decode wire bytes back into a command (the reply grammar echoes the
    /// command layout, so this also backs the round-trip tests).
    pub fn parse(bytes: &[u8]) -> Result<Self, super::DriverError> {
        let body = match bytes {
            [body @ .., b'\r'] => body,
            body => body,
        };
        if body.len() != 8 {
            return Err(super::DriverError::MalformedFrame(bytes.to_vec()));
        }
        let Ok(text) = std::str::from_utf8(body) else {
            return Err(super::DriverError::MalformedFrame(bytes.to_vec()));
        };
        Ok(Self {
            code: text[..4].to_string(),
            param: text[4..].to_string(),
            family: None,
        })
    }

    /// The four-character mnemonic, padding included.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The four-character parameter field, padding included.
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Whether this is a state query.
    pub fn is_query(&self) -> bool {
        self.param == QUERY_PARAM
    }
}

impl SerialCommand for SharpCommand {
    fn serialize(&self) -> Vec<u8> {
        format!("{}{}\r", self.code, self.param).into_bytes()
    }

    fn dedup_key(&self) -> Option<String> {
        self.family.clone()
    }

    fn label(&self) -> &str {
        &self.code
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// In-progress write verification: which mnemonic is being confirmed and
/// what the display should report.
struct PendingVerify {
    code: String,
    check: VerifyRetry<String>,
}

/// Driver for Sharp ASCII-protocol displays.
pub struct SharpDriver {
    queue: CommandQueue,
    profile: VendorProfile,
    state: DisplayState,
    notifier: StateNotifier,
    retries: RetryTracker,
    /// Only the most recent write is verified; a newer acknowledged write
    /// supersedes an unfinished verification. Query replies update state
    /// either way.
    verify: Option<PendingVerify>,
    trust: bool,
}

impl SharpDriver {
    /// Create a driver over a running queue. The queue should be framed
    /// with a CR [`DelimiterBuffer`](crate::framing::DelimiterBuffer).
    pub fn new(queue: CommandQueue, profile: VendorProfile) -> Self {
        let retries = RetryTracker::new(profile.max_send_attempts);
        Self {
            queue,
            profile,
            state: DisplayState::default(),
            notifier: StateNotifier::default(),
            retries,
            verify: None,
            trust: false,
        }
    }

    /// Trust mode: update cached state when a command is transmitted instead
    /// of waiting for verification. For links where replies are unavailable
    /// (one-way RS-232 runs, IR gateways).
    pub fn with_trust(mut self, trust: bool) -> Self {
        self.trust = trust;
        self
    }

    /// Last known display state.
    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    /// State-change fan-out for the embedding framework.
    pub fn notifier(&self) -> &StateNotifier {
        &self.notifier
    }

    /// Query every cached value at poll priority.
    pub fn poll(&mut self) {
        for code in ["POWR", "INPS", "VOLM", "MUTE", "WIDE"] {
            self.queue
                .enqueue_priority(SharpCommand::query(code), POLL_PRIORITY);
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
            QueueEvent::Transmitted(command) => {
                if !self.trust {
                    return;
                }
                if let Some(cmd) = command.as_any().downcast_ref::<SharpCommand>() {
                    if !cmd.is_query() {
                        let code = cmd.code().to_string();
                        let value = cmd.param().trim().to_string();
                        self.apply_value(&code, value);
                    }
                }
            }
            QueueEvent::Responded { command, frame } => self.handle_response(command, frame),
            QueueEvent::TimedOut(command) => self.handle_timeout(command),
            QueueEvent::Unsolicited(frame) => {
                debug!(
                    display = %self.profile.name,
                    frame = %String::from_utf8_lossy(&frame),
                    "unsolicited frame"
                );
            }
            QueueEvent::ConnectionChanged(true) => {
                debug!(display = %self.profile.name, "link online, polling state");
                self.retries.clear();
                self.poll();
            }
            QueueEvent::ConnectionChanged(false) => {
                // Cached values are untrustworthy across a link loss; the
                // reconnect poll repopulates them.
                self.state.invalidate();
                self.verify = None;
                self.retries.clear();
            }
        }
    }

    fn handle_response(&mut self, command: Arc<dyn SerialCommand>, frame: Frame) {
        let Some(cmd) = command.as_any().downcast_ref::<SharpCommand>() else {
            return;
        };
        let reply = match std::str::from_utf8(&frame) {
            Ok(text) => text.trim().to_string(),
            Err(_) => {
                warn!(
                    display = %self.profile.name,
                    frame = ?frame,
                    "undecodable reply, state unchanged"
                );
                return;
            }
        };
        let identity = format!("{}{}", cmd.code(), cmd.param());

        if let Some(class) = self.profile.classify(&reply) {
            match class {
                ErrorClass::Transient => {
                    if self.retries.should_retry(&identity) {
                        debug!(
                            display = %self.profile.name,
                            command = cmd.code(),
                            reply = %reply,
                            "display busy, retrying"
                        );
                        self.queue.requeue(command.clone(), RETRY_PRIORITY);
                    }
                }
                ErrorClass::Terminal => {
                    warn!(
                        display = %self.profile.name,
                        command = cmd.code(),
                        reply = %reply,
                        "display rejected command"
                    );
                    self.retries.reset(&identity);
                }
            }
            return;
        }

        self.retries.reset(&identity);

        if cmd.is_query() {
            let code = cmd.code().to_string();
            self.apply_value(&code, reply.clone());
            self.check_verification(&code, reply);
        } else if reply == "OK" {
            if !self.trust {
                self.begin_verification(cmd);
            }
        } else {
            debug!(
                display = %self.profile.name,
                command = cmd.code(),
                reply = %reply,
                "unexpected acknowledgement"
            );
        }
    }

    /// After a write is acknowledged, confirm the display really took it.
    fn begin_verification(&mut self, cmd: &SharpCommand) {
        let expected = cmd.param().trim().to_string();
        self.verify = Some(PendingVerify {
            code: cmd.code().to_string(),
            check: VerifyRetry::new(expected, self.profile.verify_attempts),
        });
        self.queue
            .enqueue_priority(SharpCommand::query(cmd.code()), VERIFY_PRIORITY);
    }

    fn check_verification(&mut self, code: &str, observed: String) {
        let Some(pending) = self.verify.as_mut() else {
            return;
        };
        if pending.code != code {
            return;
        }
        match pending.check.observe(&observed) {
            VerifyOutcome::Confirmed => {
                self.verify = None;
            }
            VerifyOutcome::Retry => {
                self.queue
                    .enqueue_priority(SharpCommand::query(code), VERIFY_PRIORITY);
            }
            VerifyOutcome::Exhausted => {
                warn!(
                    display = %self.profile.name,
                    command = code,
                    expected = %pending.check.expected(),
                    observed = %observed,
                    "write verification failed"
                );
                self.verify = None;
            }
        }
    }

    fn handle_timeout(&mut self, command: Arc<dyn SerialCommand>) {
        let Some(cmd) = command.as_any().downcast_ref::<SharpCommand>() else {
            return;
        };
        let identity = format!("{}{}", cmd.code(), cmd.param());
        if self.retries.should_retry(&identity) {
            debug!(
                display = %self.profile.name,
                command = cmd.code(),
                "no response, retrying"
            );
            self.queue.requeue(command.clone(), RETRY_PRIORITY);
        }
    }

    /// Decode a reported value and update the cache, publishing changes.
    fn apply_value(&mut self, code: &str, value: String) {
        let value = value.trim().to_string();
        let mut changes: Vec<StateChange> = Vec::new();

        match code.trim() {
            "POWR" => match value.as_str() {
                "1" => {
                    if self.state.set_power(PowerState::On) {
                        changes.push(StateChange::Power(PowerState::On));
                    }
                }
                "0" => {
                    if self.state.set_power(PowerState::Off) {
                        changes.push(StateChange::Power(PowerState::Off));
                    }
                }
                _ => warn!(display = %self.profile.name, value = %value, "unknown power value"),
            },
            "VOLM" => match value.parse::<u8>() {
                Ok(level) => {
                    if self.state.set_volume(level) {
                        changes.push(StateChange::Volume(level));
                    }
                }
                Err(_) => {
                    warn!(display = %self.profile.name, value = %value, "unknown volume value")
                }
            },
            "INPS" => match self.profile.input_for_code(&value) {
                Some(input) => {
                    if self.state.set_input(input) {
                        changes.push(StateChange::Input(input));
                    }
                }
                None => warn!(display = %self.profile.name, value = %value, "unknown input code"),
            },
            "MUTE" => match value.as_str() {
                "1" | "0" => {
                    let mute = value == "1";
                    if self.state.set_mute(mute) {
                        changes.push(StateChange::Mute(mute));
                    }
                }
                _ => warn!(display = %self.profile.name, value = %value, "unknown mute value"),
            },
            "WIDE" => match scaling_for_code(&value) {
                Some(mode) => {
                    if self.state.set_scaling(mode) {
                        changes.push(StateChange::Scaling(mode));
                    }
                }
                None => {
                    warn!(display = %self.profile.name, value = %value, "unknown scaling code")
                }
            },
            other => {
                debug!(display = %self.profile.name, code = other, "unhandled reply mnemonic")
            }
        }

        self.notifier.publish(&changes);
    }
}

fn scaling_code(mode: ScalingMode) -> &'static str {
    match mode {
        ScalingMode::Normal => "0",
        ScalingMode::Zoom => "1",
        ScalingMode::Wide => "2",
        ScalingMode::Native => "3",
    }
}

fn scaling_for_code(code: &str) -> Option<ScalingMode> {
    match code {
        "0" => Some(ScalingMode::Normal),
        "1" => Some(ScalingMode::Zoom),
        "2" => Some(ScalingMode::Wide),
        "3" => Some(ScalingMode::Native),
        _ => None,
    }
}

impl PowerControllable for SharpDriver {
    fn power_on(&mut self) {
        self.queue
            .enqueue(SharpCommand::set("POWR", 1).with_family("power"));
    }

    fn power_off(&mut self) {
        self.queue
            .enqueue(SharpCommand::set("POWR", 0).with_family("power"));
    }
}

impl InputSelectable for SharpDriver {
    fn select_input(&mut self, input: InputSource) {
        match self.profile.input_code(input) {
            Some(code) => {
                let cmd = SharpCommand::set("INPS", code).with_family("input");
                self.queue.enqueue(cmd);
            }
            None => warn!(
                display = %self.profile.name,
                input = ?input,
                "input not available on this display"
            ),
        }
    }
}

impl VolumeControllable for SharpDriver {
    fn set_volume(&mut self, level: u8) {
        let level = level.min(100);
        self.queue
            .enqueue(SharpCommand::set("VOLM", level).with_family("volume"));
    }

    fn volume(&self) -> Option<u8> {
        self.state.volume()
    }

    fn mute_on(&mut self) {
        self.queue
            .enqueue(SharpCommand::set("MUTE", 1).with_family("mute"));
    }

    fn mute_off(&mut self) {
        self.queue
            .enqueue(SharpCommand::set("MUTE", 0).with_family("mute"));
    }
}

impl ScalingControllable for SharpDriver {
    fn set_scaling(&mut self, mode: ScalingMode) {
        self.queue
            .enqueue(SharpCommand::set("WIDE", scaling_code(mode)).with_family("scaling"));
    }
}

//! Vendor profiles
//!
//! Immutable per-driver configuration: the input-code table and the
//! classification of vendor error replies. Owned by each driver instance and
//! loadable from JSON, so integrators can adjust codes for regional model
//! variants without a rebuild.

use serde::{Deserialize, Serialize};

use super::DriverError;
use crate::device::InputSource;

/// Whether a vendor error reply is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Busy/warming style rejection; retry after the display settles
    Transient,
    /// Bad command, bad parameter, unsupported; retrying cannot help
    Terminal,
}

/// Wire code for one selectable input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputCode {
    /// The generic input
    pub input: InputSource,
    /// The vendor's code for it
    pub code: String,
}

/// Classification of one vendor error reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRule {
    /// The reply text, compared after trimming
    pub reply: String,
    /// How the driver should react
    pub class: ErrorClass,
}

/// Per-vendor configuration data consumed by a driver instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorProfile {
    /// Vendor/model family name, for log output
    pub name: String,
    /// Input-code table
    pub inputs: Vec<InputCode>,
    /// Error-reply classification table
    pub errors: Vec<ErrorRule>,
    /// Total send attempts allowed per command before abandoning
    pub max_send_attempts: u8,
    /// Mismatched verification reads tolerated after a write
    pub verify_attempts: u8,
}

impl VendorProfile {
    /// Load a profile from JSON.
    pub fn from_json(json: &str) -> Result<Self, DriverError> {
        serde_json::from_str(json).map_err(|e| DriverError::Profile(e.to_string()))
    }

    /// The wire code for `input`, if this display has one.
    pub fn input_code(&self, input: InputSource) -> Option<&str> {
        self.inputs
            .iter()
            .find(|entry| entry.input == input)
            .map(|entry| entry.code.as_str())
    }

    /// Reverse lookup: the input a reported wire code corresponds to.
    pub fn input_for_code(&self, code: &str) -> Option<InputSource> {
        self.inputs
            .iter()
            .find(|entry| entry.code == code)
            .map(|entry| entry.input)
    }

    /// Classify a reply as an error, if the vendor's table lists it.
    pub fn classify(&self, reply: &str) -> Option<ErrorClass> {
        self.errors
            .iter()
            .find(|rule| rule.reply == reply)
            .map(|rule| rule.class)
    }

    /// Built-in profile for Sharp ASCII-protocol displays.
    pub fn sharp() -> Self {
        Self {
            name: "sharp".to_string(),
            inputs: vec![
                InputCode {
                    input: InputSource::Hdmi(1),
                    code: "1".to_string(),
                },
                InputCode {
                    input: InputSource::Hdmi(2),
                    code: "2".to_string(),
                },
                InputCode {
                    input: InputSource::DisplayPort,
                    code: "3".to_string(),
                },
                InputCode {
                    input: InputSource::Vga,
                    code: "4".to_string(),
                },
                InputCode {
                    input: InputSource::Component,
                    code: "5".to_string(),
                },
                InputCode {
                    input: InputSource::Tv,
                    code: "0".to_string(),
                },
            ],
            errors: vec![
                ErrorRule {
                    reply: "WAIT".to_string(),
                    class: ErrorClass::Transient,
                },
                ErrorRule {
                    reply: "ERR".to_string(),
                    class: ErrorClass::Terminal,
                },
            ],
            max_send_attempts: 3,
            verify_attempts: 3,
        }
    }
}

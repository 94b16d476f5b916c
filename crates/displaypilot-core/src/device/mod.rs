//! Device-side contracts
//!
//! The generic display abstraction drivers translate into vendor wire
//! protocols. Capabilities are composed per vendor rather than inherited: a
//! projector with no speakers simply does not implement
//! [`VolumeControllable`].

mod state;
mod verify;

pub use state::{DisplayState, StateChange, StateNotifier};
pub use verify::{RetryTracker, VerifyOutcome, VerifyRetry};

use serde::{Deserialize, Serialize};

/// Display power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    /// Panel lit and accepting commands
    On,
    /// Standby
    Off,
    /// Powering up; many displays reject commands in this phase
    Warming,
    /// Powering down
    Cooling,
}

/// Selectable video input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSource {
    /// HDMI input by 1-based index
    Hdmi(u8),
    /// DisplayPort
    DisplayPort,
    /// Analog VGA
    Vga,
    /// Component video
    Component,
    /// Internal tuner
    Tv,
}

/// Picture scaling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingMode {
    /// Source aspect preserved
    Normal,
    /// Zoomed to fill
    Zoom,
    /// Stretched wide
    Wide,
    /// Pixel-for-pixel
    Native,
}

/// Power control capability
pub trait PowerControllable {
    /// Request power on
    fn power_on(&mut self);
    /// Request standby
    fn power_off(&mut self);
}

/// Input selection capability
pub trait InputSelectable {
    /// Route the given input to the panel
    fn select_input(&mut self, input: InputSource);
}

/// Volume and mute capability
pub trait VolumeControllable {
    /// Set output volume (0-100)
    fn set_volume(&mut self, level: u8);
    /// Last known volume, if any
    fn volume(&self) -> Option<u8>;
    /// Mute audio
    fn mute_on(&mut self);
    /// Unmute audio
    fn mute_off(&mut self);
}

/// Picture scaling capability
pub trait ScalingControllable {
    /// Select the scaling mode
    fn set_scaling(&mut self, mode: ScalingMode);
}

//! Cached device state
//!
//! Mutation and notification are separate steps: setters report whether the
//! value changed, and the driver publishes the accumulated changes once the
//! update is complete. This keeps both halves independently testable.

use serde::Serialize;
use tokio::sync::broadcast;

use super::{InputSource, PowerState, ScalingMode};

/// One observed change to a display's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Power state changed
    Power(PowerState),
    /// Routed input changed
    Input(InputSource),
    /// Volume level changed
    Volume(u8),
    /// Mute changed
    Mute(bool),
    /// Scaling mode changed
    Scaling(ScalingMode),
}

/// Last known state of a display. Every field is `None` until first
/// confirmed (or, in trust mode, first transmitted).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplayState {
    power: Option<PowerState>,
    input: Option<InputSource>,
    volume: Option<u8>,
    mute: Option<bool>,
    scaling: Option<ScalingMode>,
}

impl DisplayState {
    /// Last known power state
    pub fn power(&self) -> Option<PowerState> {
        self.power
    }

    /// Last known input
    pub fn input(&self) -> Option<InputSource> {
        self.input
    }

    /// Last known volume
    pub fn volume(&self) -> Option<u8> {
        self.volume
    }

    /// Last known mute state
    pub fn mute(&self) -> Option<bool> {
        self.mute
    }

    /// Last known scaling mode
    pub fn scaling(&self) -> Option<ScalingMode> {
        self.scaling
    }

    /// Record a power state; returns whether the cached value changed.
    pub fn set_power(&mut self, value: PowerState) -> bool {
        Self::update(&mut self.power, value)
    }

    /// Record an input; returns whether the cached value changed.
    pub fn set_input(&mut self, value: InputSource) -> bool {
        Self::update(&mut self.input, value)
    }

    /// Record a volume; returns whether the cached value changed.
    pub fn set_volume(&mut self, value: u8) -> bool {
        Self::update(&mut self.volume, value)
    }

    /// Record mute; returns whether the cached value changed.
    pub fn set_mute(&mut self, value: bool) -> bool {
        Self::update(&mut self.mute, value)
    }

    /// Record a scaling mode; returns whether the cached value changed.
    pub fn set_scaling(&mut self, value: ScalingMode) -> bool {
        Self::update(&mut self.scaling, value)
    }

    /// Forget everything (used when the link is replaced).
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    fn update<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
        if slot.as_ref() == Some(&value) {
            return false;
        }
        *slot = Some(value);
        true
    }
}

/// Fan-out of state changes to the embedding framework.
#[derive(Debug, Clone)]
pub struct StateNotifier {
    tx: broadcast::Sender<StateChange>,
}

impl StateNotifier {
    /// Create a notifier with the given subscriber backlog capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.tx.subscribe()
    }

    /// Publish a batch of changes, in order. No-op without subscribers.
    pub fn publish(&self, changes: &[StateChange]) {
        for change in changes {
            let _ = self.tx.send(*change);
        }
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setter_reports_change() {
        let mut state = DisplayState::default();
        assert!(state.set_power(PowerState::On));
        assert!(!state.set_power(PowerState::On));
        assert!(state.set_power(PowerState::Off));
        assert_eq!(state.power(), Some(PowerState::Off));
    }

    #[test]
    fn test_unknown_until_first_set() {
        let state = DisplayState::default();
        assert_eq!(state.volume(), None);
        assert_eq!(state.input(), None);
    }

    #[test]
    fn test_invalidate_forgets() {
        let mut state = DisplayState::default();
        state.set_volume(25);
        state.invalidate();
        assert_eq!(state.volume(), None);
    }

    #[test]
    fn test_notifier_delivers_in_order() {
        let notifier = StateNotifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.publish(&[StateChange::Power(PowerState::On), StateChange::Volume(10)]);
        assert_eq!(rx.try_recv().unwrap(), StateChange::Power(PowerState::On));
        assert_eq!(rx.try_recv().unwrap(), StateChange::Volume(10));
    }
}

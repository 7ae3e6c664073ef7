//! Input devices: raw inputs, push buttons and position sensors

use std::time::Duration;

use fixture_core::{ButtonStatus, Edge, Level, Result, TriggerMode};
use tokio::time::Instant;

use super::{DeviceId, PressSensing, Sensing};
use crate::pins::{BoxedInputPin, InputPin};

/// A target registered for edge propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTarget {
    pub target: DeviceId,
    pub mode: TriggerMode,
}

/// A transition observed on an input, with the level it settled at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub edge: Edge,
    /// True if the input left its idle level
    pub activated: bool,
}

/// A digital input whose idle level follows its pull direction
pub struct InputDevice {
    pin: BoxedInputPin,
    idle: Level,
    last_level: Level,
    targets: Vec<BoundTarget>,
}

impl InputDevice {
    pub fn new(pin: BoxedInputPin, pull_up: bool) -> Self {
        let idle = Level::from(pull_up);
        Self {
            pin,
            idle,
            last_level: idle,
            targets: Vec::new(),
        }
    }

    /// Rest level of the input
    pub fn idle_level(&self) -> Level {
        self.idle
    }

    /// Raw pin level
    pub fn level(&mut self) -> Result<Level> {
        Ok(Level::from(self.pin.is_high()?))
    }

    /// Register `target` for propagation on edges matching `mode`.
    /// Duplicates are appended, not merged.
    pub fn bind(&mut self, target: DeviceId, mode: TriggerMode) {
        self.targets.push(BoundTarget { target, mode });
    }

    pub fn unbind(&mut self) {
        self.targets.clear();
    }

    pub fn targets(&self) -> &[BoundTarget] {
        &self.targets
    }

    /// Sample the pin and report a transition since the previous sample.
    pub fn poll_transition(&mut self) -> Result<Option<Transition>> {
        let level = self.level()?;
        let edge = Edge::between(self.last_level, level);
        self.last_level = level;
        Ok(edge.map(|edge| Transition {
            edge,
            activated: level != self.idle,
        }))
    }
}

impl Sensing for InputDevice {
    fn read(&mut self) -> Result<bool> {
        Ok(self.level()? != self.idle)
    }
}

/// Position sensor
pub struct Sensor {
    input: InputDevice,
}

impl Sensor {
    pub fn new(pin: BoxedInputPin, pull_up: bool) -> Self {
        Self {
            input: InputDevice::new(pin, pull_up),
        }
    }

    pub fn input(&self) -> &InputDevice {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputDevice {
        &mut self.input
    }
}

impl Sensing for Sensor {
    fn read(&mut self) -> Result<bool> {
        self.input.read()
    }
}

/// Push button with long-press detection
pub struct Button {
    input: InputDevice,
    long_press: Duration,
    pressed_since: Option<Instant>,
    status: ButtonStatus,
}

impl Button {
    pub fn new(pin: BoxedInputPin, pull_up: bool, long_press: Duration) -> Self {
        Self {
            input: InputDevice::new(pin, pull_up),
            long_press,
            pressed_since: None,
            status: ButtonStatus::Idle,
        }
    }

    pub fn input(&self) -> &InputDevice {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputDevice {
        &mut self.input
    }

    pub fn long_press(&self) -> Duration {
        self.long_press
    }

    /// Status computed by the last `read_status()` call
    pub fn last_status(&self) -> ButtonStatus {
        self.status
    }

    /// When the current press started, if pressed
    pub fn pressed_since(&self) -> Option<Instant> {
        self.pressed_since
    }
}

impl Sensing for Button {
    fn read(&mut self) -> Result<bool> {
        self.input.read()
    }
}

impl PressSensing for Button {
    fn read_status(&mut self) -> Result<ButtonStatus> {
        self.status = if self.input.read()? {
            let now = Instant::now();
            let since = *self.pressed_since.get_or_insert(now);
            if now.duration_since(since) >= self.long_press {
                ButtonStatus::LongPress
            } else {
                ButtonStatus::ShortPress
            }
        } else {
            self.pressed_since = None;
            ButtonStatus::Idle
        };
        Ok(self.status)
    }
}

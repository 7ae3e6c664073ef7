//! Output devices: solenoid drivers and indicator LEDs

use fixture_core::{Level, Result};

use super::Actionable;
use crate::pins::{pin_state, BoxedOutputPin, OutputPin, StatefulOutputPin};

/// A single output pin with configurable asserted polarity
pub struct OutputDevice {
    pin: BoxedOutputPin,
    asserted: Level,
}

impl OutputDevice {
    pub fn new(pin: BoxedOutputPin, asserted: Level) -> Self {
        Self { pin, asserted }
    }

    /// Level that `on()` drives
    pub fn asserted(&self) -> Level {
        self.asserted
    }

    /// Level the pin is currently driven to
    pub fn level(&mut self) -> Result<Level> {
        Ok(Level::from(self.pin.is_set_high()?))
    }

    /// Drive a raw level, bypassing polarity
    pub fn set_level(&mut self, level: Level) -> Result<()> {
        Ok(self.pin.set_state(pin_state(level))?)
    }

    /// Whether the output currently sits at its asserted level
    pub fn is_on(&mut self) -> Result<bool> {
        Ok(self.level()? == self.asserted)
    }
}

impl Actionable for OutputDevice {
    fn on(&mut self) -> Result<()> {
        self.set_level(self.asserted)
    }

    fn off(&mut self) -> Result<()> {
        self.set_level(self.asserted.inverted())
    }

    /// Drive low regardless of polarity
    fn stop(&mut self) -> Result<()> {
        Ok(self.pin.set_low()?)
    }
}

/// Indicator LED; an [`OutputDevice`] that is active-low by default
pub struct Led {
    output: OutputDevice,
}

impl Led {
    pub const DEFAULT_ASSERTED: Level = Level::Low;

    pub fn new(pin: BoxedOutputPin, asserted: Level) -> Self {
        Self {
            output: OutputDevice::new(pin, asserted),
        }
    }

    pub fn output(&self) -> &OutputDevice {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputDevice {
        &mut self.output
    }
}

impl Actionable for Led {
    fn on(&mut self) -> Result<()> {
        self.output.on()
    }

    fn off(&mut self) -> Result<()> {
        self.output.off()
    }

    fn stop(&mut self) -> Result<()> {
        self.output.stop()
    }
}

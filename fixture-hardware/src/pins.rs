//! Collaborator boundary for pin-level I/O
//!
//! Devices never talk to hardware directly; they hold boxed
//! [`embedded_hal`] pins handed out by a [`PinProvider`]. Backends:
//! [`crate::sim`] for tests and `--mock`, [`crate::sysfs`] for Linux boards.
//! The LED board expander is reached through [`PortExpander`], implemented by
//! [`crate::expander::Cat9555`] over any [`embedded_hal::i2c::I2c`] bus.

pub use embedded_hal::digital::{InputPin, OutputPin, PinState, StatefulOutputPin};
pub use embedded_hal::pwm::SetDutyCycle;

use embedded_hal::{digital, pwm};
use fixture_core::{FixtureError, Level, Result};
use thiserror::Error;

/// Error raised by a pin or PWM backend
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PinError(String);

impl PinError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl digital::Error for PinError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for PinError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

impl From<FixtureError> for PinError {
    fn from(err: FixtureError) -> Self {
        Self(err.to_string())
    }
}

impl From<PinError> for FixtureError {
    fn from(err: PinError) -> Self {
        FixtureError::Hardware(err.0)
    }
}

/// Output pin that can report the level it drives
pub type BoxedOutputPin = Box<dyn StatefulOutputPin<Error = PinError> + Send>;

pub type BoxedInputPin = Box<dyn InputPin<Error = PinError> + Send>;

/// PWM channel driving the breathing LED
pub type BoxedPwm = Box<dyn SetDutyCycle<Error = PinError> + Send>;

pub fn pin_state(level: Level) -> PinState {
    PinState::from(level == Level::High)
}

/// Hands out pins by number
pub trait PinProvider {
    /// Claim `pin` as an output, initially driven low
    fn output_pin(&self, pin: u32) -> Result<BoxedOutputPin>;

    /// Claim `pin` as an input with the requested pull direction
    fn input_pin(&self, pin: u32, pull_up: bool) -> Result<BoxedInputPin>;
}

/// Two-port GPIO expander, as seen by the LED board
pub trait PortExpander: Send {
    /// Write both output port registers
    fn write_ports(&mut self, ports: [u8; 2]) -> Result<()>;

    /// Read both input port registers
    fn read_ports(&mut self) -> Result<[u8; 2]>;

    /// Configure pin directions; a 0 bit makes the pin an output
    fn set_port_directions(&mut self, directions: [u8; 2]) -> Result<()>;
}

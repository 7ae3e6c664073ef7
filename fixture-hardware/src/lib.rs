//! fixture-hardware
//!
//! Everything that touches pins, buses or the host link. Devices hold boxed
//! pins handed out by a [`PinProvider`]; the daemon chooses the simulated or
//! sysfs backend at startup.
//!
//! Public API:
//! - `devices::DeviceGraph`: named devices, bindings and cylinder fan-out
//! - `led_board::LedBoard`: status LEDs behind a port expander
//! - `expander::Cat9555`: the expander's register driver over `embedded_hal` I2C
//! - `serial_driver::SerialDriver`: host command link (serial port or stdio)
//! - `sim`: simulated pins, PWM, expander and link for `--mock` and tests

pub mod devices;
pub mod expander;
pub mod led_board;
pub mod pins;
pub mod serial_driver;
pub mod sim;
pub mod sysfs;

pub use devices::{
    Action, Actionable, Button, Cylinder, Device, DeviceGraph, DeviceId, InputDevice, Led,
    OutputDevice, PressSensing, Sensing, Sensor,
};
pub use expander::Cat9555;
pub use led_board::{IomuxRegister, LedBoard, LedColor};
pub use pins::{BoxedInputPin, BoxedOutputPin, BoxedPwm, PinError, PinProvider, PortExpander};
pub use serial_driver::{SerialDriver, SerialLink};

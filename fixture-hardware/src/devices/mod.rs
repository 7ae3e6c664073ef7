//! Device model
//!
//! Devices are grouped by capability: [`Actionable`] outputs, [`Sensing`]
//! inputs and [`PressSensing`] buttons. A [`Cylinder`] is a composite whose
//! members are other devices in the same [`DeviceGraph`], referenced by
//! [`DeviceId`].

mod cylinder;
mod graph;
mod input;
mod output;

pub use cylinder::Cylinder;
pub use graph::DeviceGraph;
pub use input::{BoundTarget, Button, InputDevice, Sensor, Transition};
pub use output::{Led, OutputDevice};

use fixture_core::{ButtonStatus, Level, Result};

/// Devices that can be switched
pub trait Actionable {
    fn on(&mut self) -> Result<()>;
    fn off(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Devices that report whether they have left their rest level
pub trait Sensing {
    fn read(&mut self) -> Result<bool>;
}

/// Sensing devices that also track how long they have been pressed
pub trait PressSensing: Sensing {
    fn read_status(&mut self) -> Result<ButtonStatus>;
}

/// Index of a device inside a [`DeviceGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

/// One of the [`Actionable`] operations, as a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    On,
    Off,
    Stop,
}

impl Action {
    pub fn apply(self, device: &mut dyn Actionable) -> Result<()> {
        match self {
            Action::On => device.on(),
            Action::Off => device.off(),
            Action::Stop => device.stop(),
        }
    }
}

/// Every device kind the registry can construct
pub enum Device {
    Output(OutputDevice),
    Led(Led),
    Cylinder(Cylinder),
    Input(InputDevice),
    Button(Button),
    Sensor(Sensor),
}

impl Device {
    /// Class name as written in hardware profiles
    pub fn class_name(&self) -> &'static str {
        match self {
            Device::Output(_) => "OutputDev",
            Device::Led(_) => "LED",
            Device::Cylinder(_) => "Cylinder",
            Device::Input(_) => "InputDev",
            Device::Button(_) => "Button",
            Device::Sensor(_) => "Sensor",
        }
    }

    /// True for devices that accept `on/off/stop`, composites included
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Device::Output(_) | Device::Led(_) | Device::Cylinder(_)
        )
    }

    /// The pin-backed output, for leaf actuators
    pub fn output(&self) -> Option<&OutputDevice> {
        match self {
            Device::Output(dev) => Some(dev),
            Device::Led(led) => Some(led.output()),
            _ => None,
        }
    }

    pub fn output_mut(&mut self) -> Option<&mut OutputDevice> {
        match self {
            Device::Output(dev) => Some(dev),
            Device::Led(led) => Some(led.output_mut()),
            _ => None,
        }
    }

    /// The underlying input, for anything that can emit edges
    pub fn input(&self) -> Option<&InputDevice> {
        match self {
            Device::Input(input) => Some(input),
            Device::Button(button) => Some(button.input()),
            Device::Sensor(sensor) => Some(sensor.input()),
            _ => None,
        }
    }

    pub fn input_mut(&mut self) -> Option<&mut InputDevice> {
        match self {
            Device::Input(input) => Some(input),
            Device::Button(button) => Some(button.input_mut()),
            Device::Sensor(sensor) => Some(sensor.input_mut()),
            _ => None,
        }
    }

    pub fn as_sensing_mut(&mut self) -> Option<&mut dyn Sensing> {
        match self {
            Device::Input(input) => Some(input),
            Device::Button(button) => Some(button),
            Device::Sensor(sensor) => Some(sensor),
            _ => None,
        }
    }

    /// Raw pin level, `None` for composites
    pub fn pin_level(&mut self) -> Option<Result<Level>> {
        if let Some(output) = self.output_mut() {
            return Some(output.level());
        }
        self.input_mut().map(InputDevice::level)
    }
}

//! Arena of named devices and the bindings between them

use std::collections::HashMap;

use fixture_core::{ButtonStatus, FixtureError, Level, Result, TriggerMode};
use tracing::{debug, trace};

use super::{Action, Device, DeviceId, PressSensing};

/// Owns every device, indexed both by [`DeviceId`] and by name.
///
/// Built once at startup; afterwards only device state changes, never the
/// set of devices.
#[derive(Default)]
pub struct DeviceGraph {
    devices: Vec<Device>,
    names: Vec<String>,
    index: HashMap<String, DeviceId>,
}

impl DeviceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `device` under `name`. Names are unique.
    pub fn add(&mut self, name: impl Into<String>, device: Device) -> Result<DeviceId> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(FixtureError::Config(format!(
                "Device '{}' declared twice",
                name
            )));
        }
        let id = DeviceId(self.devices.len());
        debug!("Added {} device '{}'", device.class_name(), name);
        self.devices.push(device);
        self.index.insert(name.clone(), id);
        self.names.push(name);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<DeviceId> {
        self.index.get(name).copied()
    }

    /// Like [`DeviceGraph::id`], but a missing name is an error
    pub fn lookup(&self, name: &str) -> Result<DeviceId> {
        self.id(name)
            .ok_or_else(|| FixtureError::DeviceNotFound(name.to_string()))
    }

    pub fn name(&self, id: DeviceId) -> &str {
        &self.names[id.0]
    }

    pub fn get(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    pub fn get_mut(&mut self, id: DeviceId) -> &mut Device {
        &mut self.devices[id.0]
    }

    /// Devices in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &str, &Device)> {
        self.devices
            .iter()
            .zip(self.names.iter())
            .enumerate()
            .map(|(i, (device, name))| (DeviceId(i), name.as_str(), device))
    }

    fn unsupported(&self, id: DeviceId, capability: &'static str) -> FixtureError {
        FixtureError::UnsupportedCapability {
            device: self.name(id).to_string(),
            capability,
        }
    }

    /// Apply `action` to a device; cylinders fan out to their members in
    /// registration order.
    pub fn apply(&mut self, id: DeviceId, action: Action) -> Result<()> {
        if let Device::Cylinder(cylinder) = &self.devices[id.0] {
            for member in cylinder.members().to_vec() {
                self.apply(member, action)?;
            }
            return Ok(());
        }

        match &mut self.devices[id.0] {
            Device::Output(dev) => action.apply(dev),
            Device::Led(led) => action.apply(led),
            _ => Err(self.unsupported(id, "on/off")),
        }
    }

    pub fn on(&mut self, id: DeviceId) -> Result<()> {
        self.apply(id, Action::On)
    }

    pub fn off(&mut self, id: DeviceId) -> Result<()> {
        self.apply(id, Action::Off)
    }

    pub fn stop(&mut self, id: DeviceId) -> Result<()> {
        self.apply(id, Action::Stop)
    }

    pub fn read(&mut self, id: DeviceId) -> Result<bool> {
        match self.devices[id.0].as_sensing_mut() {
            Some(sensing) => sensing.read(),
            None => Err(self.unsupported(id, "read")),
        }
    }

    pub fn read_status(&mut self, id: DeviceId) -> Result<ButtonStatus> {
        match &mut self.devices[id.0] {
            Device::Button(button) => button.read_status(),
            _ => Err(self.unsupported(id, "read_status")),
        }
    }

    pub fn pin_level(&mut self, id: DeviceId) -> Result<Level> {
        match self.devices[id.0].pin_level() {
            Some(level) => level,
            None => Err(self.unsupported(id, "pin access")),
        }
    }

    /// Drive an output's pin to a raw level, ignoring polarity
    pub fn set_pin_level(&mut self, id: DeviceId, level: Level) -> Result<()> {
        match self.devices[id.0].output_mut() {
            Some(output) => output.set_level(level),
            None => Err(self.unsupported(id, "pin output")),
        }
    }

    /// Register `target` on `source`.
    ///
    /// Inputs propagate edges matching `mode` (both edges when absent);
    /// cylinders take the target as a member and ignore `mode`. Anything
    /// else, or a target without `on/off`, is a configuration error.
    pub fn bind(
        &mut self,
        source: DeviceId,
        target: DeviceId,
        mode: Option<TriggerMode>,
    ) -> Result<()> {
        if !self.devices[target.0].is_actionable() {
            return Err(FixtureError::Config(format!(
                "Binding target '{}' ({}) has no on/off",
                self.name(target),
                self.devices[target.0].class_name()
            )));
        }

        if matches!(self.devices[source.0], Device::Cylinder(_))
            && (source == target || self.reaches(target, source))
        {
            return Err(FixtureError::Config(format!(
                "Binding '{}' -> '{}' would make a cylinder contain itself",
                self.name(source),
                self.name(target)
            )));
        }

        let source_device = &self.devices[source.0];
        if !matches!(source_device, Device::Cylinder(_)) && source_device.input().is_none() {
            return Err(FixtureError::Config(format!(
                "Binding source '{}' ({}) cannot emit edges",
                self.name(source),
                source_device.class_name()
            )));
        }

        match &mut self.devices[source.0] {
            Device::Cylinder(cylinder) => cylinder.bind(target),
            device => {
                if let Some(input) = device.input_mut() {
                    input.bind(target, mode.unwrap_or_default());
                }
            }
        }
        Ok(())
    }

    /// Clear every target registered on `id`
    pub fn unbind(&mut self, id: DeviceId) {
        match &mut self.devices[id.0] {
            Device::Cylinder(cylinder) => cylinder.unbind(),
            device => {
                if let Some(input) = device.input_mut() {
                    input.unbind();
                }
            }
        }
    }

    /// Whether `goal` is reachable from `start` through cylinder membership
    fn reaches(&self, start: DeviceId, goal: DeviceId) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.devices.len()];
        while let Some(id) = stack.pop() {
            if id == goal {
                return true;
            }
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            if let Device::Cylinder(cylinder) = &self.devices[id.0] {
                stack.extend_from_slice(cylinder.members());
            }
        }
        false
    }

    /// Sample every input with bound targets and propagate new edges.
    ///
    /// Leaving the idle level turns targets on, returning to it turns them
    /// off. Returns the number of target actions performed.
    pub fn poll_bindings(&mut self) -> Result<usize> {
        let mut fired = 0;
        for index in 0..self.devices.len() {
            let Some(input) = self.devices[index].input_mut() else {
                continue;
            };
            if input.targets().is_empty() {
                continue;
            }
            let Some(transition) = input.poll_transition()? else {
                continue;
            };
            let targets = input.targets().to_vec();

            let action = if transition.activated {
                Action::On
            } else {
                Action::Off
            };
            trace!(
                "{:?} edge on '{}', propagating {:?}",
                transition.edge,
                self.names[index],
                action
            );
            for bound in targets.iter().filter(|b| b.mode.matches(transition.edge)) {
                self.apply(bound.target, action)?;
                fired += 1;
            }
        }
        Ok(fired)
    }

    /// Drive every leaf output to its `stop()` level
    pub fn stop_outputs(&mut self) -> Result<()> {
        for device in &mut self.devices {
            match device {
                Device::Output(dev) => Action::Stop.apply(dev)?,
                Device::Led(led) => Action::Stop.apply(led)?,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Button, Cylinder, Led, OutputDevice, Sensor};
    use crate::pins::PinProvider;
    use crate::sim::SimPinBank;
    use std::time::Duration;

    fn output(bank: &SimPinBank, pin: u32) -> Device {
        Device::Output(OutputDevice::new(bank.output_pin(pin).unwrap(), Level::High))
    }

    #[test]
    fn test_names_resolve_in_declaration_order() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        graph.add("b", output(&bank, 1)).unwrap();
        graph.add("a", output(&bank, 2)).unwrap();

        let names: Vec<_> = graph.iter().map(|(_, name, _)| name.to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(graph.id("a"), Some(DeviceId(1)));
        assert!(matches!(
            graph.lookup("missing"),
            Err(FixtureError::DeviceNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        graph.add("valve", output(&bank, 1)).unwrap();
        assert!(graph.add("valve", output(&bank, 2)).is_err());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_cylinder_fans_out_to_members() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        let cyl = graph.add("cyl", Device::Cylinder(Cylinder::new())).unwrap();
        let v1 = graph.add("v1", output(&bank, 1)).unwrap();
        let v2 = graph.add("v2", output(&bank, 2)).unwrap();
        graph.bind(cyl, v1, None).unwrap();
        graph.bind(cyl, v2, None).unwrap();

        graph.on(cyl).unwrap();
        assert_eq!(bank.level(1), Some(Level::High));
        assert_eq!(bank.level(2), Some(Level::High));

        graph.off(cyl).unwrap();
        assert_eq!(bank.level(1), Some(Level::Low));
        assert_eq!(bank.level(2), Some(Level::Low));
    }

    #[test]
    fn test_nested_cylinder_and_cycle_rejection() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        let outer = graph.add("outer", Device::Cylinder(Cylinder::new())).unwrap();
        let inner = graph.add("inner", Device::Cylinder(Cylinder::new())).unwrap();
        let valve = graph.add("valve", output(&bank, 7)).unwrap();

        graph.bind(outer, inner, None).unwrap();
        graph.bind(inner, valve, None).unwrap();
        graph.on(outer).unwrap();
        assert_eq!(bank.level(7), Some(Level::High));

        assert!(graph.bind(inner, outer, None).is_err());
        assert!(graph.bind(outer, outer, None).is_err());
    }

    #[test]
    fn test_bind_rejects_missing_capabilities() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        let led = graph
            .add("led", Device::Led(Led::new(bank.output_pin(2).unwrap(), Level::Low)))
            .unwrap();
        let sensor = graph
            .add(
                "sensor",
                Device::Sensor(Sensor::new(bank.input_pin(3, true).unwrap(), true)),
            )
            .unwrap();

        // Sensors cannot be switched
        assert!(matches!(
            graph.bind(led, sensor, None),
            Err(FixtureError::Config(_))
        ));
        // LEDs cannot emit edges
        let other = graph.add("other", output(&bank, 4)).unwrap();
        assert!(matches!(
            graph.bind(led, other, None),
            Err(FixtureError::Config(_))
        ));
        assert!(graph.on(sensor).is_err());
        assert!(graph.read(led).is_err());
    }

    #[test]
    fn test_edge_propagation_follows_mode() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        let button = graph
            .add(
                "button",
                Device::Button(Button::new(
                    bank.input_pin(20, true).unwrap(),
                    true,
                    Duration::from_millis(1500),
                )),
            )
            .unwrap();
        let both = graph.add("both", output(&bank, 1)).unwrap();
        let falling = graph.add("falling", output(&bank, 2)).unwrap();
        graph.bind(button, both, None).unwrap();
        graph.bind(button, falling, Some(TriggerMode::Falling)).unwrap();

        assert_eq!(graph.poll_bindings().unwrap(), 0);

        bank.set(20, Level::Low);
        assert_eq!(graph.poll_bindings().unwrap(), 2);
        assert_eq!(bank.level(1), Some(Level::High));
        assert_eq!(bank.level(2), Some(Level::High));

        // No new edge, nothing fires
        assert_eq!(graph.poll_bindings().unwrap(), 0);

        bank.set(20, Level::High);
        assert_eq!(graph.poll_bindings().unwrap(), 1);
        assert_eq!(bank.level(1), Some(Level::Low));
        assert_eq!(bank.level(2), Some(Level::High));
    }

    #[test]
    fn test_duplicate_binding_fires_twice() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        let sensor = graph
            .add(
                "sensor",
                Device::Sensor(Sensor::new(bank.input_pin(5, true).unwrap(), true)),
            )
            .unwrap();
        let led = graph.add("led", output(&bank, 6)).unwrap();
        graph.bind(sensor, led, None).unwrap();
        graph.bind(sensor, led, None).unwrap();

        bank.set(5, Level::Low);
        assert_eq!(graph.poll_bindings().unwrap(), 2);

        graph.unbind(sensor);
        bank.set(5, Level::High);
        assert_eq!(graph.poll_bindings().unwrap(), 0);
    }

    #[test]
    fn test_raw_pin_access_and_stop_outputs() {
        let bank = SimPinBank::new();
        let mut graph = DeviceGraph::new();
        let led = graph
            .add("led", Device::Led(Led::new(bank.output_pin(2).unwrap(), Level::Low)))
            .unwrap();
        let cyl = graph.add("cyl", Device::Cylinder(Cylinder::new())).unwrap();

        graph.set_pin_level(led, Level::High).unwrap();
        assert_eq!(graph.pin_level(led).unwrap(), Level::High);
        assert!(graph.pin_level(cyl).is_err());
        assert!(graph.set_pin_level(cyl, Level::High).is_err());

        graph.stop_outputs().unwrap();
        assert_eq!(bank.level(2), Some(Level::Low));
    }
}

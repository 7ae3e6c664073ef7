//! Device registry and hardware profile loader
//!
//! Device classes resolve through an explicit constructor table. Every
//! device is built before any binding is resolved, so bindings may refer to
//! devices declared later in the profile.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use fixture_core::{
    BindingSpec, DeviceSpec, FixtureError, HardwareProfile, Level, Result, DEFAULT_LONG_PRESS_MS,
};
use fixture_hardware::{
    Button, Cylinder, Device, DeviceGraph, DeviceId, InputDevice, Led, OutputDevice, PinProvider,
    Sensor,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Builds one device from its constructor parameters
pub type Constructor = fn(&dyn PinProvider, Map<String, Value>) -> Result<Device>;

fn default_true() -> bool {
    true
}

fn default_long_press() -> u64 {
    DEFAULT_LONG_PRESS_MS
}

fn default_output_asserted() -> u8 {
    1
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputParams {
    pin: u32,
    #[serde(default = "default_output_asserted")]
    asserted: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LedParams {
    pin: u32,
    #[serde(default)]
    asserted: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CylinderParams {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InputParams {
    pin: u32,
    #[serde(default = "default_true")]
    pull_up: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ButtonParams {
    pin: u32,
    #[serde(default = "default_true")]
    pull_up: bool,
    /// Milliseconds
    #[serde(default = "default_long_press")]
    long_press: u64,
}

fn parse_params<T: DeserializeOwned>(class: &str, params: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| FixtureError::Config(format!("Invalid parameters for {}: {}", class, e)))
}

fn build_output(pins: &dyn PinProvider, params: Map<String, Value>) -> Result<Device> {
    let p: OutputParams = parse_params("OutputDev", params)?;
    Ok(Device::Output(OutputDevice::new(
        pins.output_pin(p.pin)?,
        Level::from_raw(p.asserted),
    )))
}

fn build_led(pins: &dyn PinProvider, params: Map<String, Value>) -> Result<Device> {
    let p: LedParams = parse_params("LED", params)?;
    Ok(Device::Led(Led::new(
        pins.output_pin(p.pin)?,
        Level::from_raw(p.asserted),
    )))
}

fn build_cylinder(_pins: &dyn PinProvider, params: Map<String, Value>) -> Result<Device> {
    let _: CylinderParams = parse_params("Cylinder", params)?;
    Ok(Device::Cylinder(Cylinder::new()))
}

fn build_input(pins: &dyn PinProvider, params: Map<String, Value>) -> Result<Device> {
    let p: InputParams = parse_params("InputDev", params)?;
    Ok(Device::Input(InputDevice::new(
        pins.input_pin(p.pin, p.pull_up)?,
        p.pull_up,
    )))
}

fn build_sensor(pins: &dyn PinProvider, params: Map<String, Value>) -> Result<Device> {
    let p: InputParams = parse_params("Sensor", params)?;
    Ok(Device::Sensor(Sensor::new(
        pins.input_pin(p.pin, p.pull_up)?,
        p.pull_up,
    )))
}

fn build_button(pins: &dyn PinProvider, params: Map<String, Value>) -> Result<Device> {
    let p: ButtonParams = parse_params("Button", params)?;
    Ok(Device::Button(Button::new(
        pins.input_pin(p.pin, p.pull_up)?,
        p.pull_up,
        Duration::from_millis(p.long_press),
    )))
}

/// Class name to constructor table
pub struct DeviceFactory {
    constructors: HashMap<&'static str, Constructor>,
}

impl Default for DeviceFactory {
    fn default() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register("OutputDev", build_output);
        factory.register("OutputDevice", build_output);
        factory.register("LED", build_led);
        factory.register("Cylinder", build_cylinder);
        factory.register("InputDev", build_input);
        factory.register("InputDevice", build_input);
        factory.register("Sensor", build_sensor);
        factory.register("Button", build_button);
        factory
    }
}

impl DeviceFactory {
    pub fn register(&mut self, class: &'static str, constructor: Constructor) {
        self.constructors.insert(class, constructor);
    }

    pub fn build(&self, pins: &dyn PinProvider, spec: &DeviceSpec) -> Result<Device> {
        let constructor = self
            .constructors
            .get(spec.class.as_str())
            .ok_or_else(|| FixtureError::UnknownDeviceClass(spec.class.clone()))?;
        constructor(pins, spec.params.clone())
    }
}

/// Counts from one profile load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub devices: usize,
    pub bindings_installed: usize,
    pub bindings_skipped: usize,
}

/// Builds the device graph from a hardware profile
pub struct DeviceRegistry {
    pins: Box<dyn PinProvider>,
    factory: DeviceFactory,
    graph: DeviceGraph,
}

impl DeviceRegistry {
    pub fn new(pins: Box<dyn PinProvider>) -> Self {
        Self::with_factory(pins, DeviceFactory::default())
    }

    pub fn with_factory(pins: Box<dyn PinProvider>, factory: DeviceFactory) -> Self {
        Self {
            pins,
            factory,
            graph: DeviceGraph::new(),
        }
    }

    pub fn graph(&self) -> &DeviceGraph {
        &self.graph
    }

    pub fn into_graph(self) -> DeviceGraph {
        self.graph
    }

    /// Construct a device of `spec.class` and store it under `name`.
    pub fn create_device(&mut self, name: &str, spec: &DeviceSpec) -> Result<DeviceId> {
        let device = self.factory.build(self.pins.as_ref(), spec).map_err(|e| match e {
            FixtureError::Config(msg) => {
                FixtureError::Config(format!("Device '{}': {}", name, msg))
            }
            other => other,
        })?;
        self.graph.add(name, device)
    }

    /// Read and apply a hardware profile file.
    pub async fn load_config(&mut self, path: &Path) -> Result<LoadReport> {
        info!("Loading hardware profile from {}", path.display());
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            FixtureError::Config(format!(
                "Failed to read hardware profile {}: {}",
                path.display(),
                e
            ))
        })?;
        let profile = HardwareProfile::from_json(&content)?;
        self.load_profile(&profile)
    }

    /// Build every device, then install the bindings.
    ///
    /// A device that cannot be built aborts the load. A binding that cannot
    /// be installed is logged and skipped.
    pub fn load_profile(&mut self, profile: &HardwareProfile) -> Result<LoadReport> {
        for decl in &profile.devices {
            self.create_device(&decl.name, &decl.spec)?;
        }

        let mut report = LoadReport {
            devices: profile.devices.len(),
            ..LoadReport::default()
        };
        for raw in &profile.bindings {
            match self.install_binding(raw) {
                Ok(()) => report.bindings_installed += 1,
                Err(e) => {
                    warn!("Skipping binding {}: {}", raw, e);
                    report.bindings_skipped += 1;
                }
            }
        }

        info!(
            "Hardware profile loaded: {} device(s), {} binding(s), {} skipped",
            report.devices, report.bindings_installed, report.bindings_skipped
        );
        Ok(report)
    }

    fn install_binding(&mut self, raw: &Value) -> Result<()> {
        let binding = BindingSpec::from_value(raw)?;
        let source = self.graph.id(&binding.source).ok_or_else(|| {
            FixtureError::Config(format!("source device '{}' not found", binding.source))
        })?;
        let target = self.graph.id(&binding.target).ok_or_else(|| {
            FixtureError::Config(format!("target device '{}' not found", binding.target))
        })?;
        self.graph.bind(source, target, binding.mode)?;
        debug!(
            "Bound '{}' -> '{}' ({:?})",
            binding.source, binding.target, binding.mode
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixture_hardware::sim::SimPinBank;
    use tempfile::TempDir;

    fn registry(bank: &SimPinBank) -> DeviceRegistry {
        DeviceRegistry::new(Box::new(bank.clone()))
    }

    fn spec(json: &str) -> DeviceSpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_create_device_with_defaults() {
        let bank = SimPinBank::new();
        let mut reg = registry(&bank);

        let led = reg
            .create_device("reset_led", &spec(r#"{"class": "LED", "pin": 2}"#))
            .unwrap();
        let valve = reg
            .create_device("valve", &spec(r#"{"class": "OutputDev", "pin": 3}"#))
            .unwrap();
        let button = reg
            .create_device("start", &spec(r#"{"class": "Button", "pin": 20}"#))
            .unwrap();

        let graph = reg.graph();
        assert_eq!(graph.get(led).output().unwrap().asserted(), Level::Low);
        assert_eq!(graph.get(valve).output().unwrap().asserted(), Level::High);
        match graph.get(button) {
            Device::Button(b) => {
                assert_eq!(b.long_press(), Duration::from_millis(1500));
                assert_eq!(b.input().idle_level(), Level::High);
            }
            _ => panic!("expected a button"),
        }
    }

    #[test]
    fn test_unknown_class_is_an_error() {
        let bank = SimPinBank::new();
        let mut reg = registry(&bank);
        let result = reg.create_device("x", &spec(r#"{"class": "Solenoid", "pin": 1}"#));
        assert!(matches!(
            result,
            Err(FixtureError::UnknownDeviceClass(class)) if class == "Solenoid"
        ));
    }

    #[test]
    fn test_unexpected_parameter_is_an_error() {
        let bank = SimPinBank::new();
        let mut reg = registry(&bank);
        let result = reg.create_device("x", &spec(r#"{"class": "Cylinder", "pin": 1}"#));
        assert!(matches!(result, Err(FixtureError::Config(_))));
    }

    #[test]
    fn test_missing_binding_endpoint_is_skipped() {
        let bank = SimPinBank::new();
        let mut reg = registry(&bank);
        let profile = HardwareProfile::from_json(
            r#"{"device":{"a":{"class":"LED","pin":2}},"bindings":[{"source":"a","target":"missing"}]}"#,
        )
        .unwrap();

        let report = reg.load_profile(&profile).unwrap();
        assert_eq!(
            report,
            LoadReport {
                devices: 1,
                bindings_installed: 0,
                bindings_skipped: 1
            }
        );
        assert!(reg.graph().id("a").is_some());
    }

    #[test]
    fn test_bad_binding_does_not_block_later_ones() {
        let bank = SimPinBank::new();
        let mut reg = registry(&bank);
        let profile = HardwareProfile::from_json(
            r#"{
                "device": {
                    "cyl": {"class": "Cylinder"},
                    "sensor": {"class": "Sensor", "pin": 10},
                    "valve": {"class": "OutputDev", "pin": 3}
                },
                "bindings": [
                    {"source": "ghost", "target": "valve"},
                    {"source": "cyl", "target": "sensor"},
                    {"target": "valve"},
                    {"source": "cyl", "target": "late"},
                    {"source": "cyl", "target": "valve"},
                    {"source": "sensor", "target": "valve", "mode": "IRQ_FALLING"}
                ]
            }"#,
        )
        .unwrap();

        let report = reg.load_profile(&profile).unwrap();
        assert_eq!(report.bindings_installed, 2);
        assert_eq!(report.bindings_skipped, 4);

        let mut graph = reg.into_graph();
        let cyl = graph.id("cyl").unwrap();
        graph.on(cyl).unwrap();
        assert_eq!(bank.level(3), Some(Level::High));
    }

    #[test]
    fn test_forward_references_resolve() {
        let bank = SimPinBank::new();
        let mut reg = registry(&bank);
        let profile = HardwareProfile::from_json(
            r#"{
                "device": {
                    "button": {"class": "Button", "pin": 20},
                    "lamp": {"class": "LED", "pin": 2}
                },
                "bindings": [{"source": "button", "target": "lamp"}]
            }"#,
        )
        .unwrap();

        let report = reg.load_profile(&profile).unwrap();
        assert_eq!(report.bindings_installed, 1);

        let mut graph = reg.into_graph();
        bank.set(20, Level::Low);
        assert_eq!(graph.poll_bindings().unwrap(), 1);
        // Active-low LED lit by the press
        assert_eq!(bank.level(2), Some(Level::Low));
    }

    #[tokio::test]
    async fn test_load_config_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hw_profile.json");
        std::fs::write(
            &path,
            r#"{"device":{"start_led":{"class":"LED","pin":2},"start_button":{"class":"Button","pin":20}},
                "bindings":[{"source":"start_button","target":"start_led","mode":"IRQ_RISING_FALLING"}]}"#,
        )
        .unwrap();

        let bank = SimPinBank::new();
        let mut reg = registry(&bank);
        let report = reg.load_config(&path).await.unwrap();
        assert_eq!(report.devices, 2);
        assert_eq!(report.bindings_installed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_profile_is_fatal() {
        let temp = TempDir::new().unwrap();
        let bank = SimPinBank::new();
        let mut reg = registry(&bank);
        assert!(reg
            .load_config(&temp.path().join("missing.json"))
            .await
            .is_err());
    }
}

//! Pneumatic test fixture controller
//!
//! Builds the device graph from a hardware profile, then runs a fixed-period
//! scan loop that propagates input edges, reacts to the reset/start buttons
//! and answers line commands on a serial link. A separate task breathes the
//! status LED.

pub mod breathing;
pub mod controller;
pub mod dispatcher;
pub mod params;
pub mod registry;
pub mod scan;
pub mod sequencer;
pub mod shutdown;

pub use breathing::{BreathingRamp, BreathingTask};
pub use controller::FixtureController;
pub use dispatcher::{Command, CommandTable, Dispatcher, LineBuffer, Outcome, Reply, Response};
pub use params::FixtureParamsStore;
pub use registry::{DeviceFactory, DeviceRegistry, LoadReport};
pub use scan::{ScanLoop, Tick, Trigger};
pub use sequencer::Sequencer;

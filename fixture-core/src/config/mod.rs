//! Configuration types for the fixture controller
//!
//! # Architecture
//!
//! Configuration is split into:
//! - [`DaemonConfig`] - serial, timing and layout settings (TOML), loaded once at startup
//! - [`HardwareProfile`] - device graph and bindings (JSON), loaded once at startup
//! - [`FixtureParams`] - free-form parameters (JSON), mutable via the serial protocol

mod daemon_config;
mod fixture_params;
mod hw_profile;
mod paths;

pub use daemon_config::{
    BreathingConfig, DaemonConfig, FixtureLayout, LedBoardConfig, ScanConfig, SequencerConfig,
    SerialConfig, ShutdownConfig,
};
pub use fixture_params::{FixtureParams, LAST_MODIFIED_KEY};
pub use hw_profile::{BindingSpec, DeviceDecl, DeviceSpec, HardwareProfile};
pub use paths::{default_config_path, default_data_dir};

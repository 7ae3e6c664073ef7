//! Fixture Core Library
//!
//! Shared types, errors and configuration models for the pneumatic fixture
//! controller. Used by both the hardware crate and the daemon.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    default_config_path, default_data_dir, BindingSpec, DaemonConfig, DeviceDecl, DeviceSpec,
    FixtureLayout, FixtureParams, HardwareProfile,
};
pub use error::*;
pub use types::*;

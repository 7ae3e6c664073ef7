//! Hardware profile: declarative device graph and bindings
//!
//! ```json
//! {
//!   "device": {"reset_led": {"class": "LED", "pin": 2}},
//!   "bindings": [{"source": "reset_button", "target": "reset_led", "mode": "IRQ_FALLING"}]
//! }
//! ```
//!
//! Device declaration order is preserved. Bindings are kept as raw JSON so a
//! single malformed entry can be skipped without rejecting the whole profile.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FixtureError, Result};
use crate::types::TriggerMode;

/// Constructor parameters of one device: `class` plus free-form fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Factory class name (`LED`, `Button`, ...)
    pub class: String,
    /// Remaining constructor parameters
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// A named device declaration, in profile order
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDecl {
    pub name: String,
    pub spec: DeviceSpec,
}

/// One binding entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingSpec {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TriggerMode>,
}

impl BindingSpec {
    /// Parse one raw binding entry.
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| FixtureError::Config(format!("Invalid binding {}: {}", value, e)))
    }
}

#[derive(Deserialize)]
struct RawProfile {
    device: Map<String, Value>,
    #[serde(default)]
    bindings: Vec<Value>,
}

/// Parsed hardware profile
#[derive(Debug, Clone, Default)]
pub struct HardwareProfile {
    /// Devices in declaration order
    pub devices: Vec<DeviceDecl>,
    /// Raw binding entries in declaration order
    pub bindings: Vec<Value>,
}

impl HardwareProfile {
    /// Parse a profile from JSON.
    ///
    /// Fails if the document is not valid JSON, lacks the `device` map, or a
    /// device entry has no `class`.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawProfile = serde_json::from_str(content)
            .map_err(|e| FixtureError::Config(format!("Failed to parse hardware profile: {}", e)))?;

        let devices = raw
            .device
            .into_iter()
            .map(|(name, value)| {
                let spec: DeviceSpec = serde_json::from_value(value).map_err(|e| {
                    FixtureError::Config(format!("Invalid spec for device '{}': {}", name, e))
                })?;
                Ok(DeviceDecl { name, spec })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            devices,
            bindings: raw.bindings,
        })
    }
}

//! Daemon configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts. Every section
//! falls back to its defaults, so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::paths::default_data_dir;

/// Serial command channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Log every received and transmitted chunk
    pub debug_uart: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            debug_uart: false,
        }
    }
}

/// Main scan loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Tick period in milliseconds
    pub period_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { period_ms: 10 }
    }
}

/// Sequencer timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Interval between interlock sensor samples
    pub poll_interval_ms: u64,
    /// Upper bound for a single actuation to reach its target pattern
    pub actuation_timeout_ms: u64,
    /// Pause between uninsert release and the next move
    pub settle_ms: u64,
    /// Dwell between steps of the endurance loops
    pub loop_dwell_ms: u64,
    /// Upper bound for the type-C sensors to follow the uninsert outputs
    pub ctl_out_timeout_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            actuation_timeout_ms: 5000,
            settle_ms: 500,
            loop_dwell_ms: 1000,
            ctl_out_timeout_ms: 2000,
        }
    }
}

/// Breathing LED settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathingConfig {
    pub enabled: bool,
    /// Timer period in milliseconds
    pub period_ms: u64,
    /// Duty increment per firing
    pub step: u16,
    pub min_duty: u16,
    pub max_duty: u16,
    pub initial_duty: u16,
    /// PWM channel driving the indicator
    pub pwm_channel: u32,
    pub frequency_hz: u32,
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: 10,
            step: 400,
            min_duty: 0,
            max_duty: u16::MAX,
            initial_duty: 32768,
            pwm_channel: 29,
            frequency_hz: 1000,
        }
    }
}

/// Names of the devices the sequencer and scan loop operate on.
///
/// The defaults match the device names used by the shipped hardware profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureLayout {
    pub in_out_cylinder: String,
    pub up_down_cylinder: String,
    pub in_sensor: String,
    pub out_sensor: String,
    pub up_sensor: String,
    pub down_sensor: String,
    /// Outputs released by `fixture_uninsert`
    pub uninsert_outputs: Vec<String>,
    /// Sensors confirming the uninsert outputs (`ctl_out`)
    pub typec_sensors: Vec<String>,
    pub reset_button: String,
    pub start_button: String,
}

impl Default for FixtureLayout {
    fn default() -> Self {
        Self {
            in_out_cylinder: "in_out_cylder".to_string(),
            up_down_cylinder: "up_down_cylder".to_string(),
            in_sensor: "in_sensor".to_string(),
            out_sensor: "out_sensor".to_string(),
            up_sensor: "up_sensor".to_string(),
            down_sensor: "down_sensor".to_string(),
            uninsert_outputs: vec!["ctl_out1".to_string(), "ctl_out2".to_string()],
            typec_sensors: vec!["typec_sensor1".to_string(), "typec_sensor2".to_string()],
            reset_button: "reset_button".to_string(),
            start_button: "start_button".to_string(),
        }
    }
}

/// LED status board settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedBoardConfig {
    pub enabled: bool,
    /// I2C bus device the port expander sits on
    pub bus: String,
    /// I2C address of the port expander
    pub address: u8,
}

impl Default for LedBoardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bus: "/dev/i2c-1".to_string(),
            address: 0x20,
        }
    }
}

/// Shutdown behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Drive every output device to its stop level on exit
    pub stop_outputs: bool,
}

/// Static configuration for the fixture daemon.
///
/// Located at `~/.config/fixtured/config.toml` by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Device/binding profile (JSON). Defaults to `{data_dir}/hw_profile.json`.
    pub hw_profile: Option<PathBuf>,

    /// Fixture parameter file (JSON). Defaults to `{data_dir}/fixture_config.json`.
    pub fixture_params: Option<PathBuf>,

    /// Directory for the profile and parameter files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    pub serial: SerialConfig,
    pub scan: ScanConfig,
    pub sequencer: SequencerConfig,
    pub breathing: BreathingConfig,
    pub layout: FixtureLayout,
    pub led_board: LedBoardConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            hw_profile: None,
            fixture_params: None,
            data_dir: default_data_dir(),
            serial: SerialConfig::default(),
            scan: ScanConfig::default(),
            sequencer: SequencerConfig::default(),
            breathing: BreathingConfig::default(),
            layout: FixtureLayout::default(),
            led_board: LedBoardConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Create a config with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Resolved path of the hardware profile
    pub fn hw_profile_path(&self) -> PathBuf {
        self.hw_profile
            .clone()
            .unwrap_or_else(|| self.data_dir.join("hw_profile.json"))
    }

    /// Resolved path of the fixture parameter file
    pub fn fixture_params_path(&self) -> PathBuf {
        self.fixture_params
            .clone()
            .unwrap_or_else(|| self.data_dir.join("fixture_config.json"))
    }

    /// Parse from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

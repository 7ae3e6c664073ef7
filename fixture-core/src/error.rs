//! Error types for the fixture controller

use thiserror::Error;

/// Core error type for fixture operations
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device class not present in the factory table
    #[error("Unknown device class: {0}")]
    UnknownDeviceClass(String),

    /// Device name not present in the registry
    #[error("Device '{0}' not found")]
    DeviceNotFound(String),

    /// Device exists but lacks the capability an operation needs
    #[error("Device '{device}' does not support {capability}")]
    UnsupportedCapability {
        device: String,
        capability: &'static str,
    },

    /// Invalid input or arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Pin, PWM or port expander errors
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// LED status board is disabled or has no port expander
    #[error("LED board not available")]
    LedBoardUnavailable,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for fixture operations
pub type Result<T> = std::result::Result<T, FixtureError>;

impl From<serde_json::Error> for FixtureError {
    fn from(err: serde_json::Error) -> Self {
        FixtureError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: FixtureError = json_err.into();

        match err {
            FixtureError::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FixtureError = io_err.into();

        match err {
            FixtureError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = FixtureError::DeviceNotFound("in_out_cylder".to_string());
        assert_eq!(err.to_string(), "Device 'in_out_cylder' not found");

        let err = FixtureError::UnknownDeviceClass("Valve".to_string());
        assert_eq!(err.to_string(), "Unknown device class: Valve");

        let err = FixtureError::UnsupportedCapability {
            device: "up_sensor".to_string(),
            capability: "on/off",
        };
        assert_eq!(err.to_string(), "Device 'up_sensor' does not support on/off");

        let err = FixtureError::LedBoardUnavailable;
        assert_eq!(err.to_string(), "LED board not available");
    }
}

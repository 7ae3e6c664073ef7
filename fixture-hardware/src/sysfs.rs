//! Linux backend: sysfs GPIO pins, a sysfs PWM channel and the I2C bus
//! the LED board expander sits on
//!
//! Pull resistors cannot be configured through sysfs; inputs rely on the
//! board's external pulls and only record the requested direction.

use std::fs;
use std::path::{Path, PathBuf};

use embedded_hal::digital::{self, InputPin, OutputPin, StatefulOutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use fixture_core::{FixtureError, Level, Result};
use linux_embedded_hal::I2cdev;
use tracing::debug;

use crate::expander::Cat9555;
use crate::pins::{BoxedInputPin, BoxedOutputPin, PinError, PinProvider};

const GPIO_ROOT: &str = "/sys/class/gpio";
const PWM_ROOT: &str = "/sys/class/pwm";

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value)
        .map_err(|e| FixtureError::Hardware(format!("Failed to write {}: {}", path.display(), e)))
}

fn read_attr(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| FixtureError::Hardware(format!("Failed to read {}: {}", path.display(), e)))
}

fn read_level(path: &Path) -> Result<Level> {
    match read_attr(path)?.as_str() {
        "0" => Ok(Level::Low),
        "1" => Ok(Level::High),
        other => Err(FixtureError::Hardware(format!(
            "Unexpected value '{}' in {}",
            other,
            path.display()
        ))),
    }
}

/// GPIO pins under `/sys/class/gpio`
pub struct SysfsGpio {
    root: PathBuf,
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(GPIO_ROOT)
    }
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Export `pin` if needed and return its directory
    fn export(&self, pin: u32) -> Result<PathBuf> {
        let dir = self.root.join(format!("gpio{}", pin));
        if !dir.exists() {
            debug!("Exporting GPIO {}", pin);
            write_attr(&self.root.join("export"), &pin.to_string())?;
        }
        Ok(dir)
    }
}

impl PinProvider for SysfsGpio {
    fn output_pin(&self, pin: u32) -> Result<BoxedOutputPin> {
        let dir = self.export(pin)?;
        // "low" selects output and drives it low in one write
        write_attr(&dir.join("direction"), "low")?;
        Ok(Box::new(SysfsPin {
            value: dir.join("value"),
        }))
    }

    fn input_pin(&self, pin: u32, pull_up: bool) -> Result<BoxedInputPin> {
        let dir = self.export(pin)?;
        write_attr(&dir.join("direction"), "in")?;
        debug!(
            "GPIO {} configured as input (external pull-{} expected)",
            pin,
            if pull_up { "up" } else { "down" }
        );
        Ok(Box::new(SysfsPin {
            value: dir.join("value"),
        }))
    }
}

/// One exported GPIO's `value` attribute
pub struct SysfsPin {
    value: PathBuf,
}

impl SysfsPin {
    fn write(&self, level: Level) -> std::result::Result<(), PinError> {
        Ok(write_attr(&self.value, &level.to_string())?)
    }

    fn read(&self) -> std::result::Result<Level, PinError> {
        Ok(read_level(&self.value)?)
    }
}

impl digital::ErrorType for SysfsPin {
    type Error = PinError;
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> std::result::Result<(), PinError> {
        self.write(Level::Low)
    }

    fn set_high(&mut self) -> std::result::Result<(), PinError> {
        self.write(Level::High)
    }
}

impl StatefulOutputPin for SysfsPin {
    fn is_set_high(&mut self) -> std::result::Result<bool, PinError> {
        Ok(self.read()? == Level::High)
    }

    fn is_set_low(&mut self) -> std::result::Result<bool, PinError> {
        Ok(self.read()? == Level::Low)
    }
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> std::result::Result<bool, PinError> {
        Ok(self.read()? == Level::High)
    }

    fn is_low(&mut self) -> std::result::Result<bool, PinError> {
        Ok(self.read()? == Level::Low)
    }
}

/// PWM channel under `/sys/class/pwm/pwmchipN/pwmM`
pub struct SysfsPwm {
    dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    /// Export and enable `channel` of `pwmchip{chip}` at `frequency_hz`.
    pub fn open(chip: u32, channel: u32, frequency_hz: u32) -> Result<Self> {
        Self::open_at(Path::new(PWM_ROOT), chip, channel, frequency_hz)
    }

    pub fn open_at(root: &Path, chip: u32, channel: u32, frequency_hz: u32) -> Result<Self> {
        if frequency_hz == 0 {
            return Err(FixtureError::InvalidArgument(
                "PWM frequency must be non-zero".to_string(),
            ));
        }

        let chip_dir = root.join(format!("pwmchip{}", chip));
        let dir = chip_dir.join(format!("pwm{}", channel));
        if !dir.exists() {
            debug!("Exporting PWM channel {} of chip {}", channel, chip);
            write_attr(&chip_dir.join("export"), &channel.to_string())?;
        }

        let period_ns = 1_000_000_000 / u64::from(frequency_hz);
        write_attr(&dir.join("period"), &period_ns.to_string())?;
        write_attr(&dir.join("duty_cycle"), "0")?;
        write_attr(&dir.join("enable"), "1")?;

        Ok(Self { dir, period_ns })
    }
}

impl pwm::ErrorType for SysfsPwm {
    type Error = PinError;
}

impl SetDutyCycle for SysfsPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> std::result::Result<(), PinError> {
        let duty_ns = self.period_ns * u64::from(duty) / u64::from(u16::MAX);
        Ok(write_attr(&self.dir.join("duty_cycle"), &duty_ns.to_string())?)
    }
}

/// Open the expander at `address` on an I2C character device
/// such as `/dev/i2c-1`.
pub fn open_expander(bus: &str, address: u8) -> Result<Cat9555<I2cdev>> {
    let i2c = I2cdev::new(bus)
        .map_err(|e| FixtureError::Hardware(format!("Failed to open {}: {}", bus, e)))?;
    debug!("Opened I2C bus {}", bus);
    Cat9555::new(i2c, address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_gpio(root: &Path, pin: u32, value: &str) {
        let dir = root.join(format!("gpio{}", pin));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("value"), value).unwrap();
        fs::write(dir.join("direction"), "in").unwrap();
    }

    #[test]
    fn test_output_pin_writes_direction_and_value() {
        let temp = TempDir::new().unwrap();
        fake_gpio(temp.path(), 17, "0");

        let gpio = SysfsGpio::new(temp.path());
        let mut pin = gpio.output_pin(17).unwrap();
        assert_eq!(
            fs::read_to_string(temp.path().join("gpio17/direction")).unwrap(),
            "low"
        );

        pin.set_high().unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("gpio17/value")).unwrap(), "1");
        assert!(pin.is_set_high().unwrap());
    }

    #[test]
    fn test_input_pin_reads_value() {
        let temp = TempDir::new().unwrap();
        fake_gpio(temp.path(), 5, "1\n");

        let gpio = SysfsGpio::new(temp.path());
        let mut pin = gpio.input_pin(5, true).unwrap();
        assert!(pin.is_high().unwrap());

        fs::write(temp.path().join("gpio5/value"), "0\n").unwrap();
        assert!(pin.is_low().unwrap());

        fs::write(temp.path().join("gpio5/value"), "x\n").unwrap();
        let err = FixtureError::from(pin.is_high().unwrap_err());
        assert!(matches!(err, FixtureError::Hardware(_)));
    }

    #[test]
    fn test_unexported_pin_is_exported() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("export"), "").unwrap();

        let gpio = SysfsGpio::new(temp.path());
        // The fake tree has no kernel behind it, so the pin directory never appears.
        assert!(gpio.output_pin(22).is_err());
        assert_eq!(fs::read_to_string(temp.path().join("export")).unwrap(), "22");
    }

    #[test]
    fn test_pwm_duty_scaling() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pwmchip0/pwm1");
        fs::create_dir_all(&dir).unwrap();

        let mut pwm = SysfsPwm::open_at(temp.path(), 0, 1, 1000).unwrap();
        assert_eq!(fs::read_to_string(dir.join("period")).unwrap(), "1000000");
        assert_eq!(fs::read_to_string(dir.join("enable")).unwrap(), "1");

        pwm.set_duty_cycle_fully_on().unwrap();
        assert_eq!(fs::read_to_string(dir.join("duty_cycle")).unwrap(), "1000000");

        pwm.set_duty_cycle_percent(25).unwrap();
        assert_eq!(fs::read_to_string(dir.join("duty_cycle")).unwrap(), "249988");

        pwm.set_duty_cycle(0).unwrap();
        assert_eq!(fs::read_to_string(dir.join("duty_cycle")).unwrap(), "0");
    }

    #[test]
    fn test_pwm_rejects_zero_frequency() {
        let temp = TempDir::new().unwrap();
        assert!(SysfsPwm::open_at(temp.path(), 0, 0, 0).is_err());
    }

    #[test]
    fn test_missing_i2c_bus_is_a_hardware_error() {
        let temp = TempDir::new().unwrap();
        let bus = temp.path().join("i2c-9");
        match open_expander(&bus.to_string_lossy(), 0x20) {
            Err(FixtureError::Hardware(msg)) => assert!(msg.contains("i2c-9")),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("opened a bus that does not exist"),
        }
    }
}

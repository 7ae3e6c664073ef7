//! CAT9555 16-bit I2C port expander
//!
//! Register pairs (port 0 then port 1) are read and written in a single
//! transfer; the chip advances its register pointer within the pair.

use embedded_hal::i2c::{Error, I2c};
use fixture_core::{FixtureError, Result};
use tracing::trace;

use crate::pins::PortExpander;

/// Address with all three strap pins low
pub const DEFAULT_ADDRESS: u8 = 0x20;

/// Register map, port 0 of each pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    Input = 0x00,
    Output = 0x02,
    Inversion = 0x04,
    Config = 0x06,
}

impl Register {
    /// Register a pointer value falls in, with the port it addresses
    pub fn decode(pointer: u8) -> Option<(Self, usize)> {
        let register = match pointer & !0x01 {
            0x00 => Register::Input,
            0x02 => Register::Output,
            0x04 => Register::Inversion,
            0x06 => Register::Config,
            _ => return None,
        };
        Some((register, usize::from(pointer & 0x01)))
    }
}

/// Driver for one CAT9555 on an I2C bus
pub struct Cat9555<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Cat9555<I> {
    /// The three address pins select 0x20..=0x27.
    pub fn new(i2c: I, address: u8) -> Result<Self> {
        if address & !0x07 != DEFAULT_ADDRESS {
            return Err(FixtureError::InvalidArgument(format!(
                "CAT9555 address 0x{:02x} outside 0x20..=0x27",
                address
            )));
        }
        Ok(Self { i2c, address })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I {
        self.i2c
    }

    pub fn write_pair(&mut self, register: Register, ports: [u8; 2]) -> Result<()> {
        trace!("CAT9555 0x{:02x} {:?} <- {:02x?}", self.address, register, ports);
        let address = self.address;
        self.i2c
            .write(address, &[register as u8, ports[0], ports[1]])
            .map_err(|e| bus_error(address, e))
    }

    pub fn read_pair(&mut self, register: Register) -> Result<[u8; 2]> {
        let address = self.address;
        let mut ports = [0u8; 2];
        self.i2c
            .write_read(address, &[register as u8], &mut ports)
            .map_err(|e| bus_error(address, e))?;
        Ok(ports)
    }
}

fn bus_error(address: u8, err: impl Error) -> FixtureError {
    FixtureError::Hardware(format!("CAT9555 at 0x{:02x}: {:?}", address, err.kind()))
}

impl<I: I2c + Send> PortExpander for Cat9555<I> {
    fn write_ports(&mut self, ports: [u8; 2]) -> Result<()> {
        self.write_pair(Register::Output, ports)
    }

    fn read_ports(&mut self) -> Result<[u8; 2]> {
        self.read_pair(Register::Input)
    }

    fn set_port_directions(&mut self, directions: [u8; 2]) -> Result<()> {
        self.write_pair(Register::Config, directions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimExpander;

    #[test]
    fn test_address_must_be_in_strap_range() {
        assert!(Cat9555::new(SimExpander::new(), 0x20).is_ok());
        assert!(Cat9555::new(SimExpander::new(), 0x27).is_ok());
        assert!(Cat9555::new(SimExpander::new(), 0x28).is_err());
        assert!(Cat9555::new(SimExpander::new(), 0x10).is_err());
    }

    #[test]
    fn test_register_pairs_over_i2c() {
        let chip = SimExpander::new();
        let mut expander = Cat9555::new(chip.clone(), 0x20).unwrap();

        expander.set_port_directions([0x00, 0xf0]).unwrap();
        expander.write_ports([0x12, 0x34]).unwrap();
        assert_eq!(chip.directions(), [0x00, 0xf0]);
        assert_eq!(chip.output_ports(), [0x12, 0x34]);
        assert_eq!(expander.read_pair(Register::Output).unwrap(), [0x12, 0x34]);

        chip.set_input_ports([0xaa, 0x55]);
        assert_eq!(expander.read_ports().unwrap(), [0xaa, 0x55]);
    }

    #[test]
    fn test_wrong_address_is_not_acknowledged() {
        let chip = SimExpander::new();
        let mut expander = Cat9555::new(chip.clone(), 0x21).unwrap();

        let err = expander.write_ports([0x01, 0x00]).unwrap_err();
        assert!(err.to_string().contains("0x21"), "got {}", err);
        assert_eq!(chip.writes(), 0);
    }

    #[test]
    fn test_register_decode() {
        assert_eq!(Register::decode(0x03), Some((Register::Output, 1)));
        assert_eq!(Register::decode(0x06), Some((Register::Config, 0)));
        assert_eq!(Register::decode(0x08), None);
    }
}

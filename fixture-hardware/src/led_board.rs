//! Four-slot RGB status board behind a port expander
//!
//! Each slot owns a 3-bit field of a packed register (r = bit 0, g = bit 1,
//! b = bit 2). The low 16 bits are written little-endian to the expander's
//! two output ports. On the real board the expander is a
//! [`crate::expander::Cat9555`] on I2C.

use std::fmt;
use std::str::FromStr;

use fixture_core::{FixtureError, Result};
use tracing::debug;

use crate::pins::PortExpander;

/// Bits per slot
const SLOT_WIDTH: u32 = 3;

/// A named bit range inside a register value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    pub offset: u32,
    pub width: u32,
}

impl BitRange {
    pub const fn new(offset: u32, width: u32) -> Self {
        Self { offset, width }
    }

    const fn mask(self) -> u32 {
        ((1u32 << self.width) - 1) << self.offset
    }

    pub fn get(self, value: u32) -> u32 {
        (value & self.mask()) >> self.offset
    }

    /// Replace the range in `value`; bits of `field` beyond the width are dropped
    pub fn set(self, value: u32, field: u32) -> u32 {
        (value & !self.mask()) | ((field << self.offset) & self.mask())
    }
}

/// Packed slot register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IomuxRegister {
    value: u32,
}

impl IomuxRegister {
    pub const SLOTS: usize = 4;
    pub const LED0: BitRange = BitRange::new(0, SLOT_WIDTH);
    pub const LED1: BitRange = BitRange::new(3, SLOT_WIDTH);
    pub const LED2: BitRange = BitRange::new(6, SLOT_WIDTH);
    pub const LED3: BitRange = BitRange::new(9, SLOT_WIDTH);

    const RANGES: [BitRange; Self::SLOTS] = [Self::LED0, Self::LED1, Self::LED2, Self::LED3];

    pub fn value(&self) -> u32 {
        self.value
    }

    fn range(slot: usize) -> Result<BitRange> {
        Self::RANGES.get(slot).copied().ok_or_else(|| {
            FixtureError::InvalidArgument(format!(
                "LED slot {} out of range 0..{}",
                slot,
                Self::SLOTS
            ))
        })
    }

    pub fn slot(&self, slot: usize) -> Result<LedColor> {
        let bits = Self::range(slot)?.get(self.value);
        LedColor::from_bits(bits)
            .ok_or_else(|| FixtureError::Other(format!("Slot {} holds mixed color {:#05b}", slot, bits)))
    }

    pub fn set_slot(&mut self, slot: usize, color: LedColor) -> Result<()> {
        self.value = Self::range(slot)?.set(self.value, color.bits());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.value = 0;
    }

    /// Low 16 bits as two port bytes, low byte first
    pub fn port_bytes(&self) -> [u8; 2] {
        let [lo, hi, _, _] = self.value.to_le_bytes();
        [lo, hi]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Off,
    Red,
    Green,
    Blue,
}

impl LedColor {
    pub fn bits(self) -> u32 {
        match self {
            LedColor::Off => 0b000,
            LedColor::Red => 0b001,
            LedColor::Green => 0b010,
            LedColor::Blue => 0b100,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0b000 => Some(LedColor::Off),
            0b001 => Some(LedColor::Red),
            0b010 => Some(LedColor::Green),
            0b100 => Some(LedColor::Blue),
            _ => None,
        }
    }
}

impl FromStr for LedColor {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(LedColor::Red),
            "g" => Ok(LedColor::Green),
            "b" => Ok(LedColor::Blue),
            "off" => Ok(LedColor::Off),
            other => Err(FixtureError::InvalidArgument(format!(
                "Unknown LED color '{}', expected r, g, b or off",
                other
            ))),
        }
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedColor::Off => "off",
            LedColor::Red => "r",
            LedColor::Green => "g",
            LedColor::Blue => "b",
        };
        f.write_str(name)
    }
}

/// Status board driver
pub struct LedBoard {
    expander: Box<dyn PortExpander>,
    register: IomuxRegister,
}

impl LedBoard {
    /// Clear all slots and configure every expander pin as an output.
    pub fn init(expander: Box<dyn PortExpander>) -> Result<Self> {
        let mut board = Self {
            expander,
            register: IomuxRegister::default(),
        };
        board.write()?;
        board.expander.set_port_directions([0x00, 0x00])?;
        debug!("LED board initialized");
        Ok(board)
    }

    pub fn register(&self) -> IomuxRegister {
        self.register
    }

    pub fn set_state(&mut self, slot: usize, color: LedColor) -> Result<()> {
        self.register.set_slot(slot, color)?;
        debug!("LED slot {} -> {}", slot, color);
        self.write()
    }

    /// Turn every slot off
    pub fn reset(&mut self) -> Result<()> {
        self.register.clear();
        self.write()
    }

    fn write(&mut self) -> Result<()> {
        self.expander.write_ports(self.register.port_bytes())
    }
}

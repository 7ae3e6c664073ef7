//! Simulated backend
//!
//! Used for `--mock` runs and tests. Every handle is cheaply cloneable and
//! shares state with its clones, so a test can keep one clone to drive
//! sensor levels while the device graph owns the pins.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use embedded_hal::digital::{self, InputPin, OutputPin, StatefulOutputPin};
use embedded_hal::i2c::{self, I2c, NoAcknowledgeSource, Operation};
use embedded_hal::pwm::{self, SetDutyCycle};
use fixture_core::{Level, Result};

use crate::expander::{Register, DEFAULT_ADDRESS};
use crate::pins::{BoxedInputPin, BoxedOutputPin, PinError, PinProvider};
use crate::serial_driver::SerialLink;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared bank of simulated pin levels
#[derive(Clone, Default)]
pub struct SimPinBank {
    levels: Arc<Mutex<HashMap<u32, Level>>>,
}

impl SimPinBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a pin level, as external wiring would
    pub fn set(&self, pin: u32, level: Level) {
        lock(&self.levels).insert(pin, level);
    }

    /// Current level of a pin, `None` if it was never claimed or set
    pub fn level(&self, pin: u32) -> Option<Level> {
        lock(&self.levels).get(&pin).copied()
    }

    fn pin(&self, pin: u32) -> SimPin {
        SimPin {
            bank: self.clone(),
            pin,
        }
    }
}

impl PinProvider for SimPinBank {
    fn output_pin(&self, pin: u32) -> Result<BoxedOutputPin> {
        lock(&self.levels).insert(pin, Level::Low);
        Ok(Box::new(self.pin(pin)))
    }

    fn input_pin(&self, pin: u32, pull_up: bool) -> Result<BoxedInputPin> {
        lock(&self.levels)
            .entry(pin)
            .or_insert(Level::from(pull_up));
        Ok(Box::new(self.pin(pin)))
    }
}

/// A pin inside a [`SimPinBank`]
pub struct SimPin {
    bank: SimPinBank,
    pin: u32,
}

impl SimPin {
    fn is_high_now(&self) -> bool {
        self.bank.level(self.pin) == Some(Level::High)
    }
}

impl digital::ErrorType for SimPin {
    type Error = PinError;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> std::result::Result<(), PinError> {
        self.bank.set(self.pin, Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> std::result::Result<(), PinError> {
        self.bank.set(self.pin, Level::High);
        Ok(())
    }
}

impl StatefulOutputPin for SimPin {
    fn is_set_high(&mut self) -> std::result::Result<bool, PinError> {
        Ok(self.is_high_now())
    }

    fn is_set_low(&mut self) -> std::result::Result<bool, PinError> {
        Ok(!self.is_high_now())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> std::result::Result<bool, PinError> {
        Ok(self.is_high_now())
    }

    fn is_low(&mut self) -> std::result::Result<bool, PinError> {
        Ok(!self.is_high_now())
    }
}

/// Simulated PWM channel recording the last duty written
#[derive(Clone, Default)]
pub struct SimPwm {
    duty: Arc<AtomicU16>,
    writes: Arc<AtomicU64>,
}

impl SimPwm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duty(&self) -> u16 {
        self.duty.load(Ordering::Relaxed)
    }

    /// Number of duty writes so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl pwm::ErrorType for SimPwm {
    type Error = PinError;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> std::result::Result<(), PinError> {
        self.duty.store(duty, Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct ExpanderChip {
    address: u8,
    pointer: u8,
    inputs: [u8; 2],
    /// Output, inversion and config pairs
    registers: [[u8; 2]; 3],
    output_writes: usize,
}

impl Default for ExpanderChip {
    fn default() -> Self {
        // Power-on state: outputs high, every pin an input
        Self {
            address: DEFAULT_ADDRESS,
            pointer: 0,
            inputs: [0; 2],
            registers: [[0xff; 2], [0x00; 2], [0xff; 2]],
            output_writes: 0,
        }
    }
}

impl ExpanderChip {
    fn slot(register: Register) -> Option<usize> {
        match register {
            Register::Input => None,
            Register::Output => Some(0),
            Register::Inversion => Some(1),
            Register::Config => Some(2),
        }
    }

    fn store(&mut self, byte: u8) -> std::result::Result<(), i2c::ErrorKind> {
        let (register, port) = Register::decode(self.pointer)
            .ok_or(i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data))?;
        // Input registers are read-only; the chip ignores the byte
        if let Some(slot) = Self::slot(register) {
            self.registers[slot][port] = byte;
        }
        self.pointer ^= 0x01;
        Ok(())
    }

    fn load(&mut self) -> std::result::Result<u8, i2c::ErrorKind> {
        let (register, port) = Register::decode(self.pointer)
            .ok_or(i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data))?;
        let byte = match Self::slot(register) {
            Some(slot) => self.registers[slot][port],
            None => self.inputs[port],
        };
        self.pointer ^= 0x01;
        Ok(byte)
    }
}

/// Simulated CAT9555 answering on an I2C bus
///
/// Wrap a clone in [`crate::expander::Cat9555`] to get a [`crate::pins::PortExpander`]; keep
/// another to inspect the register file.
#[derive(Clone, Default)]
pub struct SimExpander {
    chip: Arc<Mutex<ExpanderChip>>,
}

impl SimExpander {
    /// A chip strapped to the default address
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: u8) -> Self {
        let expander = Self::default();
        lock(&expander.chip).address = address;
        expander
    }

    /// Output port registers
    pub fn output_ports(&self) -> [u8; 2] {
        lock(&self.chip).registers[0]
    }

    /// Configuration registers; a 0 bit is an output
    pub fn directions(&self) -> [u8; 2] {
        lock(&self.chip).registers[2]
    }

    /// Number of transfers that wrote the output registers
    pub fn writes(&self) -> usize {
        lock(&self.chip).output_writes
    }

    /// Set what the input ports read back
    pub fn set_input_ports(&self, ports: [u8; 2]) {
        lock(&self.chip).inputs = ports;
    }
}

impl i2c::ErrorType for SimExpander {
    type Error = i2c::ErrorKind;
}

impl I2c for SimExpander {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> std::result::Result<(), Self::Error> {
        let mut chip = lock(&self.chip);
        if address != chip.address {
            return Err(i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    let Some((&pointer, data)) = bytes.split_first() else {
                        continue;
                    };
                    chip.pointer = pointer;
                    if !data.is_empty()
                        && matches!(Register::decode(pointer), Some((Register::Output, _)))
                    {
                        chip.output_writes += 1;
                    }
                    for &byte in data {
                        chip.store(byte)?;
                    }
                }
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = chip.load()?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct LinkState {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
}

/// In-memory command link; the test side pushes host bytes and inspects
/// everything the controller wrote back
#[derive(Clone, Default)]
pub struct SimLink {
    state: Arc<Mutex<LinkState>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the host had sent them
    pub fn push_input(&self, bytes: &[u8]) {
        lock(&self.state).incoming.extend(bytes);
    }

    /// Everything written so far, as text
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&lock(&self.state).written).into_owned()
    }

    /// Like [`SimLink::written`], clearing the record
    pub fn take_written(&self) -> String {
        let bytes = std::mem::take(&mut lock(&self.state).written);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[async_trait]
impl SerialLink for SimLink {
    fn read_available(&mut self) -> Result<Vec<u8>> {
        Ok(lock(&self.state).incoming.drain(..).collect())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        lock(&self.state).written.extend_from_slice(data);
        Ok(())
    }

    fn name(&self) -> &str {
        "sim"
    }
}

//! Raspberry Pi backends built on `rppal`.
//!
//! The I2C calls block. [`RpiI2c`] is meant to sit behind a session started
//! with [`crate::si4707::ChipSession::spawn_on_thread`], so the blocking
//! happens on the session's own thread rather than the runtime's workers.

use async_trait::async_trait;
use rppal::gpio::{Gpio, InputPin, IoPin, Level, Mode, Trigger};
use rppal::i2c;

use crate::hw_trait::gpio::EdgeCallback;
use crate::hw_trait::{Edge, GpioPin, HwError, I2cError, InterruptPin, PinMode, PinValue, Result};
use crate::tracing::prelude::*;

pub(crate) fn gpio_error(e: rppal::gpio::Error) -> HwError {
    HwError::Other(format!("GPIO: {}", e))
}

fn i2c_error(addr: u8, e: i2c::Error) -> HwError {
    match e {
        // The kernel reports a missing ACK as ENXIO or EREMOTEIO.
        i2c::Error::Io(io) if matches!(io.raw_os_error(), Some(6) | Some(121)) => {
            HwError::I2c(I2cError::NoAck(addr))
        }
        i2c::Error::Io(io) => HwError::Io(io),
        i2c::Error::InvalidSlaveAddress(a) => {
            HwError::InvalidParameter(format!("I2C address 0x{:02x}", a))
        }
        other => HwError::I2c(I2cError::Other(other.to_string())),
    }
}

/// `/dev/i2c-N` through rppal.
pub struct RpiI2c {
    bus: i2c::I2c,
    selected: Option<u8>,
}

impl RpiI2c {
    pub fn open(bus: u8) -> Result<Self> {
        let bus = i2c::I2c::with_bus(bus).map_err(|e| i2c_error(0, e))?;
        debug!(bus = bus.bus(), clock = ?bus.clock_speed().ok(), "Opened I2C bus");
        Ok(Self {
            bus,
            selected: None,
        })
    }

    fn select(&mut self, addr: u8) -> Result<()> {
        if self.selected != Some(addr) {
            self.bus
                .set_slave_address(u16::from(addr))
                .map_err(|e| i2c_error(addr, e))?;
            self.selected = Some(addr);
        }
        Ok(())
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if actual != expected {
        return Err(HwError::I2c(I2cError::ShortTransfer { expected, actual }));
    }
    Ok(())
}

#[async_trait]
impl crate::hw_trait::I2c for RpiI2c {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        self.select(addr)?;
        let written = self.bus.write(data).map_err(|e| i2c_error(addr, e))?;
        check_len(data.len(), written)
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        self.select(addr)?;
        let read = self.bus.read(buffer).map_err(|e| i2c_error(addr, e))?;
        check_len(buffer.len(), read)
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.select(addr)?;
        self.bus
            .write_read(write, read)
            .map_err(|e| i2c_error(addr, e))
    }
}

/// A GPIO line that can switch between input and output.
pub struct RpiPin {
    number: u8,
    pin: IoPin,
}

impl RpiPin {
    /// Claim `number` as an output, driven low.
    pub fn output(gpio: &Gpio, number: u8) -> Result<Self> {
        let mut pin = gpio.get(number).map_err(gpio_error)?.into_io(Mode::Output);
        pin.set_low();
        Ok(Self { number, pin })
    }

    pub fn number(&self) -> u8 {
        self.number
    }
}

#[async_trait]
impl GpioPin for RpiPin {
    async fn set_mode(&mut self, mode: PinMode) -> Result<()> {
        self.pin.set_mode(match mode {
            PinMode::Input => Mode::Input,
            PinMode::Output => Mode::Output,
        });
        Ok(())
    }

    async fn write(&mut self, value: PinValue) -> Result<()> {
        if self.pin.mode() != Mode::Output {
            return Err(HwError::InvalidParameter(format!(
                "GPIO{} is not an output",
                self.number
            )));
        }
        self.pin.write(match value {
            PinValue::Low => Level::Low,
            PinValue::High => Level::High,
        });
        Ok(())
    }

    async fn read(&mut self) -> Result<PinValue> {
        Ok(PinValue::from(self.pin.read() == Level::High))
    }
}

/// The chip's interrupt output, pulled up; the chip drives it low.
pub struct RpiInterruptPin {
    pin: InputPin,
}

impl RpiInterruptPin {
    pub fn new(gpio: &Gpio, number: u8) -> Result<Self> {
        let pin = gpio.get(number).map_err(gpio_error)?.into_input_pullup();
        Ok(Self { pin })
    }
}

impl InterruptPin for RpiInterruptPin {
    fn on_edge(&mut self, edge: Edge, mut callback: EdgeCallback) -> Result<()> {
        let trigger = match edge {
            Edge::Rising => Trigger::RisingEdge,
            Edge::Falling => Trigger::FallingEdge,
            Edge::Both => Trigger::Both,
        };
        self.pin
            .set_async_interrupt(trigger, move |_level: Level| callback())
            .map_err(gpio_error)
    }

    fn clear(&mut self) -> Result<()> {
        self.pin.clear_async_interrupt().map_err(gpio_error)
    }
}

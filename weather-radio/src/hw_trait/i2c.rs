//! I2C hardware abstraction traits.
//!
//! [`I2c`] is the raw bus: plain writes, reads and repeated-start
//! write-reads. [`Smbus`] is the register-addressed view the receiver
//! driver talks through (single bytes, 16-bit words and blocks, each
//! addressed by a register/command byte). [`SmbusDevice`] binds a raw bus to
//! one device address and provides the register view on top of it.

use async_trait::async_trait;
use super::Result;

/// I2C-specific errors
#[derive(Debug, thiserror::Error)]
pub enum I2cError {
    /// No acknowledgment from device
    #[error("No acknowledgment from device at address 0x{0:02x}")]
    NoAck(u8),

    /// Bus arbitration lost
    #[error("Bus arbitration lost")]
    ArbitrationLost,

    /// Bus error
    #[error("Bus error")]
    BusError,

    /// Fewer bytes transferred than requested
    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// Other I2C error
    #[error("I2C error: {0}")]
    Other(String),
}

/// Byte order of a 16-bit register word on the wire.
///
/// SMBus words are little-endian; some devices expect the swapped form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    fn to_wire(self, word: u16) -> [u8; 2] {
        match self {
            Endian::Little => word.to_le_bytes(),
            Endian::Big => word.to_be_bytes(),
        }
    }

    fn from_wire(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }
}

/// I2C bus abstraction
#[async_trait]
pub trait I2c: Send {
    /// Write data to an I2C device.
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()>;

    /// Read data from an I2C device.
    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()>;

    /// Write data then read from an I2C device (repeated start).
    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()>;
}

#[async_trait]
impl<T: I2c + ?Sized> I2c for Box<T> {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        (**self).write(addr, data).await
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        (**self).read(addr, buffer).await
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        (**self).write_read(addr, write, read).await
    }
}

/// Register-addressed primitives of a single bus device.
///
/// Values are typed to their wire width (`u8` or `u16`), so nothing wider
/// than the declared register size can reach the bus.
#[async_trait]
pub trait Smbus: Send {
    /// Send a single byte with no register address.
    async fn write_byte(&mut self, value: u8) -> Result<()>;

    /// Receive a single byte with no register address.
    async fn read_byte(&mut self) -> Result<u8>;

    async fn write_register_byte(&mut self, reg: u8, value: u8) -> Result<()>;

    async fn read_register_byte(&mut self, reg: u8) -> Result<u8>;

    async fn write_register_word(&mut self, reg: u8, word: u16, endian: Endian) -> Result<()>;

    async fn read_register_word(&mut self, reg: u8, endian: Endian) -> Result<u16>;

    /// Write `data` as a block following the register byte.
    async fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<()>;

    /// Read `len` bytes starting at `reg`.
    async fn read_block(&mut self, reg: u8, len: usize) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: Smbus + ?Sized> Smbus for Box<T> {
    async fn write_byte(&mut self, value: u8) -> Result<()> {
        (**self).write_byte(value).await
    }

    async fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte().await
    }

    async fn write_register_byte(&mut self, reg: u8, value: u8) -> Result<()> {
        (**self).write_register_byte(reg, value).await
    }

    async fn read_register_byte(&mut self, reg: u8) -> Result<u8> {
        (**self).read_register_byte(reg).await
    }

    async fn write_register_word(&mut self, reg: u8, word: u16, endian: Endian) -> Result<()> {
        (**self).write_register_word(reg, word, endian).await
    }

    async fn read_register_word(&mut self, reg: u8, endian: Endian) -> Result<u16> {
        (**self).read_register_word(reg, endian).await
    }

    async fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<()> {
        (**self).write_block(reg, data).await
    }

    async fn read_block(&mut self, reg: u8, len: usize) -> Result<Vec<u8>> {
        (**self).read_block(reg, len).await
    }
}

/// A raw I2C bus bound to one device address.
pub struct SmbusDevice<I: I2c> {
    i2c: I,
    address: u8,
}

impl<I: I2c> SmbusDevice<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give back the underlying bus.
    pub fn into_inner(self) -> I {
        self.i2c
    }
}

#[async_trait]
impl<I: I2c> Smbus for SmbusDevice<I> {
    async fn write_byte(&mut self, value: u8) -> Result<()> {
        self.i2c.write(self.address, &[value]).await
    }

    async fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c.read(self.address, &mut buf).await?;
        Ok(buf[0])
    }

    async fn write_register_byte(&mut self, reg: u8, value: u8) -> Result<()> {
        self.i2c.write(self.address, &[reg, value]).await
    }

    async fn read_register_byte(&mut self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(self.address, &[reg], &mut buf).await?;
        Ok(buf[0])
    }

    async fn write_register_word(&mut self, reg: u8, word: u16, endian: Endian) -> Result<()> {
        let [b0, b1] = endian.to_wire(word);
        self.i2c.write(self.address, &[reg, b0, b1]).await
    }

    async fn read_register_word(&mut self, reg: u8, endian: Endian) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[reg], &mut buf).await?;
        Ok(endian.from_wire(buf))
    }

    async fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(data);
        self.i2c.write(self.address, &frame).await
    }

    async fn read_block(&mut self, reg: u8, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.i2c.write_read(self.address, &[reg], &mut buf).await?;
        Ok(buf)
    }
}

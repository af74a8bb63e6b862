//! I2C bus abstractions
//!
//! Provides the addressed send/receive primitive the module drivers are
//! built on. Every call targets a 7-bit slave address and may select a
//! sub-register by prefixing its number to the transfer.

use core::fmt;

/// Highest valid 7-bit slave address
pub const MAX_SLAVE_ADDRESS: u8 = 0x7F;

/// Error from a bus transfer
///
/// Opening the device, selecting the slave and the transfer itself all
/// collapse into this one type. Drivers propagate it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Bus device could not be opened
    Open,
    /// Bus error (misplaced start/stop)
    Bus,
    /// Arbitration lost
    ArbitrationLost,
    /// NACK received (no device at the address, or data rejected)
    Nack,
    /// Overrun
    Overrun,
    /// Other error
    Other,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BusError::Open => "i2c device could not be opened",
            BusError::Bus => "i2c bus error",
            BusError::ArbitrationLost => "i2c arbitration lost",
            BusError::Nack => "i2c transfer not acknowledged",
            BusError::Overrun => "i2c overrun",
            BusError::Other => "i2c transfer failed",
        };
        f.write_str(msg)
    }
}

/// I2C bus master
///
/// Blocking, addressed transfers. Implementations must complete or fail
/// each call before returning and must not retry on their own.
pub trait I2cBus {
    /// Write bytes to a device
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `register` - Optional sub-register, sent before `data`
    /// * `data` - Bytes to write
    fn send(&mut self, address: u8, register: Option<u8>, data: &[u8]) -> Result<(), BusError>;

    /// Read bytes from a device
    ///
    /// Reads exactly `buf.len()` bytes. When a register is given it is
    /// written first and the read follows with a repeated start.
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `register` - Optional sub-register to read from
    /// * `buf` - Buffer to read into
    fn receive(&mut self, address: u8, register: Option<u8>, buf: &mut [u8])
        -> Result<(), BusError>;
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn send(&mut self, address: u8, register: Option<u8>, data: &[u8]) -> Result<(), BusError> {
        (**self).send(address, register, data)
    }

    fn receive(
        &mut self,
        address: u8,
        register: Option<u8>,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        (**self).receive(address, register, buf)
    }
}

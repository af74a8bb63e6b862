//! `embedded-hal` I2C adapter
//!
//! Wraps any blocking `embedded_hal::i2c::I2c` master so it can be used as
//! an [`I2cBus`]. This is how a driver gets onto real hardware, whether the
//! master is a Linux i2c-dev handle or a microcontroller peripheral.

use embedded_hal::i2c::{Error as _, ErrorKind, I2c, Operation};

use crate::i2c::{BusError, I2cBus};

impl From<ErrorKind> for BusError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Bus => BusError::Bus,
            ErrorKind::ArbitrationLoss => BusError::ArbitrationLost,
            ErrorKind::NoAcknowledge(_) => BusError::Nack,
            ErrorKind::Overrun => BusError::Overrun,
            _ => BusError::Other,
        }
    }
}

/// [`I2cBus`] over an `embedded-hal` I2C master
#[derive(Debug)]
pub struct EmbeddedI2c<I> {
    i2c: I,
}

impl<I: I2c> EmbeddedI2c<I> {
    /// Wrap an I2C master
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    /// Borrow the wrapped master
    pub fn inner(&mut self) -> &mut I {
        &mut self.i2c
    }

    /// Release the wrapped master
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> I2cBus for EmbeddedI2c<I> {
    fn send(&mut self, address: u8, register: Option<u8>, data: &[u8]) -> Result<(), BusError> {
        let result = match register {
            // Adjacent writes go out back to back without a repeated start
            Some(reg) => self.i2c.transaction(
                address,
                &mut [Operation::Write(&[reg]), Operation::Write(data)],
            ),
            None => self.i2c.write(address, data),
        };
        result.map_err(|e| e.kind().into())
    }

    fn receive(
        &mut self,
        address: u8,
        register: Option<u8>,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        let result = match register {
            Some(reg) => self.i2c.write_read(address, &[reg], buf),
            None => self.i2c.read(address, buf),
        };
        result.map_err(|e| e.kind().into())
    }
}

//! Linux i2c-dev backend
//!
//! Opens `/dev/i2c-N` through `linux-embedded-hal`. The slave address is
//! selected per transfer, so one handle can serve every module on the bus.

use std::path::Path;

use linux_embedded_hal::I2cdev;

use crate::embedded::EmbeddedI2c;
use crate::i2c::BusError;

/// Bus device the Gnublin modules are wired to
pub const DEFAULT_DEVICE: &str = "/dev/i2c-1";

/// I2C bus backed by a Linux i2c-dev node
pub type LinuxI2c = EmbeddedI2c<I2cdev>;

/// Open an i2c-dev node as an [`I2cBus`](crate::I2cBus)
pub fn open_i2c_dev(path: impl AsRef<Path>) -> Result<LinuxI2c, BusError> {
    I2cdev::new(path)
        .map(EmbeddedI2c::new)
        .map_err(|_| BusError::Open)
}

/// Open the board's default bus ([`DEFAULT_DEVICE`])
pub fn open_default() -> Result<LinuxI2c, BusError> {
    open_i2c_dev(DEFAULT_DEVICE)
}

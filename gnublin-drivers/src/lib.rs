//! Gnublin module drivers
//!
//! Drivers for the plug-on modules of the Gnublin board, written against
//! the [`gnublin_hal::I2cBus`] abstraction:
//!
//! - Stepper controller (module-step, TMC222)

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to the other modules
#[macro_use]
mod fmt;

pub mod stepper;

pub use gnublin_hal::{BusError, I2cBus};

#[cfg(feature = "linux")]
pub use gnublin_hal::linux::{open_default, open_i2c_dev};

//! Gnublin Hardware Abstraction Layer
//!
//! This crate defines the bus abstraction that the Gnublin module drivers
//! are written against. Drivers only see [`I2cBus`]; the concrete bus can be
//! any `embedded-hal` I2C master (through [`EmbeddedI2c`]) or, with the
//! `linux` feature, the board's `/dev/i2c-N` device.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Module drivers (gnublin-drivers)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  gnublin-hal (this crate - I2cBus)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ embedded-hal  │       │ linux i2c-dev │
//! │  I2c master   │       │   (feature)   │
//! └───────────────┘       └───────────────┘
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[cfg(all(feature = "linux", not(test)))]
extern crate std;

pub mod embedded;
pub mod i2c;
#[cfg(feature = "linux")]
pub mod linux;

// Re-export key types at crate root for convenience
pub use embedded::EmbeddedI2c;
pub use i2c::{BusError, I2cBus};

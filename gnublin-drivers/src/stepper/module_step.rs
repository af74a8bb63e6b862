//! Gnublin module-step driver
//!
//! Drives the TMC222 on the module-step over I2C. The driver keeps the
//! motor parameters on the host side and sequences commands and status
//! reads; all motion is executed by the chip.
//!
//! Every operation blocks until the bus transfer completes. Bus errors are
//! returned as-is and never retried.

use core::fmt;

use gnublin_hal::{BusError, I2cBus};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::tmc222::{
    self, cmd, AddressBurnError, BurnOutcome, MotionStatus, MotorConfig, RangeError, StatusFrame,
    STATUS_FRAME_LEN,
};

/// Address of a module-step with no OTP bits burned and the jumper open
pub const DEFAULT_ADDRESS: u8 = 0x60;

/// Errors from operations that both validate input and use the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModuleStepError {
    /// Motor parameter out of range, nothing was sent
    Range(RangeError),
    /// Bus transfer failed
    Bus(BusError),
}

impl From<RangeError> for ModuleStepError {
    fn from(e: RangeError) -> Self {
        ModuleStepError::Range(e)
    }
}

impl From<BusError> for ModuleStepError {
    fn from(e: BusError) -> Self {
        ModuleStepError::Bus(e)
    }
}

impl fmt::Display for ModuleStepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStepError::Range(e) => write!(f, "invalid motor parameter: {}", e),
            ModuleStepError::Bus(e) => write!(f, "bus error: {}", e),
        }
    }
}

/// Module-step configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModuleStepConfig {
    /// 7-bit I2C slave address
    pub address: u8,
    /// Motor parameters
    pub motor: MotorConfig,
}

impl Default for ModuleStepConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            motor: MotorConfig::default(),
        }
    }
}

/// Status decoded from a single GetFullStatus1 read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepperStatus {
    /// Motion phase
    pub motion: MotionStatus,
    /// ESW switch input is closed
    pub switch_closed: bool,
}

/// Module-step driver
///
/// Owns the bus handle. Pass `&mut bus` to share one bus between several
/// drivers; the borrow keeps transfers from overlapping.
pub struct ModuleStep<B> {
    bus: B,
    address: u8,
    config: MotorConfig,
}

impl<B: I2cBus> ModuleStep<B> {
    /// Create a driver with the default motor parameters
    pub fn new(bus: B, address: u8) -> Self {
        Self {
            bus,
            address: address & gnublin_hal::i2c::MAX_SLAVE_ADDRESS,
            config: MotorConfig::default(),
        }
    }

    /// Create a driver with the given motor parameters
    ///
    /// Fails if any parameter is above 15. Nothing is sent until
    /// [`set_motor_param`](Self::set_motor_param).
    pub fn with_config(bus: B, address: u8, config: MotorConfig) -> Result<Self, RangeError> {
        config.validate()?;
        let mut driver = Self::new(bus, address);
        driver.config = config;
        Ok(driver)
    }

    /// Create a driver from a (possibly deserialized) configuration
    pub fn from_config(bus: B, config: &ModuleStepConfig) -> Result<Self, RangeError> {
        Self::with_config(bus, config.address, config.motor)
    }

    /// Slave address used for every transfer
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Talk to a module at another address
    pub fn set_address(&mut self, address: u8) {
        self.address = address & gnublin_hal::i2c::MAX_SLAVE_ADDRESS;
        debug!("module-step address set to {:#x}", self.address);
    }

    /// Current motor parameters
    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Release the bus handle
    pub fn release(self) -> B {
        self.bus
    }

    /// Set the run current (0-15), takes effect on the next SetMotorParam
    pub fn set_irun(&mut self, value: u8) -> Result<(), RangeError> {
        self.config.set_run_current(value)
    }

    /// Set the hold current (0-15), takes effect on the next SetMotorParam
    pub fn set_ihold(&mut self, value: u8) -> Result<(), RangeError> {
        self.config.set_hold_current(value)
    }

    /// Set the maximum velocity (0-15), takes effect on the next SetMotorParam
    pub fn set_vmax(&mut self, value: u8) -> Result<(), RangeError> {
        self.config.set_v_max(value)
    }

    /// Set the minimum velocity (0-15), takes effect on the next SetMotorParam
    pub fn set_vmin(&mut self, value: u8) -> Result<(), RangeError> {
        self.config.set_v_min(value)
    }

    /// Send the stored motor parameters
    pub fn set_motor_param(&mut self) -> Result<(), BusError> {
        let frame = tmc222::encode_set_motor_param(&self.config);
        debug!(
            "SetMotorParam irun={} ihold={} vmax={} vmin={}",
            self.config.run_current,
            self.config.hold_current,
            self.config.v_max,
            self.config.v_min
        );
        self.write(&frame)
    }

    /// Store all four motor parameters and send them
    ///
    /// If any value is out of range the stored parameters are left
    /// unchanged and nothing is sent.
    pub fn set_motor_param_with(
        &mut self,
        irun: u8,
        ihold: u8,
        vmax: u8,
        vmin: u8,
    ) -> Result<(), ModuleStepError> {
        self.config = MotorConfig::new(irun, ihold, vmax, vmin)?;
        self.set_motor_param()?;
        Ok(())
    }

    /// Stop immediately
    pub fn hard_stop(&mut self) -> Result<(), BusError> {
        self.command(cmd::HARD_STOP)
    }

    /// Decelerate to a stop
    pub fn soft_stop(&mut self) -> Result<(), BusError> {
        self.command(cmd::SOFT_STOP)
    }

    /// Set actual and target position to zero
    pub fn reset_position(&mut self) -> Result<(), BusError> {
        self.command(cmd::RESET_POSITION)
    }

    /// Start the reference search
    pub fn run_init(&mut self) -> Result<(), BusError> {
        self.command(cmd::RUN_INIT)
    }

    /// Request GetFullStatus1
    ///
    /// Only sends the request. [`status`](Self::status) and friends send it
    /// and read the decoded response.
    pub fn get_full_status1(&mut self) -> Result<(), BusError> {
        self.command(cmd::GET_FULL_STATUS1)
    }

    /// Request GetFullStatus2
    ///
    /// Only sends the request, the response is left unread.
    pub fn get_full_status2(&mut self) -> Result<(), BusError> {
        self.command(cmd::GET_FULL_STATUS2)
    }

    /// Move to an absolute position
    pub fn set_position(&mut self, target: i16) -> Result<(), BusError> {
        trace!("SetPosition {}", target);
        self.write(&tmc222::encode_set_position(target))
    }

    /// Move by `steps` relative to the actual position
    ///
    /// The position register is 16 bits wide, so the target wraps around
    /// at the ends of the `i16` range just like the chip's counter does.
    pub fn drive(&mut self, steps: i16) -> Result<(), BusError> {
        let actual = self.get_actual_position()?;
        let target = actual.wrapping_add(steps);
        debug!("drive {} steps: {} -> {}", steps, actual, target);
        self.set_position(target)
    }

    /// Motion status field (0-7)
    pub fn get_motion_status(&mut self) -> Result<u8, BusError> {
        let frame = self.read_status(cmd::GET_FULL_STATUS1)?;
        Ok(tmc222::decode_motion_status(&frame))
    }

    /// Motion status as a [`MotionStatus`]
    pub fn motion_status(&mut self) -> Result<MotionStatus, BusError> {
        self.get_motion_status().map(MotionStatus::from_raw)
    }

    /// State of the ESW switch input
    pub fn get_switch(&mut self) -> Result<bool, BusError> {
        let frame = self.read_status(cmd::GET_FULL_STATUS1)?;
        Ok(tmc222::decode_switch_state(&frame))
    }

    /// Motion status and switch state from one status read
    pub fn status(&mut self) -> Result<StepperStatus, BusError> {
        let frame = self.read_status(cmd::GET_FULL_STATUS1)?;
        Ok(StepperStatus {
            motion: MotionStatus::from_raw(tmc222::decode_motion_status(&frame)),
            switch_closed: tmc222::decode_switch_state(&frame),
        })
    }

    /// Actual position reported by the chip
    pub fn get_actual_position(&mut self) -> Result<i16, BusError> {
        let frame = self.read_status(cmd::GET_FULL_STATUS2)?;
        Ok(tmc222::decode_actual_position(&frame))
    }

    /// Burn a new slave address into OTP memory
    ///
    /// This cannot be undone. The request is validated against the current
    /// address (see [`tmc222::validate_new_address`]) and is only sent when
    /// `confirmed` is true. An odd address is burned as the next lower even
    /// one, because the lowest bit comes from the jumper.
    ///
    /// The driver keeps using the old address. The module answers on
    /// [`BurnOutcome::address`] once it has been replugged.
    pub fn burn_new_address(
        &mut self,
        new_address: u8,
        confirmed: bool,
    ) -> Result<BurnOutcome, AddressBurnError> {
        let address = tmc222::validate_new_address(self.address, new_address)?;
        if address != new_address {
            info!(
                "address bit 0 is set by the jumper, burning {:#x} instead of {:#x}",
                address,
                new_address
            );
        }

        if !confirmed {
            warn!("address burn to {:#x} not confirmed", address);
            return Err(AddressBurnError::NotConfirmed);
        }

        let frame = tmc222::burn_frame(address);
        warn!(
            "burning OTP address {:#x} -> {:#x}, this is permanent",
            self.address,
            address
        );
        self.write(&frame)?;
        info!("new address {:#x} burned, replug the module", address);

        Ok(BurnOutcome {
            address,
            otp_bits: tmc222::otp_bits(address),
        })
    }

    /// Send a single command byte
    fn command(&mut self, opcode: u8) -> Result<(), BusError> {
        self.write(&tmc222::encode_simple_command(opcode))
    }

    /// Request a status frame and read it back
    fn read_status(&mut self, request: u8) -> Result<StatusFrame, BusError> {
        self.command(request)?;
        let mut frame = [0u8; STATUS_FRAME_LEN];
        self.bus.receive(self.address, None, &mut frame)?;
        trace!("status {:#x}: {:#x}", request, frame);
        Ok(frame)
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), BusError> {
        trace!("tx {:#x}: {:#x}", self.address, frame);
        self.bus.send(self.address, None, frame)
    }
}

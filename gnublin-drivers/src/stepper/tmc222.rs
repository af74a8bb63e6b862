//! TMC222 stepper controller (I2C mode)
//!
//! The TMC222 on the module-step is a closed-loop stepper controller. The
//! host only sets motion parameters and target positions; ramping and
//! stepping happen inside the chip.
//!
//! # Command Frames
//!
//! Every frame starts with the command byte. Bytes marked N/A must be 0xFF.
//!
//! ```text
//! SetMotorParam   89 FF FF [Irun|Ihold] [Vmax|Vmin] 00 00 00
//! SetPosition     8B FF FF [Pos 15:8] [Pos 7:0]
//! SetOTPParam     90 FF FF 02 [AD3..AD0]
//! others          one command byte
//! ```
//!
//! # Status Frames
//!
//! GetFullStatus1 and GetFullStatus2 are followed by an 8 byte read:
//! - GetFullStatus1, byte 5: motion status (bits 7-5), ESW switch (bit 4)
//! - GetFullStatus2, bytes 1-2: actual position, big-endian signed
//!
//! # Slave Address
//!
//! The 7-bit address is `1 1 AD3 AD2 AD1 AD0 HW`. AD3..AD0 live in OTP
//! memory and can only go from 0 to 1. HW is the jumper on the module.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// TMC222 command bytes
pub mod cmd {
    /// Read status flags, motion status and switch state
    pub const GET_FULL_STATUS1: u8 = 0x81;
    /// Read actual, target and secure position
    pub const GET_FULL_STATUS2: u8 = 0xFC;
    /// Immediate stop without deceleration
    pub const HARD_STOP: u8 = 0x85;
    /// Set actual and target position to zero
    pub const RESET_POSITION: u8 = 0x86;
    /// Reference search
    pub const RUN_INIT: u8 = 0x88;
    /// Set current and velocity parameters
    pub const SET_MOTOR_PARAM: u8 = 0x89;
    /// Set target position
    pub const SET_POSITION: u8 = 0x8B;
    /// Stop with deceleration
    pub const SOFT_STOP: u8 = 0x8F;
    /// Program OTP memory
    pub const SET_OTP_PARAM: u8 = 0x90;
}

/// Filler for the N/A bytes following the command byte
const NOT_APPLICABLE: u8 = 0xFF;

/// Status, SecurePos and StepMode bytes of SetMotorParam (written as zero)
const RESERVED: u8 = 0x00;

/// SetOTPParam selector for the AD3..AD0 address bits
const OTP_SELECT_ADDRESS: u8 = 0x02;

/// Length of a status frame
pub const STATUS_FRAME_LEN: usize = 8;

/// Raw 8 byte status frame
pub type StatusFrame = [u8; STATUS_FRAME_LEN];

/// Largest value of a 4-bit motor parameter
pub const MAX_NIBBLE: u8 = 15;

/// Largest TMC222 slave address
pub const MAX_ADDRESS: u8 = 0x7F;

/// Address bits stored in OTP memory (AD3..AD0)
const OTP_ADDRESS_MASK: u8 = 0x1E;

/// Address bit set by the module jumper
const JUMPER_BIT: u8 = 0x01;

/// Byte of a GetFullStatus1 frame carrying motion and switch state
const MOTION_BYTE: usize = 5;
const MOTION_STATUS_MASK: u8 = 0xE0;
const MOTION_STATUS_SHIFT: u8 = 5;
const SWITCH_MASK: u8 = 0x10;

/// Motor parameter outside 0..=15
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RangeError {
    /// The rejected value
    pub value: u8,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value {} out of range 0..={}", self.value, MAX_NIBBLE)
    }
}

fn check_nibble(value: u8) -> Result<u8, RangeError> {
    if value > MAX_NIBBLE {
        return Err(RangeError { value });
    }
    Ok(value)
}

/// Motor parameters sent with SetMotorParam
///
/// All four values are 4-bit chip settings, not physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotorConfig {
    /// Run current (Irun, 0-15)
    pub run_current: u8,
    /// Hold current (Ihold, 0-15)
    pub hold_current: u8,
    /// Maximum velocity (Vmax, 0-15)
    pub v_max: u8,
    /// Minimum velocity (Vmin, 0-15)
    pub v_min: u8,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            run_current: 15,
            hold_current: 0,
            v_max: 8,
            v_min: 0,
        }
    }
}

impl MotorConfig {
    /// Create a config, rejecting any value above 15
    pub fn new(run_current: u8, hold_current: u8, v_max: u8, v_min: u8) -> Result<Self, RangeError> {
        Ok(Self {
            run_current: check_nibble(run_current)?,
            hold_current: check_nibble(hold_current)?,
            v_max: check_nibble(v_max)?,
            v_min: check_nibble(v_min)?,
        })
    }

    /// Check every field is in range
    ///
    /// Needed for configs built by hand or deserialized.
    pub fn validate(&self) -> Result<(), RangeError> {
        Self::new(self.run_current, self.hold_current, self.v_max, self.v_min).map(|_| ())
    }

    /// Set the run current
    pub fn set_run_current(&mut self, value: u8) -> Result<(), RangeError> {
        self.run_current = check_nibble(value)?;
        Ok(())
    }

    /// Set the hold current
    pub fn set_hold_current(&mut self, value: u8) -> Result<(), RangeError> {
        self.hold_current = check_nibble(value)?;
        Ok(())
    }

    /// Set the maximum velocity
    pub fn set_v_max(&mut self, value: u8) -> Result<(), RangeError> {
        self.v_max = check_nibble(value)?;
        Ok(())
    }

    /// Set the minimum velocity
    pub fn set_v_min(&mut self, value: u8) -> Result<(), RangeError> {
        self.v_min = check_nibble(value)?;
        Ok(())
    }

    /// Irun in the high nibble, Ihold in the low nibble
    pub fn current_byte(&self) -> u8 {
        ((self.run_current & 0x0F) << 4) | (self.hold_current & 0x0F)
    }

    /// Vmax in the high nibble, Vmin in the low nibble
    pub fn velocity_byte(&self) -> u8 {
        ((self.v_max & 0x0F) << 4) | (self.v_min & 0x0F)
    }
}

/// Motion status reported in GetFullStatus1
///
/// The position loop runs inside the chip; these are the phases it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MotionStatus {
    /// Actual position equals target position
    Stopped = 0,
    /// Accelerating, positive velocity
    AcceleratingPositive = 1,
    /// Running at Vmax, positive velocity
    ConstantPositive = 2,
    /// Decelerating, positive velocity
    DeceleratingPositive = 3,
    /// Velocity is zero but target not reached
    Stalled = 4,
    /// Accelerating, negative velocity
    AcceleratingNegative = 5,
    /// Running at Vmax, negative velocity
    ConstantNegative = 6,
    /// Decelerating, negative velocity
    DeceleratingNegative = 7,
}

impl MotionStatus {
    /// Decode the low three bits of `raw`
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x07 {
            0 => MotionStatus::Stopped,
            1 => MotionStatus::AcceleratingPositive,
            2 => MotionStatus::ConstantPositive,
            3 => MotionStatus::DeceleratingPositive,
            4 => MotionStatus::Stalled,
            5 => MotionStatus::AcceleratingNegative,
            6 => MotionStatus::ConstantNegative,
            _ => MotionStatus::DeceleratingNegative,
        }
    }

    /// Numeric value as reported by the chip
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Check if the motor has non-zero velocity
    pub fn is_moving(self) -> bool {
        !matches!(self, MotionStatus::Stopped | MotionStatus::Stalled)
    }

    /// Check if the motor is running towards higher positions
    pub fn is_positive(self) -> bool {
        matches!(self.raw(), 1..=3)
    }

    /// Check if the motor is running towards lower positions
    pub fn is_negative(self) -> bool {
        matches!(self.raw(), 5..=7)
    }
}

impl From<u8> for MotionStatus {
    fn from(raw: u8) -> Self {
        Self::from_raw(raw)
    }
}

/// Reasons an address burn is refused or fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressBurnError {
    /// New address is not above the current one
    NotIncreasing {
        /// Address currently in use
        current: u8,
        /// Address that was requested
        requested: u8,
    },
    /// New address does not fit in 7 bits
    OutOfRange {
        /// Address that was requested
        requested: u8,
    },
    /// New address would clear an OTP bit that is already set
    BitCannotBeCleared {
        /// AD3..AD0 of the current address
        old_bits: u8,
        /// AD3..AD0 of the requested address
        new_bits: u8,
    },
    /// Caller did not confirm the burn
    NotConfirmed,
    /// Sending SetOTPParam failed
    Bus(gnublin_hal::BusError),
}

impl From<gnublin_hal::BusError> for AddressBurnError {
    fn from(e: gnublin_hal::BusError) -> Self {
        AddressBurnError::Bus(e)
    }
}

impl fmt::Display for AddressBurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressBurnError::NotIncreasing { current, requested } => write!(
                f,
                "new address {:#04x} must be higher than current address {:#04x}",
                requested, current
            ),
            AddressBurnError::OutOfRange { requested } => write!(
                f,
                "address {:#04x} exceeds the largest address {:#04x}",
                requested, MAX_ADDRESS
            ),
            AddressBurnError::BitCannotBeCleared { old_bits, new_bits } => write!(
                f,
                "OTP address bits cannot be cleared (old {:#x}, new {:#x})",
                old_bits, new_bits
            ),
            AddressBurnError::NotConfirmed => f.write_str("address burn not confirmed"),
            AddressBurnError::Bus(e) => write!(f, "address burn failed: {}", e),
        }
    }
}

/// Result of a successful address burn
///
/// The chip only picks up the new address after the module has been
/// replugged or power-cycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BurnOutcome {
    /// Even base address burned into OTP
    ///
    /// After a replug the module answers on this address with the jumper
    /// open, or on `address | 1` with the jumper closed.
    pub address: u8,
    /// AD3..AD0 value written to OTP
    pub otp_bits: u8,
}

impl BurnOutcome {
    /// Always true: the new address needs a replug to take effect
    pub fn replug_required(&self) -> bool {
        true
    }
}

/// Extract AD3..AD0 from a slave address
pub fn otp_bits(address: u8) -> u8 {
    (address & OTP_ADDRESS_MASK) >> 1
}

/// Check a requested address against the current one
///
/// Returns the address that will actually be programmed: the jumper bit
/// cannot be burned, so an odd request is lowered by one.
pub fn validate_new_address(current: u8, requested: u8) -> Result<u8, AddressBurnError> {
    if requested <= current {
        return Err(AddressBurnError::NotIncreasing { current, requested });
    }
    if requested > MAX_ADDRESS {
        return Err(AddressBurnError::OutOfRange { requested });
    }

    let old_bits = otp_bits(current);
    let new_bits = otp_bits(requested);
    // An OTP bit that is 1 now must stay 1
    if old_bits & !new_bits != 0 {
        return Err(AddressBurnError::BitCannotBeCleared { old_bits, new_bits });
    }

    Ok(requested & !JUMPER_BIT)
}

/// Build a SetMotorParam frame
pub fn encode_set_motor_param(config: &MotorConfig) -> [u8; 8] {
    [
        cmd::SET_MOTOR_PARAM,
        NOT_APPLICABLE,
        NOT_APPLICABLE,
        config.current_byte(),
        config.velocity_byte(),
        RESERVED, // Status
        RESERVED, // SecurePos
        RESERVED, // StepMode
    ]
}

/// Build a SetPosition frame
pub fn encode_set_position(target: i16) -> [u8; 5] {
    let [high, low] = target.to_be_bytes();
    [cmd::SET_POSITION, NOT_APPLICABLE, NOT_APPLICABLE, high, low]
}

/// Build a single-byte command frame
pub fn encode_simple_command(opcode: u8) -> [u8; 1] {
    [opcode]
}

/// Build a SetOTPParam frame programming a new slave address
///
/// Runs [`validate_new_address`] first; nothing is encoded for a request
/// that would be refused.
pub fn encode_burn_address(current: u8, requested: u8) -> Result<[u8; 5], AddressBurnError> {
    let address = validate_new_address(current, requested)?;
    Ok(burn_frame(address))
}

/// SetOTPParam frame for an already validated address
pub(crate) fn burn_frame(address: u8) -> [u8; 5] {
    [
        cmd::SET_OTP_PARAM,
        NOT_APPLICABLE,
        NOT_APPLICABLE,
        OTP_SELECT_ADDRESS,
        otp_bits(address),
    ]
}

/// Motion status field of a GetFullStatus1 frame (0-7)
pub fn decode_motion_status(frame: &StatusFrame) -> u8 {
    (frame[MOTION_BYTE] & MOTION_STATUS_MASK) >> MOTION_STATUS_SHIFT
}

/// ESW switch state of a GetFullStatus1 frame
pub fn decode_switch_state(frame: &StatusFrame) -> bool {
    frame[MOTION_BYTE] & SWITCH_MASK != 0
}

/// Actual position of a GetFullStatus2 frame
pub fn decode_actual_position(frame: &StatusFrame) -> i16 {
    i16::from_be_bytes([frame[1], frame[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_with_byte5(value: u8) -> StatusFrame {
        let mut frame = [0u8; STATUS_FRAME_LEN];
        frame[5] = value;
        frame
    }

    #[test]
    fn test_default_motor_param_frame() {
        let frame = encode_set_motor_param(&MotorConfig::default());

        assert_eq!(frame[0], 0x89);
        assert_eq!(frame[1], 0xFF);
        assert_eq!(frame[2], 0xFF);
        assert_eq!(frame[3], 0xF0);
        assert_eq!(frame[4], 0x80);
        assert_eq!(&frame[5..], &[0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_motor_param_nibbles() {
        let config = MotorConfig::new(3, 12, 9, 1).unwrap();
        let frame = encode_set_motor_param(&config);

        assert_eq!(frame[3], 0x3C);
        assert_eq!(frame[4], 0x91);
    }

    #[test]
    fn test_config_rejects_out_of_range() {
        assert_eq!(MotorConfig::new(16, 0, 0, 0), Err(RangeError { value: 16 }));
        assert_eq!(MotorConfig::new(0, 0, 0, 200), Err(RangeError { value: 200 }));

        let mut config = MotorConfig::default();
        assert!(config.set_hold_current(16).is_err());
        assert!(config.set_v_min(255).is_err());
        assert_eq!(config, MotorConfig::default());

        config.v_max = 20;
        assert_eq!(config.validate(), Err(RangeError { value: 20 }));
    }

    #[test]
    fn test_set_position_frame() {
        assert_eq!(encode_set_position(150), [0x8B, 0xFF, 0xFF, 0x00, 0x96]);
        assert_eq!(encode_set_position(-2), [0x8B, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(encode_set_position(i16::MIN), [0x8B, 0xFF, 0xFF, 0x80, 0x00]);
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(encode_simple_command(cmd::HARD_STOP), [0x85]);
        assert_eq!(encode_simple_command(cmd::SOFT_STOP), [0x8F]);
        assert_eq!(encode_simple_command(cmd::RESET_POSITION), [0x86]);
        assert_eq!(encode_simple_command(cmd::RUN_INIT), [0x88]);
        assert_eq!(encode_simple_command(cmd::GET_FULL_STATUS1), [0x81]);
        assert_eq!(encode_simple_command(cmd::GET_FULL_STATUS2), [0xFC]);
    }

    #[test]
    fn test_motion_status_and_switch_share_byte5() {
        // Motion status 5, switch closed, low nibble noise
        let frame = frame_with_byte5(0b1011_0110);
        assert_eq!(decode_motion_status(&frame), 5);
        assert!(decode_switch_state(&frame));

        let frame = frame_with_byte5(0b0100_1111);
        assert_eq!(decode_motion_status(&frame), 2);
        assert!(!decode_switch_state(&frame));
    }

    #[test]
    fn test_motion_status_enum() {
        assert_eq!(MotionStatus::from_raw(0), MotionStatus::Stopped);
        assert_eq!(MotionStatus::from_raw(4), MotionStatus::Stalled);
        assert_eq!(MotionStatus::from(7), MotionStatus::DeceleratingNegative);
        // Only the low three bits count
        assert_eq!(MotionStatus::from_raw(0x0A), MotionStatus::ConstantPositive);

        assert!(!MotionStatus::Stopped.is_moving());
        assert!(!MotionStatus::Stalled.is_moving());
        assert!(MotionStatus::ConstantPositive.is_positive());
        assert!(MotionStatus::AcceleratingNegative.is_negative());
        assert!(!MotionStatus::Stalled.is_negative());
    }

    #[test]
    fn test_actual_position() {
        let mut frame = [0u8; STATUS_FRAME_LEN];
        frame[1] = 0x00;
        frame[2] = 0x64;
        assert_eq!(decode_actual_position(&frame), 100);

        frame[1] = 0xFF;
        frame[2] = 0x9C;
        assert_eq!(decode_actual_position(&frame), -100);
    }

    #[test]
    fn test_burn_not_increasing() {
        assert_eq!(
            validate_new_address(0x10, 0x08),
            Err(AddressBurnError::NotIncreasing {
                current: 0x10,
                requested: 0x08
            })
        );
        assert!(matches!(
            validate_new_address(0x60, 0x60),
            Err(AddressBurnError::NotIncreasing { .. })
        ));
    }

    #[test]
    fn test_burn_out_of_range() {
        assert_eq!(
            validate_new_address(0x10, 0x90),
            Err(AddressBurnError::OutOfRange { requested: 0x90 })
        );
    }

    #[test]
    fn test_burn_bit_cannot_be_cleared() {
        // 0x10 has AD3 set, 0x20 has no OTP bits at all
        assert_eq!(
            validate_new_address(0b0001_0000, 0x20),
            Err(AddressBurnError::BitCannotBeCleared {
                old_bits: 0x08,
                new_bits: 0x00
            })
        );
        // 0x62 -> 0x64 would move AD0 to AD1
        assert!(matches!(
            validate_new_address(0x62, 0x64),
            Err(AddressBurnError::BitCannotBeCleared { .. })
        ));
    }

    #[test]
    fn test_burn_jumper_bit_is_dropped() {
        assert_eq!(validate_new_address(0x10, 0x15), Ok(0x14));

        let frame = encode_burn_address(0x10, 0x15).unwrap();
        assert_eq!(frame, [0x90, 0xFF, 0xFF, 0x02, 0x0A]);
        assert_eq!(frame, burn_frame(0x14));
    }

    #[test]
    fn test_burn_frame_not_built_when_refused() {
        assert_eq!(
            encode_burn_address(0x10, 0x90),
            Err(AddressBurnError::OutOfRange { requested: 0x90 })
        );
    }

    proptest! {
        #[test]
        fn prop_motion_status_is_total(byte5 in any::<u8>()) {
            let status = decode_motion_status(&frame_with_byte5(byte5));
            prop_assert!(status <= 7);
            prop_assert_eq!(MotionStatus::from_raw(status).raw(), status);
        }

        #[test]
        fn prop_actual_position_is_signed_be(hi in any::<u8>(), lo in any::<u8>()) {
            let mut frame = [0u8; STATUS_FRAME_LEN];
            frame[1] = hi;
            frame[2] = lo;
            let expected = (((hi as u16) << 8) | lo as u16) as i16;
            prop_assert_eq!(decode_actual_position(&frame), expected);
        }

        #[test]
        fn prop_nibbles_land_in_frame(
            irun in 0u8..=15, ihold in 0u8..=15, vmax in 0u8..=15, vmin in 0u8..=15,
        ) {
            let config = MotorConfig::new(irun, ihold, vmax, vmin).unwrap();
            let frame = encode_set_motor_param(&config);
            prop_assert_eq!(frame[3] >> 4, irun);
            prop_assert_eq!(frame[3] & 0x0F, ihold);
            prop_assert_eq!(frame[4] >> 4, vmax);
            prop_assert_eq!(frame[4] & 0x0F, vmin);
        }

        #[test]
        fn prop_out_of_range_rejected(value in 16u8..) {
            let mut config = MotorConfig::default();
            prop_assert_eq!(config.set_run_current(value), Err(RangeError { value }));
            prop_assert_eq!(config.set_hold_current(value), Err(RangeError { value }));
            prop_assert_eq!(config.set_v_max(value), Err(RangeError { value }));
            prop_assert_eq!(config.set_v_min(value), Err(RangeError { value }));
            prop_assert_eq!(config, MotorConfig::default());
        }

        #[test]
        fn prop_validated_address_keeps_otp_bits(current in 0u8..=0x7F, requested in any::<u8>()) {
            if let Ok(address) = validate_new_address(current, requested) {
                prop_assert!(address <= MAX_ADDRESS);
                prop_assert_eq!(address & 0x01, 0);
                prop_assert_eq!(otp_bits(current) & !otp_bits(address), 0);
            }
        }
    }
}

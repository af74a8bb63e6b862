//! Stepper driver implementations

pub mod module_step;
pub mod tmc222;

#[cfg(test)]
mod mock;

pub use module_step::{ModuleStep, ModuleStepConfig, ModuleStepError, StepperStatus};
pub use tmc222::{AddressBurnError, BurnOutcome, MotionStatus, MotorConfig, RangeError};

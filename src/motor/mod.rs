// Actuator back-ends for the swerve base
//
// Provides:
// - Feetech STS3215 serial protocol implementation
// - Eight-joint Feetech hardware (velocity-mode wheels, position-mode steering)
// - Simulated joints for tests and `--sim`

mod driver;
pub mod feetech;
pub mod sim;

pub use driver::FeetechHardware;
pub use feetech::{FeetechBus, FeetechError};
pub use sim::SimHardware;

//! Simulation transport.
//!
//! Emulates a segment of SOMANET drives without hardware, including
//! AL state handling, work counters and injected faults.

mod bus;
mod drive;

pub use bus::{AL_INVALID_STATE_CHANGE, AL_NO_VALID_OUTPUTS, AL_SM_WATCHDOG, SimulatedBus};
pub use drive::{SimulatedDrive, VELOCITY_RAMP};

use evo_common::fieldbus::config::MasterConfig;
use evo_common::fieldbus::transport::Fieldbus;

/// Factory function to create a simulation transport instance.
pub fn create_transport(config: &MasterConfig) -> Box<dyn Fieldbus> {
    Box::new(SimulatedBus::from_master_config(config))
}

//! CiA-402 drive model.
//!
//! Follows the control word edges of the device state diagram. In cyclic
//! synchronous velocity mode with operation enabled the actual velocity
//! ramps toward the target and position integrates once per exchange.

use evo_common::consts::OP_MODE_CSV;
use evo_common::drive::cia402::DriveState;
use evo_common::drive::pdo::{DriveInputs, DriveOutputs};

/// Maximum velocity change per exchange.
pub const VELOCITY_RAMP: i32 = 10;

const FAULT_RESET_BIT: u16 = 0x0080;

/// Software model of one SOMANET drive.
#[derive(Debug, Clone)]
pub struct SimulatedDrive {
    state: DriveState,
    op_mode: i8,
    control_word: u16,
    target_velocity: i32,
    velocity: i32,
    position: i32,
    timestamp: u32,
}

impl SimulatedDrive {
    /// Drive powered up in Switch On Disabled, or in Fault.
    pub fn new(in_fault: bool) -> Self {
        Self {
            state: if in_fault {
                DriveState::Fault
            } else {
                DriveState::SwitchOnDisabled
            },
            op_mode: 0,
            control_word: 0,
            target_velocity: 0,
            velocity: 0,
            position: 0,
            timestamp: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> DriveState {
        self.state
    }

    /// Actual velocity.
    pub fn velocity(&self) -> i32 {
        self.velocity
    }

    /// Actual position.
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Drop into Fault (e.g. on a sync manager watchdog).
    pub fn trip(&mut self) {
        self.state = DriveState::Fault;
    }

    /// Take the output record of one exchange.
    pub fn apply(&mut self, outputs: &DriveOutputs) {
        let previous = self.control_word;
        let cw = outputs.control_word;
        self.control_word = cw;
        self.op_mode = outputs.op_mode;
        self.target_velocity = outputs.target_velocity;

        let reset_edge = cw & FAULT_RESET_BIT != 0 && previous & FAULT_RESET_BIT == 0;
        self.state = match self.state {
            DriveState::Fault if reset_edge => DriveState::SwitchOnDisabled,
            DriveState::Fault => DriveState::Fault,
            // Disable voltage
            _ if cw & 0x0002 == 0 => DriveState::SwitchOnDisabled,
            DriveState::SwitchOnDisabled if cw & 0x0087 == 0x0006 => DriveState::ReadyToSwitchOn,
            DriveState::ReadyToSwitchOn if cw & 0x008F == 0x0007 => DriveState::SwitchedOn,
            DriveState::ReadyToSwitchOn | DriveState::SwitchedOn if cw & 0x008F == 0x000F => {
                DriveState::OperationEnabled
            }
            DriveState::SwitchedOn | DriveState::OperationEnabled if cw & 0x0087 == 0x0006 => {
                DriveState::ReadyToSwitchOn
            }
            DriveState::OperationEnabled if cw & 0x008F == 0x0007 => DriveState::SwitchedOn,
            state => state,
        };
    }

    /// Advance the motion model by one exchange.
    pub fn step(&mut self) {
        let demand = self.velocity_demand();
        let delta = (demand - self.velocity).clamp(-VELOCITY_RAMP, VELOCITY_RAMP);
        self.velocity += delta;
        self.position = self.position.wrapping_add(self.velocity);
        self.timestamp = self.timestamp.wrapping_add(1);
    }

    /// Telemetry for the input record.
    pub fn inputs(&self) -> DriveInputs {
        DriveInputs {
            status_word: self.state.status_word(),
            op_mode_display: self.op_mode,
            position_value: self.position,
            velocity_value: self.velocity,
            timestamp: self.timestamp,
            position_demand: self.position,
            velocity_demand: self.velocity_demand(),
            ..DriveInputs::default()
        }
    }

    fn velocity_demand(&self) -> i32 {
        if self.state == DriveState::OperationEnabled && self.op_mode == OP_MODE_CSV {
            self.target_velocity
        } else {
            0
        }
    }
}

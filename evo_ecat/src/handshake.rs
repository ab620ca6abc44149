//! Drive power-up handshake.
//!
//! Evaluated once per trustworthy cycle. The drive state is recomputed from
//! the latest status word every time; the only state carried between cycles
//! is whether the mode of operation has been written. Commands persist in
//! the output image until overwritten.

use evo_common::drive::cia402::{DriveCommand, DriveState, classify};
use evo_common::drive::pdo::{
    self, OUTPUT_SIZE, PdoError, write_control_word, write_op_mode, write_target_velocity,
};
use evo_common::fieldbus::config::DriveConfig;
use tracing::{debug, info};

/// What one handshake step observed and wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeStep {
    /// Raw status word read from the input record.
    pub status_word: u16,
    /// Drive state derived from it.
    pub state: DriveState,
    /// Command written this cycle, `None` when the state has no master action.
    pub command: Option<DriveCommand>,
    /// The mode of operation was written this cycle.
    pub op_mode_written: bool,
}

/// CiA-402 enable sequence driven purely by the observed status word.
#[derive(Debug, Clone)]
pub struct DriveHandshake {
    op_mode: i8,
    target_velocity: i32,
    op_mode_written: bool,
    last_state: Option<DriveState>,
}

impl DriveHandshake {
    /// New handshake writing `op_mode` once and `target_velocity` once enabled.
    pub const fn new(op_mode: i8, target_velocity: i32) -> Self {
        Self {
            op_mode,
            target_velocity,
            op_mode_written: false,
            last_state: None,
        }
    }

    /// Handshake configured from the `[drive]` section.
    pub const fn from_config(config: &DriveConfig) -> Self {
        Self::new(config.op_mode, config.target_velocity)
    }

    /// Run one step against the drive's input and output records.
    ///
    /// Must only be called for cycles whose work counter met the expected value.
    /// At most one command is written per call.
    pub fn step(&mut self, inputs: &[u8], outputs: &mut [u8]) -> Result<HandshakeStep, PdoError> {
        let status_word = pdo::read_status_word(inputs)?;
        if outputs.len() < OUTPUT_SIZE {
            return Err(PdoError::TooShort {
                actual: outputs.len(),
                required: OUTPUT_SIZE,
            });
        }

        let mut op_mode_written = false;
        if !self.op_mode_written {
            write_op_mode(outputs, self.op_mode)?;
            self.op_mode_written = true;
            op_mode_written = true;
            info!("Mode of operation set to {}", self.op_mode);
        }

        let state = classify(status_word);
        let command = DriveCommand::for_state(state);
        match command {
            Some(DriveCommand::Control(cw)) => write_control_word(outputs, cw.bits())?,
            Some(DriveCommand::TargetVelocity) => {
                write_target_velocity(outputs, self.target_velocity)?
            }
            None => {}
        }

        if self.last_state != Some(state) {
            if state.is_modeled() {
                info!("Drive state {:?} (statusword {:#06x})", state, status_word);
            } else {
                debug!(
                    "Drive in unmodeled state {:?} (statusword {:#06x}), no command issued",
                    state, status_word
                );
            }
            self.last_state = Some(state);
        }

        Ok(HandshakeStep {
            status_word,
            state,
            command,
            op_mode_written,
        })
    }

    /// State seen on the last step.
    pub fn last_state(&self) -> Option<DriveState> {
        self.last_state
    }

    /// Mode of operation has been written.
    pub fn op_mode_written(&self) -> bool {
        self.op_mode_written
    }
}

//! Process-data layout of a SOMANET v4.2 drive in CSV configuration.
//!
//! EtherCAT process data is packed and little-endian. The master only
//! writes three output fields (ControlWord, OpMode, TargetVelocity); the
//! field writers below touch exactly those bytes and leave the rest of the
//! output record unchanged.
//!
//! ## Input record (device → master, 55 bytes)
//!
//! | Offset | Field | Type |
//! |--------|-------|------|
//! | 0 | StatusWord | u16 |
//! | 2 | OpModeDisplay | i8 |
//! | 3 | PositionValue | i32 |
//! | 7 | VelocityValue | i32 |
//! | 11 | TorqueValue | i16 |
//! | 13..41 | secondary feedback, analog/digital inputs, tuning, user MISO | |
//! | 41 | Timestamp | u32 |
//! | 45 | PositionDemandInternalValue | i32 |
//! | 49 | VelocityDemandValue | i32 |
//! | 53 | TorqueDemand | i16 |
//!
//! ## Output record (master → device, 31 bytes)
//!
//! | Offset | Field | Type |
//! |--------|-------|------|
//! | 0 | ControlWord | u16 |
//! | 2 | OpMode | i8 |
//! | 3 | TargetTorque | i16 |
//! | 5 | TargetPosition | i32 |
//! | 9 | TargetVelocity | i32 |
//! | 13..31 | torque offset, tuning, digital outputs, user MOSI, velocity offset | |

use static_assertions::const_assert_eq;
use thiserror::Error;

/// Size of the input record in bytes.
pub const INPUT_SIZE: usize = 55;

/// Size of the output record in bytes.
pub const OUTPUT_SIZE: usize = 31;

/// Input record offsets.
pub mod input {
    #![allow(missing_docs)]
    pub const STATUS_WORD: usize = 0;
    pub const OP_MODE_DISPLAY: usize = 2;
    pub const POSITION_VALUE: usize = 3;
    pub const VELOCITY_VALUE: usize = 7;
    pub const TORQUE_VALUE: usize = 11;
    pub const SEC_POSITION_VALUE: usize = 13;
    pub const SEC_VELOCITY_VALUE: usize = 17;
    pub const ANALOG_INPUT: usize = 21;
    pub const TUNING_STATUS: usize = 29;
    pub const DIGITAL_INPUT: usize = 33;
    pub const USER_MISO: usize = 37;
    pub const TIMESTAMP: usize = 41;
    pub const POSITION_DEMAND: usize = 45;
    pub const VELOCITY_DEMAND: usize = 49;
    pub const TORQUE_DEMAND: usize = 53;
}

/// Output record offsets.
pub mod output {
    #![allow(missing_docs)]
    pub const CONTROL_WORD: usize = 0;
    pub const OP_MODE: usize = 2;
    pub const TARGET_TORQUE: usize = 3;
    pub const TARGET_POSITION: usize = 5;
    pub const TARGET_VELOCITY: usize = 9;
    pub const TORQUE_OFFSET: usize = 13;
    pub const TUNING_COMMAND: usize = 15;
    pub const DIGITAL_OUTPUT: usize = 19;
    pub const USER_MOSI: usize = 23;
    pub const VELOCITY_OFFSET: usize = 27;
}

const_assert_eq!(input::TORQUE_DEMAND + 2, INPUT_SIZE);
const_assert_eq!(output::VELOCITY_OFFSET + 4, OUTPUT_SIZE);

/// Process-data access errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PdoError {
    /// Buffer shorter than the record.
    #[error("process data record too short: {actual} bytes, need {required}")]
    TooShort {
        /// Bytes available.
        actual: usize,
        /// Bytes required.
        required: usize,
    },
}

fn check_len(buf: &[u8], required: usize) -> Result<(), PdoError> {
    if buf.len() < required {
        return Err(PdoError::TooShort {
            actual: buf.len(),
            required,
        });
    }
    Ok(())
}

#[inline]
fn get<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

#[inline]
fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

/// Decoded input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveInputs {
    pub status_word: u16,
    pub op_mode_display: i8,
    pub position_value: i32,
    pub velocity_value: i32,
    pub torque_value: i16,
    pub sec_position_value: i32,
    pub sec_velocity_value: i32,
    pub analog_inputs: [i16; 4],
    pub tuning_status: i32,
    pub digital_inputs: [i8; 4],
    pub user_miso: i32,
    pub timestamp: u32,
    pub position_demand: i32,
    pub velocity_demand: i32,
    pub torque_demand: i16,
}

impl DriveInputs {
    /// Decode an input record.
    pub fn decode(buf: &[u8]) -> Result<Self, PdoError> {
        use input::*;
        check_len(buf, INPUT_SIZE)?;
        let mut analog_inputs = [0i16; 4];
        for (i, ai) in analog_inputs.iter_mut().enumerate() {
            *ai = i16::from_le_bytes(get(buf, ANALOG_INPUT + 2 * i));
        }
        let mut digital_inputs = [0i8; 4];
        for (i, di) in digital_inputs.iter_mut().enumerate() {
            *di = buf[DIGITAL_INPUT + i] as i8;
        }
        Ok(Self {
            status_word: u16::from_le_bytes(get(buf, STATUS_WORD)),
            op_mode_display: buf[OP_MODE_DISPLAY] as i8,
            position_value: i32::from_le_bytes(get(buf, POSITION_VALUE)),
            velocity_value: i32::from_le_bytes(get(buf, VELOCITY_VALUE)),
            torque_value: i16::from_le_bytes(get(buf, TORQUE_VALUE)),
            sec_position_value: i32::from_le_bytes(get(buf, SEC_POSITION_VALUE)),
            sec_velocity_value: i32::from_le_bytes(get(buf, SEC_VELOCITY_VALUE)),
            analog_inputs,
            tuning_status: i32::from_le_bytes(get(buf, TUNING_STATUS)),
            digital_inputs,
            user_miso: i32::from_le_bytes(get(buf, USER_MISO)),
            timestamp: u32::from_le_bytes(get(buf, TIMESTAMP)),
            position_demand: i32::from_le_bytes(get(buf, POSITION_DEMAND)),
            velocity_demand: i32::from_le_bytes(get(buf, VELOCITY_DEMAND)),
            torque_demand: i16::from_le_bytes(get(buf, TORQUE_DEMAND)),
        })
    }

    /// Encode into an input record (device side).
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), PdoError> {
        use input::*;
        check_len(buf, INPUT_SIZE)?;
        put(buf, STATUS_WORD, &self.status_word.to_le_bytes());
        buf[OP_MODE_DISPLAY] = self.op_mode_display as u8;
        put(buf, POSITION_VALUE, &self.position_value.to_le_bytes());
        put(buf, VELOCITY_VALUE, &self.velocity_value.to_le_bytes());
        put(buf, TORQUE_VALUE, &self.torque_value.to_le_bytes());
        put(buf, SEC_POSITION_VALUE, &self.sec_position_value.to_le_bytes());
        put(buf, SEC_VELOCITY_VALUE, &self.sec_velocity_value.to_le_bytes());
        for (i, ai) in self.analog_inputs.iter().enumerate() {
            put(buf, ANALOG_INPUT + 2 * i, &ai.to_le_bytes());
        }
        put(buf, TUNING_STATUS, &self.tuning_status.to_le_bytes());
        for (i, di) in self.digital_inputs.iter().enumerate() {
            buf[DIGITAL_INPUT + i] = *di as u8;
        }
        put(buf, USER_MISO, &self.user_miso.to_le_bytes());
        put(buf, TIMESTAMP, &self.timestamp.to_le_bytes());
        put(buf, POSITION_DEMAND, &self.position_demand.to_le_bytes());
        put(buf, VELOCITY_DEMAND, &self.velocity_demand.to_le_bytes());
        put(buf, TORQUE_DEMAND, &self.torque_demand.to_le_bytes());
        Ok(())
    }
}

/// Read only the status word of an input record.
#[inline]
pub fn read_status_word(inputs: &[u8]) -> Result<u16, PdoError> {
    check_len(inputs, input::STATUS_WORD + 2)?;
    Ok(u16::from_le_bytes(get(inputs, input::STATUS_WORD)))
}

/// Decoded output record, as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveOutputs {
    pub control_word: u16,
    pub op_mode: i8,
    pub target_torque: i16,
    pub target_position: i32,
    pub target_velocity: i32,
    pub torque_offset: i16,
    pub tuning_command: i32,
    pub digital_outputs: [i8; 4],
    pub user_mosi: i32,
    pub velocity_offset: i32,
}

impl DriveOutputs {
    /// Decode an output record.
    pub fn decode(buf: &[u8]) -> Result<Self, PdoError> {
        use output::*;
        check_len(buf, OUTPUT_SIZE)?;
        let mut digital_outputs = [0i8; 4];
        for (i, d) in digital_outputs.iter_mut().enumerate() {
            *d = buf[DIGITAL_OUTPUT + i] as i8;
        }
        Ok(Self {
            control_word: u16::from_le_bytes(get(buf, CONTROL_WORD)),
            op_mode: buf[OP_MODE] as i8,
            target_torque: i16::from_le_bytes(get(buf, TARGET_TORQUE)),
            target_position: i32::from_le_bytes(get(buf, TARGET_POSITION)),
            target_velocity: i32::from_le_bytes(get(buf, TARGET_VELOCITY)),
            torque_offset: i16::from_le_bytes(get(buf, TORQUE_OFFSET)),
            tuning_command: i32::from_le_bytes(get(buf, TUNING_COMMAND)),
            digital_outputs,
            user_mosi: i32::from_le_bytes(get(buf, USER_MOSI)),
            velocity_offset: i32::from_le_bytes(get(buf, VELOCITY_OFFSET)),
        })
    }
}

/// Write the control word of an output record.
#[inline]
pub fn write_control_word(outputs: &mut [u8], control_word: u16) -> Result<(), PdoError> {
    check_len(outputs, output::CONTROL_WORD + 2)?;
    put(outputs, output::CONTROL_WORD, &control_word.to_le_bytes());
    Ok(())
}

/// Write the mode of operation of an output record.
#[inline]
pub fn write_op_mode(outputs: &mut [u8], op_mode: i8) -> Result<(), PdoError> {
    check_len(outputs, output::OP_MODE + 1)?;
    outputs[output::OP_MODE] = op_mode as u8;
    Ok(())
}

/// Write the target velocity of an output record.
#[inline]
pub fn write_target_velocity(outputs: &mut [u8], velocity: i32) -> Result<(), PdoError> {
    check_len(outputs, output::TARGET_VELOCITY + 4)?;
    put(outputs, output::TARGET_VELOCITY, &velocity.to_le_bytes());
    Ok(())
}

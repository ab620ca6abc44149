//! Application-layer (AL) device states and per-device supervision records.
//!
//! The AL state register of an EtherCAT device carries the state in the low
//! nibble and an error indication in bit 4. A master acknowledges an error by
//! writing the requested state with the same bit set, so `SAFE_OP + ERROR`
//! and `SAFE_OP + ACK` share the raw value `0x14`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw error / acknowledge bit of the AL state register.
pub const AL_ERROR_BIT: u16 = 0x10;

/// AL state of a device, without the error bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlState {
    /// No valid state could be read (device unresponsive or absent).
    None = 0x00,
    /// Init.
    Init = 0x01,
    /// Pre-operational: mailbox communication only.
    PreOp = 0x02,
    /// Bootstrap (firmware update).
    Boot = 0x03,
    /// Safe-operational: inputs valid, outputs held in a safe state.
    SafeOp = 0x04,
    /// Operational: inputs and outputs valid.
    Operational = 0x08,
}

impl AlState {
    /// Convert from the low nibble of a raw AL state value.
    /// Returns `None` for values that are not a defined state.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::None),
            0x01 => Some(Self::Init),
            0x02 => Some(Self::PreOp),
            0x03 => Some(Self::Boot),
            0x04 => Some(Self::SafeOp),
            0x08 => Some(Self::Operational),
            _ => None,
        }
    }

    /// Short upper-case name as used in device logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Init => "INIT",
            Self::PreOp => "PRE_OP",
            Self::Boot => "BOOT",
            Self::SafeOp => "SAFE_OP",
            Self::Operational => "OPERATIONAL",
        }
    }
}

impl Default for AlState {
    fn default() -> Self {
        Self::None
    }
}

/// Observed (or requested) AL state including the error / acknowledge bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceState {
    /// State part.
    pub al: AlState,
    /// Error indication (observed) or error acknowledge (requested).
    pub error: bool,
}

impl DeviceState {
    /// Unresponsive device.
    pub const NONE: Self = Self::new(AlState::None);
    /// Init.
    pub const INIT: Self = Self::new(AlState::Init);
    /// Pre-operational.
    pub const PRE_OP: Self = Self::new(AlState::PreOp);
    /// Safe-operational.
    pub const SAFE_OP: Self = Self::new(AlState::SafeOp);
    /// Safe-operational with the error bit set.
    pub const SAFE_OP_ERROR: Self = Self::with_error(AlState::SafeOp);
    /// Request: leave SAFE-OP error by acknowledging it. Same raw value as [`Self::SAFE_OP_ERROR`].
    pub const SAFE_OP_ACK: Self = Self::with_error(AlState::SafeOp);
    /// Operational.
    pub const OPERATIONAL: Self = Self::new(AlState::Operational);

    /// State without error indication.
    pub const fn new(al: AlState) -> Self {
        Self { al, error: false }
    }

    /// State with the error / acknowledge bit set.
    pub const fn with_error(al: AlState) -> Self {
        Self { al, error: true }
    }

    /// Decode a raw AL state register value.
    ///
    /// Undefined state nibbles decode as [`AlState::None`].
    pub const fn from_raw(raw: u16) -> Self {
        let al = match AlState::from_u8((raw & 0x0F) as u8) {
            Some(al) => al,
            None => AlState::None,
        };
        Self {
            al,
            error: raw & AL_ERROR_BIT != 0,
        }
    }

    /// Raw AL state register value.
    pub const fn raw(self) -> u16 {
        let bit = if self.error { AL_ERROR_BIT } else { 0 };
        self.al as u16 | bit
    }

    /// Device answered with a real state.
    #[inline]
    pub const fn is_present(self) -> bool {
        !matches!(self.al, AlState::None)
    }

    /// Fully operational, no error.
    #[inline]
    pub const fn is_operational(self) -> bool {
        matches!(self.al, AlState::Operational) && !self.error
    }
}

impl From<AlState> for DeviceState {
    fn from(al: AlState) -> Self {
        Self::new(al)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error {
            write!(f, "{} + ERROR", self.al.as_str())
        } else {
            f.write_str(self.al.as_str())
        }
    }
}

/// Supervision record of one discovered device.
///
/// Owned by the network supervisor; the orchestrator reads it only for the
/// end-of-run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// 1-based position on the segment, stable for the session.
    pub index: u16,
    /// Last state read back from the device.
    pub state: DeviceState,
    /// Last AL status code read back from the device.
    pub al_status_code: u16,
    /// Device could not be reached on repeated checks.
    pub lost: bool,
    /// Process-data group the device belongs to.
    pub group: u8,
}

impl DeviceRecord {
    /// Fresh record for a device found during discovery.
    pub const fn new(index: u16, group: u8) -> Self {
        Self {
            index,
            state: DeviceState::INIT,
            al_status_code: 0,
            lost: false,
            group,
        }
    }
}

/// Health flag of one process-data group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupHealth {
    /// Set when any device of the group may not be OPERATIONAL;
    /// cleared by the supervisor once a full scan finds every device healthy.
    pub needs_state_check: bool,
}

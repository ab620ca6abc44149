//! CiA-402 status word decoding and power-up command selection.
//!
//! [`classify`] maps a raw status word to a [`DriveState`] by testing the
//! masks of the device state diagram in a fixed priority order; the first
//! match wins. [`DriveCommand::for_state`] maps that state to the single
//! master action of the enable sequence:
//!
//! ```text
//! Fault ──0x80──► SwitchOnDisabled ──0x06──► ReadyToSwitchOn
//!   ──0x07──► SwitchedOn ──0x0F──► OperationEnabled ──► TargetVelocity
//! ```
//!
//! Both functions are pure so they can be tested independently from the
//! cyclic loop.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Status word (object 0x6041) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        /// Ready to switch on.
        const READY_TO_SWITCH_ON = 0x0001;
        /// Switched on.
        const SWITCHED_ON        = 0x0002;
        /// Operation enabled.
        const OPERATION_ENABLED  = 0x0004;
        /// Fault.
        const FAULT              = 0x0008;
        /// Voltage enabled.
        const VOLTAGE_ENABLED    = 0x0010;
        /// Quick stop (active low).
        const QUICK_STOP         = 0x0020;
        /// Switch on disabled.
        const SWITCH_ON_DISABLED = 0x0040;
        /// Warning.
        const WARNING            = 0x0080;
        /// Remote: controlled through the fieldbus.
        const REMOTE             = 0x0200;
        /// Target reached.
        const TARGET_REACHED     = 0x0400;
        /// Internal limit active.
        const INTERNAL_LIMIT     = 0x0800;
    }
}

bitflags! {
    /// Control word (object 0x6040) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlWord: u16 {
        /// Switch on.
        const SWITCH_ON        = 0x0001;
        /// Enable voltage.
        const ENABLE_VOLTAGE   = 0x0002;
        /// Quick stop (active low).
        const QUICK_STOP       = 0x0004;
        /// Enable operation.
        const ENABLE_OPERATION = 0x0008;
        /// Fault reset (rising edge).
        const FAULT_RESET      = 0x0080;
        /// Halt.
        const HALT             = 0x0100;
    }
}

impl ControlWord {
    /// Fault → Switch On Disabled.
    pub const FAULT_RESET_CMD: Self = Self::from_bits_retain(0b1000_0000);
    /// Switch On Disabled → Ready To Switch On.
    pub const SHUTDOWN: Self = Self::from_bits_retain(0b0000_0110);
    /// Ready To Switch On → Switched On.
    pub const SWITCH_ON_CMD: Self = Self::from_bits_retain(0b0000_0111);
    /// Switched On → Operation Enabled.
    pub const ENABLE_OPERATION_CMD: Self = Self::from_bits_retain(0b0000_1111);
}

impl Default for ControlWord {
    fn default() -> Self {
        Self::empty()
    }
}

/// Drive state derived from the status word every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DriveState {
    /// Fault.
    Fault = 0,
    /// Switch on disabled.
    SwitchOnDisabled = 1,
    /// Ready to switch on.
    ReadyToSwitchOn = 2,
    /// Switched on.
    SwitchedOn = 3,
    /// Operation enabled.
    OperationEnabled = 4,
    /// Not ready to switch on (drive self-test). No master action.
    NotReadyToSwitchOn = 5,
    /// Quick stop active. No master action.
    QuickStopActive = 6,
    /// Fault reaction active. No master action.
    FaultReactionActive = 7,
    /// Bit pattern outside the state diagram.
    Unknown = 8,
}

/// Mask over the state bits that do not depend on quick stop.
pub const STATE_MASK: u16 = 0b0000_0000_0100_1111;

/// Mask over the state bits including quick stop.
pub const STATE_MASK_QUICK_STOP: u16 = 0b0000_0000_0110_1111;

/// Ordered (state, mask, value) table. The first five entries are the
/// handshake; the remainder are recognised for diagnostics only.
pub const STATE_PATTERNS: [(DriveState, u16, u16); 8] = [
    (DriveState::Fault, STATE_MASK, 0b0000_0000_0000_1000),
    (DriveState::SwitchOnDisabled, STATE_MASK, 0b0000_0000_0100_0000),
    (DriveState::ReadyToSwitchOn, STATE_MASK_QUICK_STOP, 0b0000_0000_0010_0001),
    (DriveState::SwitchedOn, STATE_MASK_QUICK_STOP, 0b0000_0000_0010_0011),
    (DriveState::OperationEnabled, STATE_MASK_QUICK_STOP, 0b0000_0000_0010_0111),
    (DriveState::NotReadyToSwitchOn, STATE_MASK, 0b0000_0000_0000_0000),
    (DriveState::QuickStopActive, STATE_MASK_QUICK_STOP, 0b0000_0000_0000_0111),
    (DriveState::FaultReactionActive, STATE_MASK, 0b0000_0000_0000_1111),
];

/// Classify a raw status word. First matching pattern wins.
#[inline]
pub fn classify(status_word: u16) -> DriveState {
    STATE_PATTERNS
        .iter()
        .find(|(_, mask, value)| status_word & mask == *value)
        .map_or(DriveState::Unknown, |(state, _, _)| *state)
}

impl DriveState {
    /// State is part of the power-up handshake.
    #[inline]
    pub const fn is_modeled(self) -> bool {
        matches!(
            self,
            Self::Fault
                | Self::SwitchOnDisabled
                | Self::ReadyToSwitchOn
                | Self::SwitchedOn
                | Self::OperationEnabled
        )
    }

    /// Canonical status word of this state (as reported by a remote-controlled drive).
    pub const fn status_word(self) -> u16 {
        let bits = match self {
            Self::Fault => 0x0008,
            Self::SwitchOnDisabled => 0x0040,
            Self::ReadyToSwitchOn => 0x0021,
            Self::SwitchedOn => 0x0023,
            Self::OperationEnabled => 0x0027,
            Self::NotReadyToSwitchOn => 0x0000,
            Self::QuickStopActive => 0x0007,
            Self::FaultReactionActive => 0x000F,
            Self::Unknown => 0x0001,
        };
        bits | StatusWord::REMOTE.bits()
    }
}

/// Master action selected for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveCommand {
    /// Write this control word.
    Control(ControlWord),
    /// Write the configured target velocity.
    TargetVelocity,
}

impl DriveCommand {
    /// Next command of the enable sequence, `None` for states without a master action.
    pub const fn for_state(state: DriveState) -> Option<Self> {
        match state {
            DriveState::Fault => Some(Self::Control(ControlWord::FAULT_RESET_CMD)),
            DriveState::SwitchOnDisabled => Some(Self::Control(ControlWord::SHUTDOWN)),
            DriveState::ReadyToSwitchOn => Some(Self::Control(ControlWord::SWITCH_ON_CMD)),
            DriveState::SwitchedOn => Some(Self::Control(ControlWord::ENABLE_OPERATION_CMD)),
            DriveState::OperationEnabled => Some(Self::TargetVelocity),
            DriveState::NotReadyToSwitchOn
            | DriveState::QuickStopActive
            | DriveState::FaultReactionActive
            | DriveState::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straight if / else-if chain over the five handshake patterns.
    fn reference_chain(sw: u16) -> Option<u16> {
        if sw & 0b0000000001001111 == 0b0000000000001000 {
            Some(0b10000000)
        } else if sw & 0b0000000001001111 == 0b0000000001000000 {
            Some(0b00000110)
        } else if sw & 0b0000000001101111 == 0b0000000000100001 {
            Some(0b00000111)
        } else if sw & 0b0000000001101111 == 0b0000000000100011 {
            Some(0b00001111)
        } else if sw & 0b0000000001101111 == 0b0000000000100111 {
            Some(u16::MAX)
        } else {
            None
        }
    }

    fn encode(cmd: Option<DriveCommand>) -> Option<u16> {
        cmd.map(|c| match c {
            DriveCommand::Control(cw) => cw.bits(),
            DriveCommand::TargetVelocity => u16::MAX,
        })
    }

    #[test]
    fn classify_matches_reference_chain_for_every_status_word() {
        for sw in 0..=u16::MAX {
            let state = classify(sw);
            assert_eq!(
                encode(DriveCommand::for_state(state)),
                reference_chain(sw),
                "status word {sw:#06x} classified as {state:?}"
            );
        }
    }

    #[test]
    fn first_matching_pattern_wins() {
        for sw in 0..=u16::MAX {
            let first = STATE_PATTERNS
                .iter()
                .position(|(_, mask, value)| sw & mask == *value);
            let state = classify(sw);
            match first {
                Some(i) => assert_eq!(state, STATE_PATTERNS[i].0),
                None => assert_eq!(state, DriveState::Unknown),
            }
        }
    }

    #[test]
    fn switch_on_disabled_gives_shutdown() {
        let state = classify(0x0040);
        assert_eq!(state, DriveState::SwitchOnDisabled);
        assert_eq!(
            DriveCommand::for_state(state),
            Some(DriveCommand::Control(ControlWord::SHUTDOWN))
        );
        assert_eq!(ControlWord::SHUTDOWN.bits(), 0b0000_0110);
    }

    #[test]
    fn ready_to_switch_on_gives_switch_on() {
        assert_eq!(0x0021 & STATE_MASK_QUICK_STOP, 0b0000_0000_0010_0001);
        let state = classify(0x0021);
        assert_eq!(state, DriveState::ReadyToSwitchOn);
        assert_eq!(
            DriveCommand::for_state(state),
            Some(DriveCommand::Control(ControlWord::SWITCH_ON_CMD))
        );
    }

    #[test]
    fn high_bits_do_not_affect_state() {
        let sw = 0x0027 | StatusWord::REMOTE.bits() | StatusWord::TARGET_REACHED.bits();
        assert_eq!(classify(sw), DriveState::OperationEnabled);
        assert_eq!(classify(0x0008 | 0x0080), DriveState::Fault);
    }

    #[test]
    fn unmodeled_states_have_no_command() {
        assert_eq!(classify(0x0000), DriveState::NotReadyToSwitchOn);
        assert_eq!(classify(0x0007), DriveState::QuickStopActive);
        assert_eq!(classify(0x000F), DriveState::FaultReactionActive);
        assert_eq!(classify(0x0001), DriveState::Unknown);
        for state in [
            DriveState::NotReadyToSwitchOn,
            DriveState::QuickStopActive,
            DriveState::FaultReactionActive,
            DriveState::Unknown,
        ] {
            assert!(!state.is_modeled());
            assert_eq!(DriveCommand::for_state(state), None);
        }
    }

    #[test]
    fn canonical_status_words_round_trip_through_classify() {
        for (state, _, _) in STATE_PATTERNS {
            assert_eq!(classify(state.status_word()), state);
        }
        assert_eq!(classify(DriveState::Unknown.status_word()), DriveState::Unknown);
    }
}

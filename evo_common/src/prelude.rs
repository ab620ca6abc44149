//! Prelude module for common re-exports.
//!
//! # Usage
//!
//! ```rust
//! use evo_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, load_master_config};
pub use crate::fieldbus::config::{
    CycleConfig, DriveConfig, MasterConfig, SimulationConfig, SupervisorConfig, TransportConfig,
};

// ─── Fieldbus ───────────────────────────────────────────────────────
pub use crate::fieldbus::al_status::describe_al_status;
pub use crate::fieldbus::state::{AlState, DeviceRecord, DeviceState, GroupHealth};
pub use crate::fieldbus::transport::{
    DeviceSlice, DeviceStatus, Exchange, Fieldbus, FieldbusError, GroupLayout,
    ProcessImageLayout, Target, TransportFactory, WorkCounter,
};

// ─── Drive ──────────────────────────────────────────────────────────
pub use crate::drive::cia402::{ControlWord, DriveCommand, DriveState, StatusWord, classify};
pub use crate::drive::pdo::{DriveInputs, DriveOutputs, PdoError};

//! Master configuration types.
//!
//! This module contains the configuration loaded from an optional
//! `ecat.toml`:
//! - `MasterConfig` - Root, one table per concern
//! - `CycleConfig` - Startup sequence and cyclic loop
//! - `SupervisorConfig` - Network state supervision
//! - `DriveConfig` - Drive handshake parameters
//! - `SimulationConfig` - Simulation transport and fault injection
//!
//! Every field is optional; an empty file (or no file) yields the defaults
//! in [`crate::consts`].
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "evo-ecat-bench"
//!
//! [cycle]
//! cycle_count = 2000
//! cycle_interval_us = 1000
//!
//! [simulation]
//! devices = 2
//! fault_after_cycles = 500
//! ```

use crate::config::{ConfigError, LogLevel, SharedConfig};
use crate::consts::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_shared() -> SharedConfig {
    SharedConfig {
        log_level: LogLevel::Info,
        service_name: ECAT_SERVICE_NAME.to_string(),
    }
}

fn default_driver() -> String {
    DEFAULT_TRANSPORT.to_string()
}

/// Root configuration of the EtherCAT master.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterConfig {
    /// Logging level and service name.
    #[serde(default = "default_shared")]
    pub shared: SharedConfig,

    /// Transport selection.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Startup sequence and cyclic loop.
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Network state supervision.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Drive handshake.
    #[serde(default)]
    pub drive: DriveConfig,

    /// Simulation transport.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            shared: default_shared(),
            transport: TransportConfig::default(),
            cycle: CycleConfig::default(),
            supervisor: SupervisorConfig::default(),
            drive: DriveConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl MasterConfig {
    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` not empty
    /// 2. `transport.driver` not empty
    /// 3. `cycle.cycle_count` > 0
    /// 4. `cycle.op_request_retries` > 0
    /// 5. `supervisor.interval_us` > 0
    /// 6. `drive.device` >= 1
    /// 7. `simulation.devices` <= MAX_DEVICES
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.transport.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.driver cannot be empty".to_string(),
            ));
        }

        if self.cycle.cycle_count == 0 {
            return Err(ConfigError::ValidationError(
                "cycle.cycle_count must be greater than 0".to_string(),
            ));
        }

        if self.cycle.op_request_retries == 0 {
            return Err(ConfigError::ValidationError(
                "cycle.op_request_retries must be greater than 0".to_string(),
            ));
        }

        if self.supervisor.interval_us == 0 {
            return Err(ConfigError::ValidationError(
                "supervisor.interval_us must be greater than 0".to_string(),
            ));
        }

        if self.drive.device == 0 {
            return Err(ConfigError::ValidationError(
                "drive.device is 1-based and must be at least 1".to_string(),
            ));
        }

        if self.simulation.devices as usize > MAX_DEVICES {
            return Err(ConfigError::ValidationError(format!(
                "Too many simulated devices: {} (max {})",
                self.simulation.devices, MAX_DEVICES
            )));
        }

        Ok(())
    }
}

/// Transport selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Registered transport name.
    #[serde(default = "default_driver")]
    pub driver: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
        }
    }
}

/// Startup sequence and cyclic loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CycleConfig {
    /// Cycles to run once OPERATIONAL.
    pub cycle_count: u64,
    /// Fixed sleep between cycles [µs]. Open-loop: not reduced by exchange time.
    pub cycle_interval_us: u64,
    /// Receive timeout of one exchange [µs].
    pub receive_timeout_us: u64,
    /// Per-transition state timeout [µs]. The SAFE-OP wait uses four times this value.
    pub state_timeout_us: u64,
    /// Exchange + re-check rounds while requesting OPERATIONAL.
    pub op_request_retries: u32,
    /// Bounded wait of each OPERATIONAL re-check [µs].
    pub op_check_timeout_us: u64,
    /// Process-data group driven by the loop.
    pub group: u8,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_count: CYCLE_COUNT,
            cycle_interval_us: CYCLE_INTERVAL_US,
            receive_timeout_us: RECEIVE_TIMEOUT_US,
            state_timeout_us: STATE_TIMEOUT_US,
            op_request_retries: OP_REQUEST_RETRIES,
            op_check_timeout_us: OP_CHECK_TIMEOUT_US,
            group: 0,
        }
    }
}

impl CycleConfig {
    /// Inter-cycle sleep.
    pub const fn cycle_interval(&self) -> Duration {
        Duration::from_micros(self.cycle_interval_us)
    }

    /// Receive timeout.
    pub const fn receive_timeout(&self) -> Duration {
        Duration::from_micros(self.receive_timeout_us)
    }

    /// Bounded wait for all devices to reach SAFE-OP after mapping.
    pub const fn safe_op_timeout(&self) -> Duration {
        Duration::from_micros(self.state_timeout_us * SAFE_OP_TIMEOUT_FACTOR)
    }

    /// Bounded wait of each OPERATIONAL re-check.
    pub const fn op_check_timeout(&self) -> Duration {
        Duration::from_micros(self.op_check_timeout_us)
    }
}

/// Network state supervision parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Polling interval [µs].
    pub interval_us: u64,
    /// Timeout of reconfiguration and recovery calls [µs].
    pub monitor_timeout_us: u64,
    /// Bounded wait when re-checking an unresponsive device [µs].
    pub recheck_timeout_us: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval_us: SUPERVISOR_INTERVAL_US,
            monitor_timeout_us: MONITOR_TIMEOUT_US,
            recheck_timeout_us: RECEIVE_TIMEOUT_US,
        }
    }
}

impl SupervisorConfig {
    /// Polling interval.
    pub const fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us)
    }

    /// Timeout of reconfiguration and recovery calls.
    pub const fn monitor_timeout(&self) -> Duration {
        Duration::from_micros(self.monitor_timeout_us)
    }

    /// Bounded re-check wait.
    pub const fn recheck_timeout(&self) -> Duration {
        Duration::from_micros(self.recheck_timeout_us)
    }
}

/// Drive handshake parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    /// 1-based index of the servo drive on the segment.
    pub device: u16,
    /// Mode of operation written on the first trustworthy cycle.
    pub op_mode: i8,
    /// Velocity demand once operation is enabled [raw units].
    pub target_velocity: i32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            device: 1,
            op_mode: OP_MODE_CSV,
            target_velocity: TARGET_VELOCITY,
        }
    }
}

/// Simulation transport and fault injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of simulated SOMANET drives on the segment.
    pub devices: u16,
    /// Drive starts in CiA-402 Fault.
    pub start_in_fault: bool,
    /// Device affected by injected faults (1-based).
    pub fault_device: u16,
    /// Drop `fault_device` to SAFE-OP + ERROR after this many OPERATIONAL exchanges.
    pub fault_after_cycles: Option<u64>,
    /// Make `fault_device` unresponsive after this many OPERATIONAL exchanges.
    pub lose_after_cycles: Option<u64>,
    /// Recovery calls needed before a lost device answers again.
    pub recover_attempts: u32,
    /// Interface names that fail to bind.
    pub unavailable_interfaces: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            devices: 1,
            start_in_fault: false,
            fault_device: 1,
            fault_after_cycles: None,
            lose_after_cycles: None,
            recover_attempts: 1,
            unavailable_interfaces: Vec::new(),
        }
    }
}

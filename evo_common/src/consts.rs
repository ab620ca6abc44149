//! System-wide constants for the EVO EtherCAT master.
//!
//! Single source of truth for fieldbus timeouts and cyclic defaults.
//! Every configuration field in [`crate::fieldbus::config`] defaults to one
//! of these values.

/// Timeout for one process-data round trip [µs].
pub const RECEIVE_TIMEOUT_US: u64 = 2_000;

/// Timeout for a single AL state transition [µs].
pub const STATE_TIMEOUT_US: u64 = 2_000_000;

/// Multiplier applied to [`STATE_TIMEOUT_US`] while waiting for SAFE-OP after mapping.
pub const SAFE_OP_TIMEOUT_FACTOR: u64 = 4;

/// Timeout for supervisor reconfiguration and recovery calls [µs].
pub const MONITOR_TIMEOUT_US: u64 = 500;

/// Number of exchange + re-check rounds while requesting OPERATIONAL.
pub const OP_REQUEST_RETRIES: u32 = 200;

/// Bounded wait of each OPERATIONAL re-check [µs].
pub const OP_CHECK_TIMEOUT_US: u64 = 50_000;

/// Number of cyclic exchanges once OPERATIONAL.
pub const CYCLE_COUNT: u64 = 10_000;

/// Fixed sleep between cyclic exchanges [µs].
pub const CYCLE_INTERVAL_US: u64 = 5_000;

/// Supervisor polling interval [µs].
pub const SUPERVISOR_INTERVAL_US: u64 = 10_000;

/// CiA-402 mode of operation: cyclic synchronous velocity.
pub const OP_MODE_CSV: i8 = 9;

/// Velocity demand issued once the drive reports Operation Enabled [raw units].
pub const TARGET_VELOCITY: i32 = 100;

/// Maximum number of devices on one segment.
pub const MAX_DEVICES: usize = 200;

/// Default transport name.
pub const DEFAULT_TRANSPORT: &str = "simulation";

/// Canonical service name (used for logging).
pub const ECAT_SERVICE_NAME: &str = "evo-ecat";

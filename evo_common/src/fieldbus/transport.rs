//! Fieldbus transport trait and error types.
//!
//! This module defines:
//! - `Fieldbus` trait - Interface the master uses to reach the wire
//! - `FieldbusError` enum - Error types for transport operations
//! - `ProcessImageLayout` - Sizes and per-device slices of the mapped image
//! - `Exchange` - Result of one process-data round trip
//! - `TransportFactory` type alias - Factory function type

use crate::fieldbus::al_status::describe_al_status;
use crate::fieldbus::config::MasterConfig;
use crate::fieldbus::state::{AlState, DeviceState};
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;

/// Count of devices that processed the last frame.
pub type WorkCounter = u16;

/// Error types for transport operations.
#[derive(Debug, Clone, Error)]
pub enum FieldbusError {
    /// Binding to the network interface failed
    #[error("No socket connection on {0}")]
    BindFailed(String),

    /// Discovery found nothing on the segment
    #[error("No slaves found")]
    NoDevices,

    /// Operation issued before `init()` succeeded
    #[error("Transport not initialized")]
    NotInitialized,

    /// Device index outside `1..=device_count`
    #[error("Invalid device index: {0}")]
    InvalidDevice(u16),

    /// Frame level communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Transport name not registered
    #[error("Transport not found: {0}")]
    TransportNotFound(String),
}

/// Addressee of a state request or state wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Every device on the segment.
    All,
    /// One device by 1-based index.
    Device(u16),
}

/// State read back from one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    /// 1-based device index.
    pub index: u16,
    /// Reported AL state.
    pub state: DeviceState,
    /// Reported AL status code.
    pub al_status_code: u16,
    /// Process-data group.
    pub group: u8,
}

/// Byte ranges of one device inside the process image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSlice {
    /// 1-based device index.
    pub index: u16,
    /// Process-data group.
    pub group: u8,
    /// Range inside the output image.
    pub outputs: Range<usize>,
    /// Range inside the input image.
    pub inputs: Range<usize>,
}

/// Work counter contributions and segment table of one group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupLayout {
    /// Group number.
    pub group: u8,
    /// Sum of WKC contributions of output segments.
    pub outputs_wkc: u16,
    /// Sum of WKC contributions of input segments.
    pub inputs_wkc: u16,
    /// Byte size of each frame segment.
    pub segments: Vec<u32>,
}

impl GroupLayout {
    /// Work counter of a fully healthy exchange.
    ///
    /// Output segments count twice: once on write and once on read-back.
    pub const fn expected_wkc(&self) -> WorkCounter {
        self.outputs_wkc * 2 + self.inputs_wkc
    }
}

/// Process image produced by mapping.
///
/// Sizes are fixed for the lifetime of an operational session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessImageLayout {
    /// Size of the output image in bytes.
    pub output_bytes: usize,
    /// Size of the input image in bytes.
    pub input_bytes: usize,
    /// Groups in ascending group order.
    pub groups: Vec<GroupLayout>,
    /// Per-device slices in ascending index order.
    pub devices: Vec<DeviceSlice>,
}

impl ProcessImageLayout {
    /// Layout of a group.
    pub fn group(&self, group: u8) -> Option<&GroupLayout> {
        self.groups.iter().find(|g| g.group == group)
    }

    /// Slices of a device.
    pub fn device(&self, index: u16) -> Option<&DeviceSlice> {
        self.devices.iter().find(|d| d.index == index)
    }
}

/// Outcome of one send + receive pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exchange {
    /// Observed work counter; zero on receive timeout.
    pub wkc: WorkCounter,
    /// Distributed-clock system time of the frame [ns]. Diagnostics only.
    pub dc_time: i64,
    /// A device of the exchanged group reported something other than OPERATIONAL.
    pub state_check: bool,
}

/// Factory function type for creating transport instances.
pub type TransportFactory = fn(&MasterConfig) -> Box<dyn Fieldbus>;

/// Trait defining the interface between the master core and the wire.
///
/// Frame handling, topology discovery, mailbox configuration and image
/// marshalling live behind this trait. Every method takes `&self`: the
/// orchestrator and the network supervisor share one transport and call it
/// from different threads, so implementations synchronize internally.
///
/// # Lifecycle
///
/// 1. `init()` - Bind to the network interface
/// 2. `discover_and_configure()` / `map_process_data()` / `configure_distributed_clock()`
/// 3. `exchange()` - Once per cycle; state calls from any thread
/// 4. `close()` - Release the interface (idempotent)
///
/// # Timing Contracts
///
/// | Operation | Max Duration | Notes |
/// |-----------|--------------|-------|
/// | `exchange()` | `timeout` | returns WKC 0 on timeout |
/// | `wait_for_state()` | `timeout` | non-blocking poll when timeout is zero |
/// | `reconfigure_device()` / `recover_device()` | `timeout` | best effort |
/// | `request_state()` | - | asynchronous, read back with `wait_for_state()` |
pub trait Fieldbus: Send + Sync {
    /// Returns the transport's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the transport's semantic version.
    fn version(&self) -> &'static str;

    /// Bind to a network interface.
    ///
    /// # Errors
    /// `FieldbusError::BindFailed` when the interface cannot be opened.
    fn init(&self, ifname: &str) -> Result<(), FieldbusError>;

    /// Scan the segment and configure every device found. Returns the device count.
    fn discover_and_configure(&self) -> Result<u16, FieldbusError>;

    /// Map process data of all devices and report the resulting layout.
    fn map_process_data(&self) -> Result<ProcessImageLayout, FieldbusError>;

    /// Configure distributed clocks. Returns `true` when any device supports DC.
    fn configure_distributed_clock(&self) -> Result<bool, FieldbusError>;

    /// Wait until the target reaches `state` or `timeout` elapses.
    ///
    /// Returns the observed state; for [`Target::All`] the lowest state of all devices.
    fn wait_for_state(&self, target: Target, state: AlState, timeout: Duration) -> DeviceState;

    /// Request a state transition. Does not wait for it.
    fn request_state(&self, target: Target, state: DeviceState) -> Result<(), FieldbusError>;

    /// Send `outputs`, receive into `inputs` in place, return the work counter.
    ///
    /// `outputs` and `inputs` span the whole image of `group`.
    fn exchange(
        &self,
        group: u8,
        outputs: &[u8],
        inputs: &mut [u8],
        timeout: Duration,
    ) -> Exchange;

    /// Read back the state and AL status code of every device.
    fn read_states(&self) -> Vec<DeviceStatus>;

    /// Re-run the configuration of one device. Returns `true` on success.
    fn reconfigure_device(&self, index: u16, timeout: Duration) -> bool;

    /// Re-establish addressing of a lost device. Returns `true` on success.
    fn recover_device(&self, index: u16, timeout: Duration) -> bool;

    /// Human-readable AL status code description.
    fn describe_al_status(&self, code: u16) -> &'static str {
        describe_al_status(code)
    }

    /// Release the network interface. Safe to call more than once.
    fn close(&self);
}

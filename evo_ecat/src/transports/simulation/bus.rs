//! Simulated EtherCAT segment.
//!
//! A line of SOMANET drives with the v4.2 PDO layout in process-data group 0.
//! State changes happen on requests and exchanges only, so state waits
//! return immediately with whatever the devices currently report.

use super::drive::SimulatedDrive;
use evo_common::drive::cia402::DriveState;
use evo_common::drive::pdo::{DriveOutputs, INPUT_SIZE, OUTPUT_SIZE};
use evo_common::fieldbus::config::{MasterConfig, SimulationConfig};
use evo_common::fieldbus::state::{AlState, DeviceState};
use evo_common::fieldbus::transport::{
    DeviceSlice, DeviceStatus, Exchange, Fieldbus, FieldbusError, GroupLayout,
    ProcessImageLayout, Target,
};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Largest logical read/write payload of one frame.
const MAX_SEGMENT_BYTES: usize = 1486;

/// Work counter of a device processing a read/write datagram in OPERATIONAL.
const WKC_OPERATIONAL: u16 = 3;
/// Work counter of a device in SAFE-OP (inputs only).
const WKC_SAFE_OP: u16 = 1;

/// AL status: requested state change invalid.
pub const AL_INVALID_STATE_CHANGE: u16 = 0x0011;
/// AL status: no valid outputs.
pub const AL_NO_VALID_OUTPUTS: u16 = 0x0019;
/// AL status: sync manager watchdog.
pub const AL_SM_WATCHDOG: u16 = 0x001B;

#[derive(Debug)]
struct SimDevice {
    index: u16,
    state: DeviceState,
    al_status_code: u16,
    /// Received at least one output frame in SAFE-OP.
    primed: bool,
    lost: bool,
    recover_calls: u32,
    drive: SimulatedDrive,
}

impl SimDevice {
    fn new(index: u16, in_fault: bool) -> Self {
        Self {
            index,
            state: DeviceState::INIT,
            al_status_code: 0,
            primed: false,
            lost: false,
            recover_calls: 0,
            drive: SimulatedDrive::new(in_fault),
        }
    }

    fn set_state(&mut self, state: DeviceState, al_status_code: u16) {
        if self.state != state {
            debug!("sim slave {}: {} -> {}", self.index, self.state, state);
        }
        self.state = state;
        self.al_status_code = al_status_code;
    }

    fn request(&mut self, requested: DeviceState) {
        if self.lost {
            return;
        }
        let current = self.state;
        if requested.error {
            // Acknowledge: clear the error, settle in the acknowledged state.
            if current.error && current.al >= requested.al {
                self.set_state(DeviceState::new(requested.al), 0);
            }
            return;
        }
        match requested.al {
            AlState::Operational => {
                if current.error {
                    return;
                }
                match current.al {
                    AlState::Operational => {}
                    AlState::SafeOp if self.primed => self.set_state(requested, 0),
                    AlState::SafeOp => {
                        self.set_state(DeviceState::SAFE_OP_ERROR, AL_NO_VALID_OUTPUTS)
                    }
                    al => self.set_state(DeviceState::with_error(al), AL_INVALID_STATE_CHANGE),
                }
            }
            AlState::Init => {
                self.primed = false;
                self.set_state(requested, 0);
            }
            AlState::None => {}
            _ => self.set_state(requested, 0),
        }
    }

    fn wkc(&self) -> u16 {
        if self.lost {
            return 0;
        }
        match self.state.al {
            AlState::Operational => WKC_OPERATIONAL,
            AlState::SafeOp => WKC_SAFE_OP,
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    ifname: Option<String>,
    started: Option<Instant>,
    devices: Vec<SimDevice>,
    layout: Option<ProcessImageLayout>,
    /// Exchanges with `fault_device` in OPERATIONAL.
    op_exchanges: u64,
    fault_fired: bool,
    loss_fired: bool,
}

impl Inner {
    fn device_mut(&mut self, index: u16) -> Result<&mut SimDevice, FieldbusError> {
        self.devices
            .iter_mut()
            .find(|d| d.index == index)
            .ok_or(FieldbusError::InvalidDevice(index))
    }

    fn targets(&mut self, target: Target) -> Result<Vec<&mut SimDevice>, FieldbusError> {
        match target {
            Target::All => Ok(self.devices.iter_mut().collect()),
            Target::Device(index) => Ok(vec![self.device_mut(index)?]),
        }
    }
}

/// Simulation transport.
pub struct SimulatedBus {
    config: SimulationConfig,
    inner: Mutex<Inner>,
}

impl SimulatedBus {
    /// Segment described by the `[simulation]` section.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Factory for the transport registry.
    pub fn from_master_config(config: &MasterConfig) -> Self {
        Self::new(config.simulation.clone())
    }

    /// Bound interface, `None` before `init()` or after `close()`.
    pub fn interface(&self) -> Option<String> {
        self.inner.lock().ifname.clone()
    }

    /// CiA-402 state of one simulated drive.
    pub fn drive_state(&self, index: u16) -> Option<DriveState> {
        let inner = self.inner.lock();
        inner
            .devices
            .iter()
            .find(|d| d.index == index)
            .map(|d| d.drive.state())
    }

    fn inject_faults(&self, inner: &mut Inner) {
        let fault_device = self.config.fault_device;
        let in_op = inner
            .devices
            .iter()
            .any(|d| d.index == fault_device && d.state.is_operational());
        if !in_op {
            return;
        }
        inner.op_exchanges += 1;
        let count = inner.op_exchanges;

        if !inner.fault_fired && self.config.fault_after_cycles.is_some_and(|n| count >= n) {
            inner.fault_fired = true;
            if let Ok(device) = inner.device_mut(fault_device) {
                warn!("sim slave {}: injecting sync manager watchdog", fault_device);
                device.set_state(DeviceState::SAFE_OP_ERROR, AL_SM_WATCHDOG);
                device.drive.trip();
            }
        } else if !inner.loss_fired && self.config.lose_after_cycles.is_some_and(|n| count >= n) {
            inner.loss_fired = true;
            if let Ok(device) = inner.device_mut(fault_device) {
                warn!("sim slave {}: injecting device loss", fault_device);
                device.lost = true;
                device.recover_calls = 0;
                device.set_state(DeviceState::NONE, 0);
            }
        }
    }
}

impl Fieldbus for SimulatedBus {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&self, ifname: &str) -> Result<(), FieldbusError> {
        if self.config.unavailable_interfaces.iter().any(|i| i == ifname) {
            return Err(FieldbusError::BindFailed(ifname.to_string()));
        }
        let mut inner = self.inner.lock();
        inner.ifname = Some(ifname.to_string());
        inner.started = Some(Instant::now());
        info!("Simulated segment bound to {} ({} devices)", ifname, self.config.devices);
        Ok(())
    }

    fn discover_and_configure(&self) -> Result<u16, FieldbusError> {
        let mut inner = self.inner.lock();
        if inner.ifname.is_none() {
            return Err(FieldbusError::NotInitialized);
        }
        inner.devices = (1..=self.config.devices)
            .map(|index| {
                let in_fault = self.config.start_in_fault && index == self.config.fault_device;
                let mut device = SimDevice::new(index, in_fault);
                device.set_state(DeviceState::PRE_OP, 0);
                device
            })
            .collect();
        Ok(self.config.devices)
    }

    fn map_process_data(&self) -> Result<ProcessImageLayout, FieldbusError> {
        let mut inner = self.inner.lock();
        if inner.devices.is_empty() {
            return Err(FieldbusError::NotInitialized);
        }

        let record = OUTPUT_SIZE + INPUT_SIZE;
        let mut segments = Vec::new();
        let mut current = 0usize;
        let mut devices = Vec::with_capacity(inner.devices.len());
        for (i, device) in inner.devices.iter_mut().enumerate() {
            if current + record > MAX_SEGMENT_BYTES {
                segments.push(current as u32);
                current = 0;
            }
            current += record;
            devices.push(DeviceSlice {
                index: device.index,
                group: 0,
                outputs: i * OUTPUT_SIZE..(i + 1) * OUTPUT_SIZE,
                inputs: i * INPUT_SIZE..(i + 1) * INPUT_SIZE,
            });
            device.set_state(DeviceState::SAFE_OP, 0);
        }
        segments.push(current as u32);

        let count = inner.devices.len();
        let layout = ProcessImageLayout {
            output_bytes: count * OUTPUT_SIZE,
            input_bytes: count * INPUT_SIZE,
            groups: vec![GroupLayout {
                group: 0,
                outputs_wkc: count as u16,
                inputs_wkc: count as u16,
                segments,
            }],
            devices,
        };
        inner.layout = Some(layout.clone());
        Ok(layout)
    }

    fn configure_distributed_clock(&self) -> Result<bool, FieldbusError> {
        Ok(!self.inner.lock().devices.is_empty())
    }

    fn wait_for_state(&self, target: Target, _state: AlState, _timeout: Duration) -> DeviceState {
        let inner = self.inner.lock();
        let observed = |d: &SimDevice| if d.lost { DeviceState::NONE } else { d.state };
        match target {
            Target::All => inner
                .devices
                .iter()
                .map(observed)
                .min_by_key(|s| s.al)
                .unwrap_or(DeviceState::NONE),
            Target::Device(index) => inner
                .devices
                .iter()
                .find(|d| d.index == index)
                .map_or(DeviceState::NONE, observed),
        }
    }

    fn request_state(&self, target: Target, state: DeviceState) -> Result<(), FieldbusError> {
        let mut inner = self.inner.lock();
        if inner.ifname.is_none() {
            return Err(FieldbusError::NotInitialized);
        }
        for device in inner.targets(target)? {
            device.request(state);
        }
        Ok(())
    }

    fn exchange(&self, group: u8, outputs: &[u8], inputs: &mut [u8], _timeout: Duration) -> Exchange {
        let mut inner = self.inner.lock();
        if inner.ifname.is_none() || group != 0 {
            return Exchange::default();
        }
        self.inject_faults(&mut inner);

        let inner = &mut *inner;
        let dc_time = inner
            .started
            .map_or(0, |t| t.elapsed().as_nanos() as i64);
        let Some(layout) = inner.layout.as_ref() else {
            return Exchange {
                dc_time,
                ..Exchange::default()
            };
        };

        let mut wkc = 0;
        let mut state_check = false;
        for (device, slice) in inner.devices.iter_mut().zip(&layout.devices) {
            wkc += device.wkc();
            if !device.state.is_operational() || device.lost {
                state_check = true;
            }
            if device.lost || device.state.al < AlState::SafeOp {
                continue;
            }

            let received = outputs
                .get(slice.outputs.clone())
                .and_then(|b| DriveOutputs::decode(b).ok());
            match device.state.al {
                AlState::SafeOp => device.primed = received.is_some(),
                AlState::Operational => {
                    if let Some(received) = received {
                        device.drive.apply(&received);
                    }
                }
                _ => {}
            }
            device.drive.step();
            if let Some(record) = inputs.get_mut(slice.inputs.clone()) {
                let _ = device.drive.inputs().encode(record);
            }
        }

        Exchange {
            wkc,
            dc_time,
            state_check,
        }
    }

    fn read_states(&self) -> Vec<DeviceStatus> {
        self.inner
            .lock()
            .devices
            .iter()
            .map(|d| DeviceStatus {
                index: d.index,
                state: if d.lost { DeviceState::NONE } else { d.state },
                al_status_code: d.al_status_code,
                group: 0,
            })
            .collect()
    }

    fn reconfigure_device(&self, index: u16, _timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        let Ok(device) = inner.device_mut(index) else {
            return false;
        };
        if device.lost || !device.state.is_present() {
            return false;
        }
        device.primed = false;
        device.set_state(DeviceState::SAFE_OP, 0);
        true
    }

    fn recover_device(&self, index: u16, _timeout: Duration) -> bool {
        let attempts = self.config.recover_attempts;
        let mut inner = self.inner.lock();
        let Ok(device) = inner.device_mut(index) else {
            return false;
        };
        if !device.lost {
            return false;
        }
        device.recover_calls += 1;
        if device.recover_calls < attempts {
            return false;
        }
        device.lost = false;
        device.primed = false;
        device.drive = SimulatedDrive::new(false);
        device.set_state(DeviceState::INIT, 0);
        true
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        if let Some(ifname) = inner.ifname.take() {
            info!("Simulated segment released {}", ifname);
        }
    }
}

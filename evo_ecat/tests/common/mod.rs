//! Scripted in-memory transport shared by the integration tests.
#![allow(dead_code)]

use evo_common::drive::pdo::{INPUT_SIZE, OUTPUT_SIZE};
use evo_common::fieldbus::state::{AlState, DeviceState};
use evo_common::fieldbus::transport::{
    DeviceSlice, DeviceStatus, Exchange, Fieldbus, FieldbusError, GroupLayout,
    ProcessImageLayout, Target,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One transport call, in order of arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init(String),
    Discover,
    Map,
    DistributedClock,
    WaitForState(Target, AlState),
    RequestState(Target, DeviceState),
    Exchange,
    ReadStates,
    Reconfigure(u16),
    Recover(u16),
    Close,
}

/// What the scripted segment answers.
#[derive(Debug, Default)]
pub struct Script {
    pub calls: Vec<Call>,
    pub bind_fails: bool,
    pub devices: u16,
    pub layout: ProcessImageLayout,
    /// Answers of `read_states`, one entry per call; the last one sticks.
    pub states: VecDeque<Vec<DeviceStatus>>,
    pub current: Vec<DeviceStatus>,
    /// Answers of `wait_for_state` for a single device; falls back to `current`.
    pub rechecks: VecDeque<DeviceState>,
    /// `wait_for_state(All, OP)` succeeds from this call on (1-based).
    pub op_after_checks: Option<u32>,
    pub op_checks: u32,
    /// Work counters of successive exchanges; falls back to `default_wkc`.
    pub wkcs: VecDeque<u16>,
    pub default_wkc: u16,
    /// Status word the drive reports on every exchange.
    pub status_word: u16,
    pub state_check: bool,
    pub reconfigure_ok: bool,
    pub recover_results: VecDeque<bool>,
    pub request_fails: bool,
}

/// `Fieldbus` whose behavior is set by a [`Script`].
#[derive(Default)]
pub struct ScriptedBus {
    script: Mutex<Script>,
}

impl ScriptedBus {
    pub fn new(configure: impl FnOnce(&mut Script)) -> Arc<Self> {
        let bus = Self::default();
        configure(&mut bus.script.lock());
        Arc::new(bus)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.script.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.script.lock().calls.clear();
    }

    pub fn with(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock());
    }
}

impl Fieldbus for ScriptedBus {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    fn init(&self, ifname: &str) -> Result<(), FieldbusError> {
        let mut s = self.script.lock();
        s.calls.push(Call::Init(ifname.to_string()));
        if s.bind_fails {
            Err(FieldbusError::BindFailed(ifname.to_string()))
        } else {
            Ok(())
        }
    }

    fn discover_and_configure(&self) -> Result<u16, FieldbusError> {
        let mut s = self.script.lock();
        s.calls.push(Call::Discover);
        Ok(s.devices)
    }

    fn map_process_data(&self) -> Result<ProcessImageLayout, FieldbusError> {
        let mut s = self.script.lock();
        s.calls.push(Call::Map);
        Ok(s.layout.clone())
    }

    fn configure_distributed_clock(&self) -> Result<bool, FieldbusError> {
        self.script.lock().calls.push(Call::DistributedClock);
        Ok(true)
    }

    fn wait_for_state(&self, target: Target, state: AlState, _timeout: Duration) -> DeviceState {
        let mut s = self.script.lock();
        s.calls.push(Call::WaitForState(target, state));
        match target {
            Target::All if state == AlState::Operational => {
                s.op_checks += 1;
                let checks = s.op_checks;
                if s.op_after_checks.is_some_and(|n| checks >= n) {
                    DeviceState::OPERATIONAL
                } else {
                    DeviceState::SAFE_OP
                }
            }
            Target::All => DeviceState::new(state),
            Target::Device(index) => match s.rechecks.pop_front() {
                Some(observed) => observed,
                None => s
                    .current
                    .iter()
                    .find(|d| d.index == index)
                    .map_or(DeviceState::NONE, |d| d.state),
            },
        }
    }

    fn request_state(&self, target: Target, state: DeviceState) -> Result<(), FieldbusError> {
        let mut s = self.script.lock();
        s.calls.push(Call::RequestState(target, state));
        if s.request_fails {
            Err(FieldbusError::CommunicationError("no response".into()))
        } else {
            Ok(())
        }
    }

    fn exchange(&self, _group: u8, _outputs: &[u8], inputs: &mut [u8], _timeout: Duration) -> Exchange {
        let mut s = self.script.lock();
        s.calls.push(Call::Exchange);
        let wkc = s.wkcs.pop_front().unwrap_or(s.default_wkc);
        if let Some(slice) = s.layout.device(1) {
            let at = slice.inputs.start;
            inputs[at..at + 2].copy_from_slice(&s.status_word.to_le_bytes());
        }
        Exchange {
            wkc,
            dc_time: 0,
            state_check: s.state_check,
        }
    }

    fn read_states(&self) -> Vec<DeviceStatus> {
        let mut s = self.script.lock();
        s.calls.push(Call::ReadStates);
        if let Some(next) = s.states.pop_front() {
            s.current = next;
        }
        s.current.clone()
    }

    fn reconfigure_device(&self, index: u16, _timeout: Duration) -> bool {
        let mut s = self.script.lock();
        s.calls.push(Call::Reconfigure(index));
        s.reconfigure_ok
    }

    fn recover_device(&self, index: u16, _timeout: Duration) -> bool {
        let mut s = self.script.lock();
        s.calls.push(Call::Recover(index));
        s.recover_results.pop_front().unwrap_or(false)
    }

    fn close(&self) {
        self.script.lock().calls.push(Call::Close);
    }
}

/// One drive at index 1 in group 0 with the given WKC contributions.
pub fn single_drive_layout(outputs_wkc: u16, inputs_wkc: u16) -> ProcessImageLayout {
    ProcessImageLayout {
        output_bytes: OUTPUT_SIZE,
        input_bytes: INPUT_SIZE,
        groups: vec![GroupLayout {
            group: 0,
            outputs_wkc,
            inputs_wkc,
            segments: vec![(OUTPUT_SIZE + INPUT_SIZE) as u32],
        }],
        devices: vec![DeviceSlice {
            index: 1,
            group: 0,
            outputs: 0..OUTPUT_SIZE,
            inputs: 0..INPUT_SIZE,
        }],
    }
}

pub fn status(index: u16, state: DeviceState) -> DeviceStatus {
    DeviceStatus {
        index,
        state,
        al_status_code: 0,
        group: 0,
    }
}

//! Shared network state.
//!
//! The orchestrator and the supervisor run on separate threads and only
//! communicate through this object. All fields sit behind one lock so
//! multi-field reads (operational flag + work counters, a whole device
//! record) are never torn. Readers may be one cycle stale.
//!
//! | Field | Written by | Read by |
//! |-------|-----------|---------|
//! | `in_op`, `wkc` | orchestrator (every cycle) | supervisor |
//! | `expected_wkc` | orchestrator (once) | supervisor |
//! | `devices` | supervisor | orchestrator (end-of-run report) |
//! | `groups` | orchestrator sets, supervisor clears | both |

use evo_common::fieldbus::state::{DeviceRecord, GroupHealth};
use evo_common::fieldbus::transport::{DeviceStatus, Exchange, WorkCounter};
use parking_lot::Mutex;

/// Copy of the shared state at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    /// The cyclic loop is running in OPERATIONAL.
    pub in_op: bool,
    /// Work counter of the last exchange.
    pub wkc: WorkCounter,
    /// Work counter of a fully healthy exchange.
    pub expected_wkc: WorkCounter,
    /// One record per discovered device, ascending index.
    pub devices: Vec<DeviceRecord>,
    /// Health flag per group, indexed by group number.
    pub groups: Vec<GroupHealth>,
}

/// Lock-protected state shared by the orchestrator and the supervisor.
#[derive(Debug, Default)]
pub struct NetworkState {
    inner: Mutex<NetworkSnapshot>,
}

impl NetworkState {
    /// Empty state: no devices, not operational.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the device table after discovery.
    pub fn register_devices(&self, devices: Vec<DeviceRecord>) {
        let mut inner = self.inner.lock();
        let groups = devices.iter().map(|d| d.group as usize + 1).max().unwrap_or(1);
        inner.groups = vec![GroupHealth::default(); groups];
        inner.devices = devices;
    }

    /// Set the work counter of a healthy exchange.
    pub fn set_expected_wkc(&self, expected: WorkCounter) {
        self.inner.lock().expected_wkc = expected;
    }

    /// Mark the cyclic loop as running (or stopped) in OPERATIONAL.
    pub fn set_in_op(&self, in_op: bool) {
        self.inner.lock().in_op = in_op;
    }

    /// Publish the result of one exchange of `group`.
    pub fn record_exchange(&self, group: u8, exchange: &Exchange) {
        let mut inner = self.inner.lock();
        inner.wkc = exchange.wkc;
        if exchange.state_check {
            let health = group_entry(&mut inner.groups, group);
            health.needs_state_check = true;
        }
    }

    /// Supervisor trigger: operational, and either the last exchange was
    /// short or the group is flagged.
    pub fn needs_supervision(&self, group: u8) -> bool {
        let inner = self.inner.lock();
        let flagged = inner
            .groups
            .get(group as usize)
            .is_some_and(|g| g.needs_state_check);
        inner.in_op && (inner.wkc < inner.expected_wkc || flagged)
    }

    /// Current health flag of `group`.
    pub fn group_needs_check(&self, group: u8) -> bool {
        self.inner
            .lock()
            .groups
            .get(group as usize)
            .is_some_and(|g| g.needs_state_check)
    }

    /// Set or clear the health flag of `group`.
    pub fn set_group_needs_check(&self, group: u8, needs_check: bool) {
        let mut inner = self.inner.lock();
        group_entry(&mut inner.groups, group).needs_state_check = needs_check;
    }

    /// Copy states read back from the transport into the device records.
    pub fn apply_statuses(&self, statuses: &[DeviceStatus]) {
        let mut inner = self.inner.lock();
        for status in statuses {
            if let Some(record) = inner.devices.iter_mut().find(|d| d.index == status.index) {
                record.state = status.state;
                record.al_status_code = status.al_status_code;
                record.group = status.group;
            }
        }
    }

    /// Copy of one device record.
    pub fn device(&self, index: u16) -> Option<DeviceRecord> {
        self.inner
            .lock()
            .devices
            .iter()
            .find(|d| d.index == index)
            .copied()
    }

    /// Mutate one device record under the lock. Returns `false` for an unknown index.
    pub fn update_device(&self, index: u16, f: impl FnOnce(&mut DeviceRecord)) -> bool {
        let mut inner = self.inner.lock();
        match inner.devices.iter_mut().find(|d| d.index == index) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Copy of all device records.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.inner.lock().devices.clone()
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> NetworkSnapshot {
        self.inner.lock().clone()
    }
}

fn group_entry(groups: &mut Vec<GroupHealth>, group: u8) -> &mut GroupHealth {
    let idx = group as usize;
    if groups.len() <= idx {
        groups.resize(idx + 1, GroupHealth::default());
    }
    &mut groups[idx]
}

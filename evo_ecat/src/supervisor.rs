//! Network state supervisor.
//!
//! Runs on its own thread at a fixed interval, independent of the cyclic
//! loop. A scan only happens while the loop is OPERATIONAL and either the
//! last work counter was short or the group health flag is set. Every
//! recovery action is best effort and bounded by a timeout; failures are
//! logged and retried on a later scan, never escalated.
//!
//! ## Per-device decision (devices of the active group not OPERATIONAL)
//!
//! | Observed state | Action | Level |
//! |----------------|--------|-------|
//! | SAFE_OP + ERROR | request SAFE_OP + ACK | error |
//! | SAFE_OP | request OPERATIONAL | warn |
//! | any other real state | reconfigure, clear `lost` on success | info |
//! | NONE, not lost | re-check once, mark `lost` if still NONE | error |
//!
//! Lost devices are then recovered (still NONE) or reported found (real state).

use crate::network::NetworkState;
use evo_common::fieldbus::config::SupervisorConfig;
use evo_common::fieldbus::state::{AlState, DeviceState};
use evo_common::fieldbus::transport::{Fieldbus, Target};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Counters of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanReport {
    /// SAFE_OP + ERROR acknowledgements requested.
    pub acknowledged: u16,
    /// OPERATIONAL requests issued.
    pub requested_op: u16,
    /// Successful reconfigurations.
    pub reconfigured: u16,
    /// Devices newly marked lost.
    pub marked_lost: u16,
    /// Lost devices recovered.
    pub recovered: u16,
    /// Lost devices that reappeared on their own.
    pub found: u16,
    /// The group health flag was clear after the scan.
    pub healthy: bool,
}

/// Device state supervision for one process-data group.
pub struct Supervisor {
    bus: Arc<dyn Fieldbus>,
    network: Arc<NetworkState>,
    config: SupervisorConfig,
    group: u8,
}

impl Supervisor {
    /// Supervisor of `group`.
    pub fn new(
        bus: Arc<dyn Fieldbus>,
        network: Arc<NetworkState>,
        config: SupervisorConfig,
        group: u8,
    ) -> Self {
        Self {
            bus,
            network,
            config,
            group,
        }
    }

    /// Scan if the trigger condition holds.
    pub fn poll(&self) -> Option<ScanReport> {
        if self.network.needs_supervision(self.group) {
            Some(self.scan())
        } else {
            None
        }
    }

    /// Read back every device state and act on the unhealthy ones.
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        self.network.set_group_needs_check(self.group, false);
        let statuses = self.bus.read_states();
        self.network.apply_statuses(&statuses);

        for mut record in self.network.devices() {
            let index = record.index;

            if record.group == self.group && !record.state.is_operational() {
                self.network.set_group_needs_check(self.group, true);

                if record.state == DeviceState::SAFE_OP_ERROR {
                    error!("ERROR : slave {} is in SAFE_OP + ERROR, attempting ack.", index);
                    self.request(index, DeviceState::SAFE_OP_ACK);
                    report.acknowledged += 1;
                } else if record.state == DeviceState::SAFE_OP {
                    warn!("WARNING : slave {} is in SAFE_OP, change to OPERATIONAL.", index);
                    self.request(index, DeviceState::OPERATIONAL);
                    report.requested_op += 1;
                } else if record.state.is_present() {
                    if self.bus.reconfigure_device(index, self.config.monitor_timeout()) {
                        record.lost = false;
                        report.reconfigured += 1;
                        info!("MESSAGE : slave {} reconfigured", index);
                    } else {
                        debug!("slave {} reconfiguration failed (state {})", index, record.state);
                    }
                } else if !record.lost {
                    record.state = self.bus.wait_for_state(
                        Target::Device(index),
                        AlState::Operational,
                        self.config.recheck_timeout(),
                    );
                    if !record.state.is_present() {
                        record.lost = true;
                        report.marked_lost += 1;
                        error!("ERROR : slave {} lost", index);
                    }
                }
            }

            if record.lost {
                if !record.state.is_present() {
                    if self.bus.recover_device(index, self.config.monitor_timeout()) {
                        record.lost = false;
                        report.recovered += 1;
                        info!("MESSAGE : slave {} recovered", index);
                    }
                } else {
                    record.lost = false;
                    report.found += 1;
                    info!("MESSAGE : slave {} found", index);
                }
            }

            self.network.update_device(index, |d| {
                d.state = record.state;
                d.lost = record.lost;
            });
        }

        report.healthy = !self.network.group_needs_check(self.group);
        if report.healthy {
            info!("OK : all slaves resumed OPERATIONAL.");
        }
        report
    }

    /// Poll at the configured interval until `running` is cleared.
    pub fn run(&self, running: &AtomicBool) {
        info!(
            "Network supervisor started (group={}, interval={}us)",
            self.group, self.config.interval_us
        );
        while running.load(Ordering::SeqCst) {
            self.poll();
            thread::sleep(self.config.interval());
        }
        info!("Network supervisor stopped");
    }

    /// Run on a dedicated thread.
    pub fn spawn(self, running: Arc<AtomicBool>) -> std::io::Result<SupervisorHandle> {
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("ecat-supervisor".to_string())
            .spawn(move || self.run(&flag))?;
        Ok(SupervisorHandle {
            running,
            thread: Some(thread),
        })
    }

    fn request(&self, index: u16, state: DeviceState) {
        if let Err(e) = self.bus.request_state(Target::Device(index), state) {
            warn!("State request {} for slave {} failed: {}", state, index, e);
        }
    }
}

/// Handle of a running supervisor thread. Stops the thread when dropped.
pub struct SupervisorHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Signal cancellation and wait for the thread to finish its current iteration.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Network supervisor thread panicked");
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

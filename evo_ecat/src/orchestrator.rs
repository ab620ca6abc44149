//! Cyclic orchestrator.
//!
//! Drives the network through its lifecycle and runs the bounded cyclic
//! loop once every device is OPERATIONAL:
//!
//! ```text
//! Init ─► Configured ─► SafeOperational ─► RequestingOperational ─┬─► Operational ─┐
//!                                                                 └─► Degraded ────┤
//!                                                     Init ◄── Closing ◄───────────┘
//! ```
//!
//! Closing (all devices to INIT, transport released) runs whether or not
//! OPERATIONAL was reached. It is skipped only when binding failed; with
//! zero devices only the transport is released.

use crate::channel::ProcessDataChannel;
use crate::handshake::{DriveHandshake, HandshakeStep};
use crate::network::NetworkState;
use evo_common::drive::cia402::DriveState;
use evo_common::drive::pdo::{DriveInputs, INPUT_SIZE, OUTPUT_SIZE};
use evo_common::fieldbus::config::{CycleConfig, DriveConfig, MasterConfig};
use evo_common::fieldbus::state::{AlState, DeviceRecord, DeviceState};
use evo_common::fieldbus::transport::{
    DeviceStatus, Fieldbus, FieldbusError, ProcessImageLayout, Target, WorkCounter,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cycles between two INFO summaries of the cyclic loop.
const SUMMARY_INTERVAL: u64 = 1000;

/// Network lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing bound, or closed again.
    #[default]
    Init,
    /// Devices discovered and configured.
    Configured,
    /// Process data mapped, devices asked for SAFE-OP.
    SafeOperational,
    /// OPERATIONAL requested, waiting for all devices.
    RequestingOperational,
    /// Cyclic loop running.
    Operational,
    /// OPERATIONAL not reached within the retry budget.
    Degraded,
    /// Devices back to INIT, transport being released.
    Closing,
}

/// Fatal startup errors. Everything after startup is handled in place.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Transport call failed.
    #[error(transparent)]
    Fieldbus(#[from] FieldbusError),

    /// The configured group has no process image.
    #[error("Group {0} has no mapped process data")]
    GroupNotMapped(u8),

    /// The configured drive is not part of the process image.
    #[error("Drive {0} is not part of the process image")]
    DriveNotMapped(u16),

    /// The drive's records are smaller than the expected PDO layout.
    #[error("Drive {index} maps {inputs}/{outputs} bytes, need {}/{}", INPUT_SIZE, OUTPUT_SIZE)]
    ImageTooSmall {
        /// Drive index.
        index: u16,
        /// Mapped input bytes.
        inputs: usize,
        /// Mapped output bytes.
        outputs: usize,
    },
}

/// Timing statistics of the cyclic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStats {
    /// Cycles executed.
    pub cycles: u64,
    /// Cycles whose work counter met the expected value.
    pub healthy: u64,
    /// Cycles skipped by the work counter gate.
    pub degraded: u64,
    /// Cycles whose body took longer than the cycle interval.
    pub overruns: u64,
    /// Longest cycle body [µs].
    pub max_cycle_time_us: u64,
    /// Sum of cycle bodies [µs].
    pub total_cycle_time_us: u64,
}

impl CycleStats {
    fn record(&mut self, healthy: bool, cycle_time_us: u64, budget_us: u64) {
        self.cycles += 1;
        if healthy {
            self.healthy += 1;
        } else {
            self.degraded += 1;
        }
        self.total_cycle_time_us += cycle_time_us;
        self.max_cycle_time_us = self.max_cycle_time_us.max(cycle_time_us);
        if cycle_time_us > budget_us {
            self.overruns += 1;
        }
    }

    /// Mean cycle body [µs].
    pub fn avg_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us.checked_div(self.cycles).unwrap_or(0)
    }
}

/// Telemetry of one healthy cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDiagnostics {
    /// 1-based cycle index.
    pub cycle: u64,
    /// Observed work counter.
    pub wkc: WorkCounter,
    /// Raw status word.
    pub status_word: u16,
    /// Mode of operation reported by the drive.
    pub op_mode_display: i8,
    /// Actual position.
    pub position: i32,
    /// Actual velocity.
    pub velocity: i32,
    /// Demanded velocity.
    pub velocity_demand: i32,
    /// Distributed-clock time [ns].
    pub dc_time: i64,
}

impl CycleDiagnostics {
    fn new(cycle: u64, wkc: WorkCounter, dc_time: i64, inputs: &DriveInputs) -> Self {
        Self {
            cycle,
            wkc,
            status_word: inputs.status_word,
            op_mode_display: inputs.op_mode_display,
            position: inputs.position_value,
            velocity: inputs.velocity_value,
            velocity_demand: inputs.velocity_demand,
            dc_time,
        }
    }
}

impl fmt::Display for CycleDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processdata cycle {:5}, WKC {}, Statusword: {:#06x}, Op Mode Display: {}, \
             ActualPos: {}, ActualVel: {}, DemandVel: {}, T: {}",
            self.cycle,
            self.wkc,
            self.status_word,
            self.op_mode_display,
            self.position,
            self.velocity,
            self.velocity_demand,
            self.dc_time
        )
    }
}

/// Result of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Work counter met; handshake evaluated.
    Healthy {
        /// What the handshake did.
        step: HandshakeStep,
        /// Telemetry of the cycle.
        diagnostics: CycleDiagnostics,
    },
    /// Work counter short; the output image was not touched.
    Degraded {
        /// Observed work counter.
        wkc: WorkCounter,
    },
}

impl CycleOutcome {
    /// The cycle's data was trustworthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// One exchange + gate + handshake per call. Owns the process image.
pub struct CyclicTask {
    channel: ProcessDataChannel,
    network: Arc<NetworkState>,
    handshake: DriveHandshake,
    expected_wkc: WorkCounter,
    group: u8,
    drive: u16,
    cycle: u64,
}

impl CyclicTask {
    /// Task driving `drive` over `channel`.
    pub fn new(
        channel: ProcessDataChannel,
        network: Arc<NetworkState>,
        handshake: DriveHandshake,
        expected_wkc: WorkCounter,
        group: u8,
        drive: u16,
    ) -> Self {
        Self {
            channel,
            network,
            handshake,
            expected_wkc,
            group,
            drive,
            cycle: 0,
        }
    }

    /// Exchange without evaluating the handshake.
    ///
    /// Used for priming and while waiting for OPERATIONAL.
    pub fn exchange_only(&mut self) -> WorkCounter {
        self.channel.exchange().wkc
    }

    /// Run one cycle.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.cycle += 1;
        let exchange = self.channel.exchange();
        self.network.record_exchange(self.group, &exchange);

        if exchange.wkc < self.expected_wkc {
            return CycleOutcome::Degraded { wkc: exchange.wkc };
        }

        let Some((inputs, outputs)) = self.channel.device_io(self.drive) else {
            return CycleOutcome::Degraded { wkc: exchange.wkc };
        };
        let telemetry = match DriveInputs::decode(inputs) {
            Ok(telemetry) => telemetry,
            Err(e) => {
                warn!("Drive {} input record unreadable: {}", self.drive, e);
                return CycleOutcome::Degraded { wkc: exchange.wkc };
            }
        };
        match self.handshake.step(inputs, outputs) {
            Ok(step) => {
                let diagnostics =
                    CycleDiagnostics::new(self.cycle, exchange.wkc, exchange.dc_time, &telemetry);
                debug!(
                    cycle = diagnostics.cycle,
                    wkc = diagnostics.wkc,
                    status_word = diagnostics.status_word,
                    "{}",
                    diagnostics
                );
                CycleOutcome::Healthy { step, diagnostics }
            }
            Err(e) => {
                warn!("Drive {} handshake skipped: {}", self.drive, e);
                CycleOutcome::Degraded { wkc: exchange.wkc }
            }
        }
    }

    /// Work counter of a fully healthy exchange.
    pub fn expected_wkc(&self) -> WorkCounter {
        self.expected_wkc
    }

    /// Cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Drive state seen on the last healthy cycle.
    pub fn drive_state(&self) -> Option<DriveState> {
        self.handshake.last_state()
    }

    /// Process-data channel.
    pub fn channel(&self) -> &ProcessDataChannel {
        &self.channel
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Devices discovered.
    pub devices: u16,
    /// Every device reached OPERATIONAL.
    pub reached_operational: bool,
    /// The cyclic loop stopped on cancellation before its cycle bound.
    pub cancelled: bool,
    /// Cyclic loop statistics.
    pub stats: CycleStats,
    /// Last observed drive state.
    pub drive_state: Option<DriveState>,
    /// Devices not OPERATIONAL at the end of the OP request phase.
    pub non_operational: Vec<DeviceStatus>,
}

/// Lifecycle driver of one master session.
pub struct Orchestrator {
    bus: Arc<dyn Fieldbus>,
    network: Arc<NetworkState>,
    cycle: CycleConfig,
    drive: DriveConfig,
    running: Arc<AtomicBool>,
    phase: Phase,
}

impl Orchestrator {
    /// Orchestrator over a shared transport and network state.
    pub fn new(
        bus: Arc<dyn Fieldbus>,
        network: Arc<NetworkState>,
        config: &MasterConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            bus,
            network,
            cycle: config.cycle.clone(),
            drive: config.drive.clone(),
            running,
            phase: Phase::Init,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run a whole session on `ifname`.
    ///
    /// # Errors
    /// Bind failure, zero devices, mapping failure or a drive missing from
    /// the image. Not reaching OPERATIONAL is reported, not an error.
    pub fn run(&mut self, ifname: &str) -> Result<RunReport, OrchestratorError> {
        info!("Starting EtherCAT master on {} ({} v{})", ifname, self.bus.name(), self.bus.version());
        self.phase = Phase::Init;
        self.bus.init(ifname)?;
        info!("ec_init on {} succeeded.", ifname);

        let devices = match self.bus.discover_and_configure() {
            Ok(0) | Err(FieldbusError::NoDevices) => {
                self.bus.close();
                return Err(FieldbusError::NoDevices.into());
            }
            Ok(count) => count,
            Err(e) => {
                self.bus.close();
                return Err(e.into());
            }
        };
        info!("{} slaves found and configured.", devices);
        self.phase = Phase::Configured;

        let result = self.operate(devices);
        self.close();
        result
    }

    fn operate(&mut self, devices: u16) -> Result<RunReport, OrchestratorError> {
        let layout = self.bus.map_process_data()?;
        self.network.register_devices(device_records(devices, &layout, self.cycle.group));
        let dc = self.bus.configure_distributed_clock()?;
        info!("Distributed clock {}", if dc { "configured" } else { "not supported" });

        info!("Slaves mapped, state to SAFE_OP.");
        let lowest = self
            .bus
            .wait_for_state(Target::All, AlState::SafeOp, self.cycle.safe_op_timeout());
        if lowest.al < AlState::SafeOp {
            warn!("Not all slaves reached SAFE_OP (lowest state {})", lowest);
        }
        self.phase = Phase::SafeOperational;

        let mut task = self.cyclic_task(layout)?;
        let mut report = RunReport {
            devices,
            ..RunReport::default()
        };

        self.phase = Phase::RequestingOperational;
        info!("Request operational state for all slaves");
        task.exchange_only();
        self.bus.request_state(Target::All, DeviceState::OPERATIONAL)?;

        if self.request_operational(&mut task) {
            info!("Operational state reached for all slaves.");
            self.phase = Phase::Operational;
            report.reached_operational = true;
            self.network.set_in_op(true);
            report.cancelled = self.cyclic_loop(&mut task, &mut report.stats);
            self.network.set_in_op(false);
        } else {
            warn!("Not all slaves reached operational state.");
            self.phase = Phase::Degraded;
            report.non_operational = self.report_non_operational();
        }
        report.drive_state = task.drive_state();
        Ok(report)
    }

    fn cyclic_task(&self, layout: ProcessImageLayout) -> Result<CyclicTask, OrchestratorError> {
        let group = self.cycle.group;
        let group_layout = layout
            .group(group)
            .ok_or(OrchestratorError::GroupNotMapped(group))?;
        info!(
            "segments : {} : {:?}",
            group_layout.segments.len(),
            group_layout.segments
        );
        let expected_wkc = group_layout.expected_wkc();
        self.network.set_expected_wkc(expected_wkc);
        info!("Calculated workcounter {}", expected_wkc);

        let index = self.drive.device;
        let slice = layout
            .device(index)
            .ok_or(OrchestratorError::DriveNotMapped(index))?;
        if slice.inputs.len() < INPUT_SIZE || slice.outputs.len() < OUTPUT_SIZE {
            return Err(OrchestratorError::ImageTooSmall {
                index,
                inputs: slice.inputs.len(),
                outputs: slice.outputs.len(),
            });
        }

        let channel = ProcessDataChannel::new(
            Arc::clone(&self.bus),
            layout,
            group,
            self.cycle.receive_timeout(),
        );
        Ok(CyclicTask::new(
            channel,
            Arc::clone(&self.network),
            DriveHandshake::from_config(&self.drive),
            expected_wkc,
            group,
            index,
        ))
    }

    /// Exchange + state check until OPERATIONAL or the retry budget runs out.
    fn request_operational(&self, task: &mut CyclicTask) -> bool {
        for attempt in 1..=self.cycle.op_request_retries {
            if !self.running.load(Ordering::SeqCst) {
                info!("OP request cancelled after {} attempts", attempt - 1);
                return false;
            }
            task.exchange_only();
            let state = self.bus.wait_for_state(
                Target::All,
                AlState::Operational,
                self.cycle.op_check_timeout(),
            );
            if state.is_operational() {
                debug!("All slaves OPERATIONAL after {} attempts", attempt);
                return true;
            }
        }
        false
    }

    /// Returns `true` when the loop stopped on cancellation.
    fn cyclic_loop(&self, task: &mut CyclicTask, stats: &mut CycleStats) -> bool {
        let interval = self.cycle.cycle_interval();
        info!(
            "Starting cyclic loop ({} cycles, interval={}us, expected WKC {})",
            self.cycle.cycle_count,
            self.cycle.cycle_interval_us,
            task.expected_wkc()
        );

        let mut cancelled = false;
        for _ in 0..self.cycle.cycle_count {
            if !self.running.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }
            let cycle_start = Instant::now();
            let outcome = task.run_cycle();
            let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
            stats.record(outcome.is_healthy(), cycle_time_us, self.cycle.cycle_interval_us);

            if stats.cycles % SUMMARY_INTERVAL == 0 {
                info!(
                    "Cyclic loop: {} cycles, healthy={}, degraded={}, avg={}us, max={}us, drive={:?}",
                    stats.cycles,
                    stats.healthy,
                    stats.degraded,
                    stats.avg_cycle_time_us(),
                    stats.max_cycle_time_us,
                    task.drive_state()
                );
            }

            // Open-loop pacing: the full interval, whatever the exchange took.
            std::thread::sleep(interval);
        }

        info!(
            "Cyclic loop stopped after {} cycles (degraded: {}, overruns: {}){}",
            stats.cycles,
            stats.degraded,
            stats.overruns,
            if cancelled { ", cancelled" } else { "" }
        );
        cancelled
    }

    fn report_non_operational(&self) -> Vec<DeviceStatus> {
        let statuses = self.bus.read_states();
        self.network.apply_statuses(&statuses);
        let offending: Vec<DeviceStatus> = statuses
            .into_iter()
            .filter(|s| !s.state.is_operational())
            .collect();
        for status in &offending {
            warn!(
                "Slave {} State=0x{:02x} StatusCode=0x{:04x} : {}",
                status.index,
                status.state.raw(),
                status.al_status_code,
                self.bus.describe_al_status(status.al_status_code)
            );
        }
        offending
    }

    fn close(&mut self) {
        self.phase = Phase::Closing;
        info!("Request init state for all slaves");
        if let Err(e) = self.bus.request_state(Target::All, DeviceState::INIT) {
            warn!("INIT request failed: {}", e);
        }
        self.bus.close();
        info!("Transport closed");
        self.phase = Phase::Init;
    }
}

fn device_records(devices: u16, layout: &ProcessImageLayout, default_group: u8) -> Vec<DeviceRecord> {
    (1..=devices)
        .map(|index| {
            let group = layout.device(index).map_or(default_group, |d| d.group);
            DeviceRecord::new(index, group)
        })
        .collect()
}

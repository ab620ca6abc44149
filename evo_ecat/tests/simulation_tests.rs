//! Whole sessions against the simulation transport, supervisor thread running.

use evo_common::config::load_master_config;
use evo_common::drive::cia402::DriveState;
use evo_common::fieldbus::config::MasterConfig;
use evo_common::fieldbus::transport::Fieldbus;
use evo_ecat::network::NetworkState;
use evo_ecat::orchestrator::{Orchestrator, RunReport};
use evo_ecat::supervisor::Supervisor;
use evo_ecat::transports::simulation::SimulatedBus;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn fast_config(cycles: u64) -> MasterConfig {
    let mut config = MasterConfig::default();
    config.cycle.cycle_count = cycles;
    config.cycle.cycle_interval_us = 200;
    config.supervisor.interval_us = 1_000;
    config
}

fn session(config: &MasterConfig, running: Arc<AtomicBool>) -> (RunReport, Arc<SimulatedBus>, Arc<NetworkState>) {
    let bus = Arc::new(SimulatedBus::new(config.simulation.clone()));
    let network = Arc::new(NetworkState::new());
    let supervisor = Supervisor::new(
        bus.clone(),
        network.clone(),
        config.supervisor.clone(),
        config.cycle.group,
    )
    .spawn(running.clone())
    .unwrap();

    let report = Orchestrator::new(bus.clone(), network.clone(), config, running)
        .run("sim0")
        .unwrap();
    supervisor.stop();
    (report, bus, network)
}

fn run(config: &MasterConfig) -> (RunReport, Arc<SimulatedBus>, Arc<NetworkState>) {
    session(config, Arc::new(AtomicBool::new(true)))
}

#[test]
fn drive_reaches_operation_enabled() {
    let (report, bus, network) = run(&fast_config(50));

    assert!(report.reached_operational);
    assert!(!report.cancelled);
    assert_eq!(report.devices, 1);
    assert_eq!(report.stats.cycles, 50);
    assert_eq!(report.stats.degraded, 0);
    assert_eq!(report.drive_state, Some(DriveState::OperationEnabled));
    assert_eq!(bus.drive_state(1), Some(DriveState::OperationEnabled));
    assert!(bus.interface().is_none());
    assert!(!network.snapshot().in_op);
}

#[test]
fn drive_starting_in_fault_is_reset_and_enabled() {
    let mut config = fast_config(50);
    config.simulation.start_in_fault = true;

    let (report, _, _) = run(&config);

    assert!(report.reached_operational);
    assert_eq!(report.drive_state, Some(DriveState::OperationEnabled));
}

#[test]
fn bind_failure_reports_fieldbus_error() {
    let mut config = fast_config(10);
    config.simulation.unavailable_interfaces = vec!["sim0".into()];
    let bus = Arc::new(SimulatedBus::new(config.simulation.clone()));

    let result = Orchestrator::new(
        bus.clone(),
        Arc::new(NetworkState::new()),
        &config,
        Arc::new(AtomicBool::new(true)),
    )
    .run("sim0");

    assert!(result.is_err());
    assert!(bus.interface().is_none());
}

#[test]
fn injected_fault_is_acknowledged_and_drive_re_enabled() {
    let mut config = fast_config(1_000);
    config.simulation.fault_after_cycles = Some(20);

    let (report, bus, network) = run(&config);

    assert!(report.reached_operational);
    assert!(report.stats.degraded > 0);
    assert_eq!(report.drive_state, Some(DriveState::OperationEnabled));
    assert_eq!(bus.drive_state(1), Some(DriveState::OperationEnabled));
    assert!(!network.group_needs_check(0));
}

#[test]
fn lost_device_is_recovered() {
    let mut config = fast_config(1_000);
    config.simulation.lose_after_cycles = Some(20);
    config.simulation.recover_attempts = 2;

    let (report, _, network) = run(&config);

    assert!(report.reached_operational);
    assert!(report.stats.degraded > 0);
    assert_eq!(report.drive_state, Some(DriveState::OperationEnabled));
    assert!(!network.device(1).unwrap().lost);
}

#[test]
fn cancellation_stops_the_cyclic_loop() {
    let mut config = fast_config(1_000_000);
    config.cycle.cycle_interval_us = 100;
    let running = Arc::new(AtomicBool::new(true));
    let stopper = {
        let running = running.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            running.store(false, Ordering::SeqCst);
        })
    };

    let (report, bus, _) = session(&config, running);
    stopper.join().unwrap();

    assert!(report.reached_operational);
    assert!(report.cancelled);
    assert!(report.stats.cycles < 1_000_000);
    assert!(bus.interface().is_none());
}

#[test]
fn config_file_drives_a_two_device_segment() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[shared]
log_level = "warn"
service_name = "evo-ecat-test"

[cycle]
cycle_count = 30
cycle_interval_us = 200

[supervisor]
interval_us = 1000

[simulation]
devices = 2
"#
    )
    .unwrap();

    let config = load_master_config(file.path()).unwrap();
    let (report, bus, network) = run(&config);

    assert_eq!(report.devices, 2);
    assert!(report.reached_operational);
    assert_eq!(report.stats.cycles, 30);
    assert_eq!(network.devices().len(), 2);
    assert_eq!(bus.name(), "simulation");
}

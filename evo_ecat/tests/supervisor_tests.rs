//! Network supervisor against a scripted segment.

mod common;

use common::{Call, ScriptedBus, status};
use evo_common::fieldbus::config::SupervisorConfig;
use evo_common::fieldbus::state::{AlState, DeviceRecord, DeviceState};
use evo_common::fieldbus::transport::{DeviceStatus, Exchange, Target};
use evo_ecat::network::NetworkState;
use evo_ecat::supervisor::Supervisor;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

fn network_with(devices: &[(u16, u8)]) -> Arc<NetworkState> {
    let network = Arc::new(NetworkState::new());
    network.register_devices(devices.iter().map(|&(i, g)| DeviceRecord::new(i, g)).collect());
    network.set_expected_wkc(3);
    network.set_in_op(true);
    network
}

fn supervisor(bus: &Arc<ScriptedBus>, network: &Arc<NetworkState>) -> Supervisor {
    Supervisor::new(bus.clone(), network.clone(), SupervisorConfig::default(), 0)
}

fn op_requests(bus: &ScriptedBus, index: u16) -> usize {
    bus.count(|c| *c == Call::RequestState(Target::Device(index), DeviceState::OPERATIONAL))
}

#[test]
fn safe_op_device_converges_with_one_op_request() {
    let bus = ScriptedBus::new(|s| s.states.push_back(vec![status(1, DeviceState::SAFE_OP)]));
    let network = network_with(&[(1, 0)]);
    network.set_group_needs_check(0, true);

    let report = supervisor(&bus, &network).scan();

    assert_eq!(op_requests(&bus, 1), 1);
    assert_eq!(bus.count(|c| matches!(c, Call::RequestState(..))), 1);
    assert_eq!(report.requested_op, 1);
    assert!(!network.device(1).unwrap().lost);
    assert!(network.group_needs_check(0));
}

#[test]
fn safe_op_error_is_acknowledged() {
    let bus = ScriptedBus::new(|s| s.states.push_back(vec![status(1, DeviceState::SAFE_OP_ERROR)]));
    let network = network_with(&[(1, 0)]);

    let report = supervisor(&bus, &network).scan();

    assert_eq!(report.acknowledged, 1);
    assert_eq!(
        bus.count(|c| *c == Call::RequestState(Target::Device(1), DeviceState::SAFE_OP_ACK)),
        1
    );
    assert_eq!(op_requests(&bus, 1), 0);
}

#[test]
fn present_device_in_lower_state_is_reconfigured() {
    let bus = ScriptedBus::new(|s| {
        s.states.push_back(vec![status(1, DeviceState::PRE_OP)]);
        s.reconfigure_ok = true;
    });
    let network = network_with(&[(1, 0)]);
    network.update_device(1, |d| d.lost = true);

    let report = supervisor(&bus, &network).scan();

    assert_eq!(bus.count(|c| *c == Call::Reconfigure(1)), 1);
    assert_eq!(report.reconfigured, 1);
    assert_eq!(report.found, 0);
    assert!(!network.device(1).unwrap().lost);
}

#[test]
fn failed_reconfigure_is_retried_on_next_scan() {
    let bus = ScriptedBus::new(|s| s.states.push_back(vec![status(1, DeviceState::INIT)]));
    let network = network_with(&[(1, 0)]);
    let sup = supervisor(&bus, &network);

    assert_eq!(sup.scan().reconfigured, 0);
    assert_eq!(sup.scan().reconfigured, 0);
    assert_eq!(bus.count(|c| *c == Call::Reconfigure(1)), 2);
    assert!(network.group_needs_check(0));
}

#[test]
fn unresponsive_device_is_marked_lost_then_recovered() {
    let bus = ScriptedBus::new(|s| {
        s.states.push_back(vec![status(1, DeviceState::NONE)]);
        s.recover_results.extend([false, true]);
    });
    let network = network_with(&[(1, 0)]);
    let sup = supervisor(&bus, &network);

    // NONE on read-back and again on the bounded re-check.
    let first = sup.scan();
    assert_eq!(first.marked_lost, 1);
    assert!(network.device(1).unwrap().lost);
    assert_eq!(
        bus.count(|c| *c == Call::WaitForState(Target::Device(1), AlState::Operational)),
        1
    );

    let second = sup.scan();
    assert_eq!(second.marked_lost, 0);
    assert_eq!(second.recovered, 1);
    assert!(!network.device(1).unwrap().lost);
    // Already lost: no second re-check.
    assert_eq!(
        bus.count(|c| matches!(c, Call::WaitForState(Target::Device(_), _))),
        1
    );
    assert_eq!(bus.count(|c| *c == Call::Recover(1)), 2);
}

#[test]
fn device_answering_the_recheck_is_not_lost() {
    let bus = ScriptedBus::new(|s| {
        s.states.push_back(vec![status(1, DeviceState::NONE)]);
        s.rechecks.push_back(DeviceState::OPERATIONAL);
    });
    let network = network_with(&[(1, 0)]);

    let report = supervisor(&bus, &network).scan();

    assert_eq!(report.marked_lost, 0);
    assert!(!network.device(1).unwrap().lost);
    assert_eq!(bus.count(|c| matches!(c, Call::Recover(_))), 0);
}

#[test]
fn lost_device_reappearing_is_found() {
    let bus = ScriptedBus::new(|s| s.states.push_back(vec![status(1, DeviceState::INIT)]));
    let network = network_with(&[(1, 0)]);
    network.update_device(1, |d| d.lost = true);

    let report = supervisor(&bus, &network).scan();

    assert_eq!(report.found, 1);
    assert!(!network.device(1).unwrap().lost);
    assert_eq!(bus.count(|c| matches!(c, Call::Recover(_))), 0);
}

#[test]
fn health_flag_follows_state_sequence() {
    let bus = ScriptedBus::new(|s| {
        s.states.extend([
            vec![status(1, DeviceState::OPERATIONAL)],
            vec![status(1, DeviceState::SAFE_OP)],
            vec![status(1, DeviceState::SAFE_OP)],
            vec![status(1, DeviceState::OPERATIONAL)],
        ]);
    });
    let network = network_with(&[(1, 0)]);
    let sup = supervisor(&bus, &network);

    let scan1 = sup.scan();
    assert!(scan1.healthy);
    assert!(!network.group_needs_check(0));
    assert_eq!(op_requests(&bus, 1), 0);

    let scan2 = sup.scan();
    assert!(!scan2.healthy);
    assert!(network.group_needs_check(0));

    let scan3 = sup.scan();
    assert!(network.group_needs_check(0));
    assert!(scan2.requested_op + scan3.requested_op >= 1);

    let scan4 = sup.scan();
    assert!(scan4.healthy);
    assert!(!network.group_needs_check(0));
    assert_eq!(op_requests(&bus, 1), 2);
}

#[test]
fn devices_of_other_groups_are_left_alone() {
    let bus = ScriptedBus::new(|s| {
        s.states.push_back(vec![
            status(1, DeviceState::OPERATIONAL),
            DeviceStatus {
                group: 1,
                ..status(2, DeviceState::SAFE_OP)
            },
        ]);
    });
    let network = network_with(&[(1, 0), (2, 1)]);

    let report = supervisor(&bus, &network).scan();

    assert!(report.healthy);
    assert_eq!(bus.count(|c| matches!(c, Call::RequestState(..))), 0);
}

#[test]
fn failing_state_request_does_not_abort_scan() {
    let bus = ScriptedBus::new(|s| {
        s.states.push_back(vec![
            status(1, DeviceState::SAFE_OP),
            status(2, DeviceState::SAFE_OP_ERROR),
        ]);
        s.request_fails = true;
    });
    let network = network_with(&[(1, 0), (2, 0)]);

    let report = supervisor(&bus, &network).scan();

    assert_eq!(report.requested_op, 1);
    assert_eq!(report.acknowledged, 1);
}

#[test]
fn poll_scans_only_when_triggered() {
    let bus = ScriptedBus::new(|s| s.states.push_back(vec![status(1, DeviceState::OPERATIONAL)]));
    let network = network_with(&[(1, 0)]);
    let sup = supervisor(&bus, &network);

    network.record_exchange(0, &Exchange { wkc: 3, ..Default::default() });
    assert!(sup.poll().is_none());

    network.record_exchange(0, &Exchange { wkc: 1, ..Default::default() });
    assert!(sup.poll().is_some());

    network.set_in_op(false);
    assert!(sup.poll().is_none());
    assert_eq!(bus.count(|c| *c == Call::ReadStates), 1);
}

#[test]
fn spawned_supervisor_recovers_and_stops() {
    let bus = ScriptedBus::new(|s| {
        s.states.push_back(vec![status(1, DeviceState::SAFE_OP)]);
        s.states.push_back(vec![status(1, DeviceState::OPERATIONAL)]);
    });
    let network = network_with(&[(1, 0)]);
    network.set_group_needs_check(0, true);

    let config = SupervisorConfig {
        interval_us: 1_000,
        ..SupervisorConfig::default()
    };
    let handle = Supervisor::new(bus.clone(), network.clone(), config, 0)
        .spawn(Arc::new(AtomicBool::new(true)))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while (op_requests(&bus, 1) == 0 || network.group_needs_check(0)) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    handle.stop();

    assert!(!network.group_needs_check(0));
    assert_eq!(op_requests(&bus, 1), 1);
}

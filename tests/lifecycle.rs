//! Connection lifecycle against the simulated rig

mod common;

use common::{eventually, record_lines, record_transitions, rig_manager};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use valvelink_core::core::simulator::OpenFailure;
use valvelink_core::{
    Command, ConnectError, SendError, SimulatorConfig, TransportError, ValveTelemetry,
};

#[tokio::test]
async fn connect_and_disconnect() {
    let (rig, manager) = rig_manager(SimulatorConfig::default().boot_banner(&["rig ready"]));
    let lines = record_lines(&manager);
    assert!(!manager.is_connected());

    manager.connect().await.unwrap();
    assert!(manager.is_connected());
    assert_eq!(manager.device_info().as_deref(), Some("sim://valve-rig"));
    assert_eq!(rig.open_count(), 1);
    assert!(lines.lock().contains(&"rig ready".to_string()));

    manager.disconnect().await;
    assert!(!manager.is_connected());
    assert_eq!(rig.close_count(), 1);
    eventually(|| !rig.is_attached()).await;

    manager.disconnect().await;
    assert_eq!(rig.close_count(), 1);
}

#[tokio::test]
async fn send_while_disconnected_writes_nothing() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());

    assert!(matches!(manager.send("V0:45").await, Err(SendError::NotConnected)));

    manager.connect().await.unwrap();
    manager.disconnect().await;
    assert!(matches!(manager.send("V0:45").await, Err(SendError::NotConnected)));
    assert_eq!(rig.received_lines(), vec!["conn"]);
}

#[tokio::test]
async fn each_send_is_one_line() {
    let (rig, manager) = rig_manager(SimulatorConfig::default().echo_telemetry(false));
    manager.connect().await.unwrap();

    manager.send("V0:45").await.unwrap();
    manager.send("p:30").await.unwrap();
    eventually(|| rig.received_lines().len() == 3).await;

    assert_eq!(rig.received_lines(), vec!["conn", "V0:45", "p:30"]);
    assert_eq!(rig.valve_angles(), [45, 0, 0]);
    assert_eq!(rig.throttle(), 30);
    manager.disconnect().await;
}

#[tokio::test]
async fn typed_commands_and_telemetry() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    let lines = record_lines(&manager);
    manager.connect().await.unwrap();

    manager
        .send_command(&Command::set_valve(1, -30).unwrap())
        .await
        .unwrap();
    eventually(|| lines.lock().iter().any(|l| ValveTelemetry::parse(l).is_some())).await;

    let telemetry: Vec<_> = lines
        .lock()
        .iter()
        .filter_map(|l| ValveTelemetry::parse(l))
        .collect();
    assert_eq!(telemetry, vec![ValveTelemetry { valve: 1, angle: -30 }]);
    assert_eq!(rig.valve_angles(), [0, -30, 0]);

    manager
        .send_command(&Command::calibrate(2, 12).unwrap())
        .await
        .unwrap();
    eventually(|| rig.received_lines().contains(&"CALIBRATE:2:12".to_string())).await;
    manager.disconnect().await;
}

#[tokio::test]
async fn disconnect_interrupts_pending_read() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    manager.connect().await.unwrap();

    // Nothing is being sent, so the pump is parked on a read.
    tokio::time::sleep(Duration::from_millis(20)).await;
    tokio::time::timeout(Duration::from_secs(1), manager.disconnect())
        .await
        .expect("disconnect hung on a pending read");

    assert!(!manager.is_connected());
    assert_eq!(rig.close_count(), 1);
}

#[tokio::test]
async fn open_failures_leave_nothing_behind() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());

    rig.set_unavailable(true);
    assert!(matches!(
        manager.connect().await,
        Err(ConnectError::DeviceOpenFailed(TransportError::NoDeviceSelected))
    ));

    rig.set_unavailable(false);
    rig.set_open_failure(Some(OpenFailure::Busy));
    assert!(matches!(
        manager.connect().await,
        Err(ConnectError::DeviceOpenFailed(TransportError::PortInUse(_)))
    ));
    assert_eq!(rig.open_count(), 0);
    assert!(!manager.is_connected());
    assert!(matches!(manager.send("p:1").await, Err(SendError::NotConnected)));

    rig.set_open_failure(None);
    manager.connect().await.unwrap();
    assert!(manager.is_connected());
    manager.disconnect().await;
}

#[tokio::test]
async fn reentrant_connect_rejected() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    manager.connect().await.unwrap();

    assert!(matches!(manager.connect().await, Err(ConnectError::AlreadyConnected)));
    assert!(manager.is_connected());
    assert_eq!(rig.open_count(), 1);
    manager.disconnect().await;
}

#[tokio::test]
async fn concurrent_connect_rejected() {
    let (rig, manager) = rig_manager(
        SimulatorConfig::default().reply_delay(Duration::from_millis(50)),
    );

    let (first, second) = tokio::join!(manager.connect(), manager.connect());
    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ConnectError::AlreadyConnected))));
    assert_eq!(rig.open_count(), 1);
    manager.disconnect().await;
}

#[tokio::test]
async fn connect_waits_for_running_disconnect() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    manager.connect().await.unwrap();

    let ((), reconnect) = tokio::join!(manager.disconnect(), manager.connect());
    reconnect.unwrap();
    assert!(manager.is_connected());
    assert_eq!(rig.open_count(), 2);
    assert_eq!(rig.close_count(), 1);

    manager.disconnect().await;
    assert_eq!(rig.close_count(), 2);
}

#[tokio::test]
async fn send_refused_once_link_is_lost() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    manager.connect().await.unwrap();
    rig.unplug();
    eventually(|| !manager.is_connected()).await;

    assert!(matches!(manager.send("V0:45").await, Err(SendError::NotConnected)));
    manager.disconnect().await;
}

#[tokio::test]
async fn unplug_reports_disconnection_once() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    record_transitions(&manager, &log, "ui");

    manager.connect().await.unwrap();
    assert!(rig.unplug());
    eventually(|| !manager.is_connected()).await;
    assert_eq!(*log.lock(), vec!["ui:true", "ui:false"]);

    manager.disconnect().await;
    assert_eq!(*log.lock(), vec!["ui:true", "ui:false"]);
    assert_eq!(rig.close_count(), 1);
}

#[tokio::test]
async fn reconnect_after_unplug() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    manager.connect().await.unwrap();
    rig.unplug();
    eventually(|| !manager.is_connected()).await;

    manager.connect().await.unwrap();
    assert!(manager.is_connected());
    assert_eq!(rig.open_count(), 2);
    assert_eq!(rig.close_count(), 1);

    manager.disconnect().await;
    assert_eq!(rig.close_count(), 2);
}

#[tokio::test]
async fn line_split_across_writes_is_reassembled() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    let lines = record_lines(&manager);
    manager.connect().await.unwrap();

    rig.inject("V0: 1");
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.inject("5°\r\nV1: 2°\r\n");
    eventually(|| lines.lock().iter().any(|l| l.starts_with("V1"))).await;

    let lines: Vec<String> = lines.lock().iter().filter(|l| *l != "conn").cloned().collect();
    assert_eq!(lines, vec!["V0: 15°", "V1: 2°"]);
    manager.disconnect().await;
}

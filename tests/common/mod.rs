//! Shared helpers for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use valvelink_core::{ManagerConfig, SerialManager, SimulatedRig, SimulatorConfig};

/// Manager wired to a fresh simulated rig
pub fn rig_manager(config: SimulatorConfig) -> (SimulatedRig, Arc<SerialManager>) {
    let rig = SimulatedRig::new(config);
    let manager = Arc::new(SerialManager::new(rig.clone(), ManagerConfig::default()));
    (rig, manager)
}

/// Collect every received line
pub fn record_lines(manager: &SerialManager) -> Arc<Mutex<Vec<String>>> {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    manager.on_receive(move |line| sink.lock().push(line.to_string()));
    lines
}

/// Collect connection events tagged with a listener name
pub fn record_transitions(
    manager: &SerialManager,
    log: &Arc<Mutex<Vec<String>>>,
    name: &'static str,
) {
    let log = log.clone();
    manager.on_connection_change(move |up| log.lock().push(format!("{name}:{up}")));
}

/// Wait until `cond` holds, panicking after one second
pub async fn eventually<F: Fn() -> bool>(cond: F) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

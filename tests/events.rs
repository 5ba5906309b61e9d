//! Connection event ordering

mod common;

use common::{record_transitions, rig_manager};
use parking_lot::Mutex;
use std::sync::Arc;
use valvelink_core::{ProbeReply, SimulatorConfig};

#[tokio::test]
async fn listeners_notified_in_registration_order() {
    let (_rig, manager) = rig_manager(SimulatorConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    record_transitions(&manager, &log, "a");
    record_transitions(&manager, &log, "b");

    manager.connect().await.unwrap();
    assert_eq!(*log.lock(), vec!["a:true", "b:true"]);

    record_transitions(&manager, &log, "late");
    manager.disconnect().await;
    assert_eq!(
        *log.lock(),
        vec!["a:true", "b:true", "a:false", "b:false", "late:false"]
    );

    manager.disconnect().await;
    assert_eq!(log.lock().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn failed_handshake_fires_no_event() {
    let (_rig, manager) =
        rig_manager(SimulatorConfig::default().probe_reply(ProbeReply::Never));
    let log = Arc::new(Mutex::new(Vec::new()));
    record_transitions(&manager, &log, "a");

    assert!(manager.connect().await.is_err());
    manager.disconnect().await;
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn listener_sees_status_already_updated() {
    let (_rig, manager) = rig_manager(SimulatorConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        let weak = Arc::downgrade(&manager);
        manager.on_connection_change(move |up| {
            let status = weak.upgrade().map(|m| m.is_connected());
            seen.lock().push((up, status));
        });
    }

    manager.connect().await.unwrap();
    manager.disconnect().await;
    assert_eq!(*seen.lock(), vec![(true, Some(true)), (false, Some(false))]);
}

#[tokio::test]
async fn last_line_observer_wins() {
    let (rig, manager) = rig_manager(SimulatorConfig::default());
    let first = Arc::new(Mutex::new(Vec::<String>::new()));
    let second = Arc::new(Mutex::new(Vec::<String>::new()));
    {
        let first = first.clone();
        manager.on_receive(move |l| first.lock().push(l.to_string()));
    }
    manager.connect().await.unwrap();
    {
        let second = second.clone();
        manager.on_receive(move |l| second.lock().push(l.to_string()));
    }

    rig.inject("hello\n");
    common::eventually(|| !second.lock().is_empty()).await;
    assert_eq!(*second.lock(), vec!["hello"]);
    assert!(!first.lock().contains(&"hello".to_string()));
    manager.disconnect().await;
}

//! End-to-end reconciliation and pairing scenarios across the
//! registry, store, and pairing coordinator.

mod mock_remote;

use std::sync::Arc;

use mock_remote::MockRemote;
use tv_control_bridge::bus::create_bus;
use tv_control_bridge::control::{volume_mode, ControlPoint, VolumeMode};
use tv_control_bridge::device::{DeviceRecord, DiscoveredDevice};
use tv_control_bridge::pairing::PairingCoordinator;
use tv_control_bridge::registry::{DeviceRegistry, SharedRegistry};
use tv_control_bridge::store::DeviceStore;

fn descriptor(usn: &str, capabilities: &[&str]) -> DiscoveredDevice {
    DiscoveredDevice {
        usn: usn.to_string(),
        name: format!("TV {usn}"),
        model_name: Some("UE55".to_string()),
        location: format!("http://10.0.0.2/{usn}.xml"),
        ip: Some("10.0.0.2".to_string()),
        mac: None,
        capabilities: if capabilities.is_empty() {
            None
        } else {
            Some(capabilities.iter().map(|s| s.to_string()).collect())
        },
    }
}

#[tokio::test]
async fn fresh_device_with_get_volume() {
    // No prior store, no configuration, discovery reports GetVolume.
    let dir = tempfile::tempdir().unwrap();
    let registry: SharedRegistry =
        Arc::new(DeviceRegistry::new(DeviceStore::new(dir.path()), vec![]));

    let merged = registry
        .reconcile(vec![descriptor("u1", &["GetVolume"])])
        .await
        .unwrap();

    assert_eq!(merged.len(), 1);
    assert!(merged[0].discovered);
    assert_eq!(merged[0].delay, 500);
    assert_eq!(volume_mode(&merged[0]), VolumeMode::AbsoluteAndRelative);

    // GetMute is absent, so mute reads as false whatever the TV state.
    let remote = Arc::new(MockRemote::new());
    remote.set_device_state(10, true, true);
    let point = ControlPoint::new(&merged[0], registry, remote, create_bus());
    assert!(!point.get_mute().await.unwrap());
}

#[tokio::test]
async fn undiscovered_ignored_device_is_retained_and_not_paired() {
    let dir = tempfile::tempdir().unwrap();
    let store = DeviceStore::new(dir.path());

    let mut prior = DeviceRecord::new("u2");
    prior.ignore = true;
    prior.token = Some("T".to_string());
    store.replace(&[prior]).unwrap();

    let registry: SharedRegistry = Arc::new(DeviceRegistry::new(store, vec![]));
    let merged = registry.reconcile(vec![]).await.unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].usn, "u2");
    assert!(!merged[0].discovered);
    assert!(merged[0].ignore);
    assert_eq!(merged[0].token.as_deref(), Some("T"));

    let remote = Arc::new(MockRemote::new());
    let pairing = PairingCoordinator::new(registry, remote.clone(), create_bus());
    let paired = pairing.pair_discovered(&merged).await;

    assert_eq!(paired, 0);
    assert!(remote.calls().is_empty(), "no pairing attempt for u2");
}

#[tokio::test]
async fn pairing_failure_does_not_block_other_devices() {
    let dir = tempfile::tempdir().unwrap();
    let store = DeviceStore::new(dir.path());
    let registry: SharedRegistry = Arc::new(DeviceRegistry::new(store.clone(), vec![]));

    let merged = registry
        .reconcile(vec![descriptor("u1", &[]), descriptor("u2", &[])])
        .await
        .unwrap();

    let remote = Arc::new(MockRemote::new());
    remote.deny_pairing_for("u1");

    let pairing = PairingCoordinator::new(registry.clone(), remote.clone(), create_bus());
    let paired = pairing.pair_discovered(&merged).await;

    assert_eq!(paired, 1);
    let persisted = store.load().unwrap();
    let u1 = persisted.iter().find(|d| d.usn == "u1").unwrap();
    let u2 = persisted.iter().find(|d| d.usn == "u2").unwrap();
    assert!(u1.token.is_none());
    assert_eq!(u2.token.as_deref(), Some("token-u2"));
}

#[tokio::test]
async fn carried_forward_devices_are_not_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let store = DeviceStore::new(dir.path());
    let registry: SharedRegistry = Arc::new(DeviceRegistry::new(store, vec![]));

    // First pass discovers u1; second pass does not see it.
    registry
        .reconcile(vec![descriptor("u1", &[])])
        .await
        .unwrap();
    let second = registry.reconcile(vec![]).await.unwrap();

    let remote = Arc::new(MockRemote::new());
    let pairing = PairingCoordinator::new(registry, remote.clone(), create_bus());
    assert_eq!(pairing.pair_discovered(&second).await, 0);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn persistence_failure_is_fatal_and_preserves_state() {
    // Point the store's data dir at a regular file so the write fails.
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, "not a directory").unwrap();

    let registry: SharedRegistry =
        Arc::new(DeviceRegistry::new(DeviceStore::new(&blocked), vec![]));

    let result = registry.reconcile(vec![descriptor("u1", &[])]).await;
    assert!(result.is_err());
    // The in-memory view was never updated with the unpersisted merge.
    assert!(registry.devices().await.is_empty());
}

#[tokio::test]
async fn token_survives_rediscovery() {
    let dir = tempfile::tempdir().unwrap();
    let store = DeviceStore::new(dir.path());
    let registry: SharedRegistry = Arc::new(DeviceRegistry::new(store, vec![]));

    let merged = registry
        .reconcile(vec![descriptor("u1", &[])])
        .await
        .unwrap();

    let remote = Arc::new(MockRemote::new());
    let pairing = PairingCoordinator::new(registry.clone(), remote, create_bus());
    pairing.pair_discovered(&merged).await;

    // Re-discovery keeps the token while refreshing network fields.
    let merged = registry
        .reconcile(vec![descriptor("u1", &["GetVolume"])])
        .await
        .unwrap();
    assert_eq!(merged[0].token.as_deref(), Some("token-u1"));
    assert!(merged[0].has_capability("GetVolume"));
}

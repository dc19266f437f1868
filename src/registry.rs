//! Device registry - merges discovery, history, and configuration
//!
//! The registry owns the canonical device set. Each reconciliation
//! pass runs three ordered merges keyed strictly on `usn`:
//!
//! 1. discovery merge - refresh network fields on known records,
//!    create new records for unseen usns,
//! 2. history carry-forward - persisted devices absent from this
//!    pass are retained untouched with `discovered` false,
//! 3. configuration overlay - user-configured fields overwrite the
//!    merged record, every pass.
//!
//! The merged set replaces the persisted store in full before it is
//! returned; a failed write aborts the pass and keeps the old store.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::device::{DeviceConfig, DeviceRecord, DiscoveredDevice};
use crate::store::DeviceStore;

pub struct DeviceRegistry {
    store: DeviceStore,
    config_devices: Vec<DeviceConfig>,
    /// In-memory view of the most recent reconciliation result.
    devices: RwLock<Vec<DeviceRecord>>,
    /// Serializes reconciliation passes; the coarse refresh timer and a
    /// triggered pass must not interleave their read-modify-write of
    /// the store.
    reconcile_guard: Mutex<()>,
}

pub type SharedRegistry = Arc<DeviceRegistry>;

impl DeviceRegistry {
    pub fn new(store: DeviceStore, config_devices: Vec<DeviceConfig>) -> Self {
        Self {
            store,
            config_devices,
            devices: RwLock::new(Vec::new()),
            reconcile_guard: Mutex::new(()),
        }
    }

    /// Snapshot of the current merged device set.
    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.devices.read().await.clone()
    }

    pub async fn device(&self, usn: &str) -> Option<DeviceRecord> {
        self.devices.read().await.iter().find(|d| d.usn == usn).cloned()
    }

    /// Run one reconciliation pass over a fresh discovery result.
    ///
    /// Returns the merged set, which has already replaced the persisted
    /// store. Store failures are fatal to the pass; the in-memory view
    /// and the on-disk document are left as they were.
    pub async fn reconcile(&self, discovered: Vec<DiscoveredDevice>) -> Result<Vec<DeviceRecord>> {
        let _pass = self.reconcile_guard.lock().await;

        let persisted = self
            .store
            .load()
            .context("reading persisted device store")?;

        let merged = merge(discovered, persisted, &self.config_devices);

        self.store
            .replace(&merged)
            .context("persisting reconciled device set")?;

        *self.devices.write().await = merged.clone();
        info!(
            "Reconciled {} device(s) ({} discovered this pass)",
            merged.len(),
            merged.iter().filter(|d| d.discovered).count()
        );
        Ok(merged)
    }

    /// Write a pairing token onto a record and persist the updated set.
    pub async fn record_token(&self, usn: &str, token: String) -> Result<()> {
        let _pass = self.reconcile_guard.lock().await;

        let mut devices = self.devices.write().await;
        let Some(device) = devices.iter_mut().find(|d| d.usn == usn) else {
            anyhow::bail!("unknown device {usn}");
        };
        device.token = Some(token);
        self.store
            .replace(&devices)
            .context("persisting pairing token")?;
        Ok(())
    }
}

/// Pure three-pass merge. Split out of the registry so the merge policy
/// is testable without a filesystem.
pub fn merge(
    discovered: Vec<DiscoveredDevice>,
    persisted: Vec<DeviceRecord>,
    configured: &[DeviceConfig],
) -> Vec<DeviceRecord> {
    let mut merged: Vec<DeviceRecord> = Vec::with_capacity(discovered.len() + persisted.len());

    // Pass 1: discovery merge. Keep identity/control fields from the
    // persisted record, refresh what the network told us.
    for desc in discovered {
        let mut record = persisted
            .iter()
            .find(|p| p.usn == desc.usn)
            .cloned()
            .unwrap_or_else(|| {
                info!("New device discovered: {} ({})", desc.name, desc.usn);
                let mut r = DeviceRecord::new(desc.usn.clone());
                r.name = desc.name.clone();
                r
            });

        if !desc.name.is_empty() {
            record.name = desc.name;
        }
        record.model_name = desc.model_name;
        record.last_known_location = Some(desc.location);
        if desc.ip.is_some() {
            record.last_known_ip = desc.ip;
        }
        if desc.mac.is_some() {
            record.mac = desc.mac;
        }
        if desc.capabilities.is_some() {
            record.capabilities = desc.capabilities;
        }
        record.discovered = true;
        if record.first_seen.is_none() {
            record.first_seen = Some(Utc::now());
        }
        merged.push(record);
    }

    // Pass 2: carry forward persisted devices the current pass did not
    // see. Never silently dropped; `discovered` stays false.
    for record in persisted {
        if merged.iter().any(|m| m.usn == record.usn) {
            continue;
        }
        debug!("Device {} not seen this pass, carried forward", record.usn);
        let mut record = record;
        record.discovered = false;
        merged.push(record);
    }

    // Pass 3: configuration overlay. Configuration wins per field on
    // every pass, so it is never weaker than prior state.
    for conf in configured {
        let Some(record) = merged.iter_mut().find(|m| m.usn == conf.usn) else {
            warn!(
                "Configured device {} has never been seen on the network, ignoring entry",
                conf.usn
            );
            continue;
        };
        apply_config(record, conf);
    }

    merged
}

fn apply_config(record: &mut DeviceRecord, conf: &DeviceConfig) {
    if let Some(v) = &conf.name {
        record.name = v.clone();
    }
    if let Some(v) = &conf.model_name {
        record.model_name = Some(v.clone());
    }
    if let Some(v) = &conf.last_known_ip {
        record.last_known_ip = Some(v.clone());
    }
    if let Some(v) = &conf.mac {
        record.mac = Some(v.clone());
    }
    if let Some(v) = conf.remote_control_port {
        record.remote_control_port = Some(v);
    }
    if let Some(v) = &conf.token {
        record.token = Some(v.clone());
    }
    if let Some(v) = conf.delay {
        record.delay = v;
    }
    if let Some(v) = conf.ignore {
        record.ignore = v;
    }
    if let Some(v) = &conf.inputs {
        record.inputs = v.clone();
    }
    if let Some(v) = conf.disable_upnp_setters {
        record.disable_upnp_setters = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InputEntry;

    fn desc(usn: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            usn: usn.to_string(),
            name: format!("TV {usn}"),
            model_name: Some("UE55".to_string()),
            location: format!("http://10.0.0.2/{usn}.xml"),
            ip: Some("10.0.0.2".to_string()),
            mac: None,
            capabilities: None,
        }
    }

    #[test]
    fn new_device_gets_defaults() {
        let merged = merge(vec![desc("u1")], vec![], &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].usn, "u1");
        assert_eq!(merged[0].delay, 500);
        assert!(merged[0].discovered);
        assert!(merged[0].token.is_none());
    }

    #[test]
    fn rediscovery_keeps_token_refreshes_network_fields() {
        let mut prior = DeviceRecord::new("u1");
        prior.token = Some("T".to_string());
        prior.last_known_ip = Some("10.0.0.9".to_string());
        prior.model_name = Some("OLD".to_string());

        let merged = merge(vec![desc("u1")], vec![prior], &[]);
        assert_eq!(merged[0].token.as_deref(), Some("T"));
        assert_eq!(merged[0].model_name.as_deref(), Some("UE55"));
        assert_eq!(merged[0].last_known_ip.as_deref(), Some("10.0.0.2"));
        assert!(merged[0].discovered);
    }

    #[test]
    fn carry_forward_retains_undiscovered_devices() {
        let mut prior = DeviceRecord::new("u2");
        prior.ignore = true;
        prior.token = Some("T".to_string());

        let merged = merge(vec![desc("u1")], vec![prior.clone()], &[]);
        assert_eq!(merged.len(), 2);
        let carried = merged.iter().find(|d| d.usn == "u2").unwrap();
        assert!(!carried.discovered);
        assert!(carried.ignore);
        assert_eq!(carried.token.as_deref(), Some("T"));
    }

    #[test]
    fn configuration_wins_over_discovery_and_history() {
        let mut prior = DeviceRecord::new("u1");
        prior.name = "Persisted".to_string();

        let conf = DeviceConfig {
            usn: "u1".to_string(),
            name: Some("Configured".to_string()),
            delay: Some(1000),
            ignore: Some(true),
            inputs: Some(vec![InputEntry {
                name: "HDMI 2".to_string(),
                keys: "KEY_HDMI2".to_string(),
            }]),
            ..Default::default()
        };

        let merged = merge(vec![desc("u1")], vec![prior], &[conf]);
        assert_eq!(merged[0].name, "Configured");
        assert_eq!(merged[0].delay, 1000);
        assert!(merged[0].ignore);
        assert_eq!(merged[0].inputs.len(), 1);
    }

    #[test]
    fn unmatched_config_entry_is_ignored() {
        let conf = DeviceConfig {
            usn: "never-seen".to_string(),
            name: Some("Ghost".to_string()),
            ..Default::default()
        };
        let merged = merge(vec![desc("u1")], vec![], &[conf]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].usn, "u1");
    }

    #[test]
    fn merge_is_idempotent_as_persisted() {
        let conf = DeviceConfig {
            usn: "u1".to_string(),
            delay: Some(250),
            ..Default::default()
        };

        let first = merge(vec![desc("u1"), desc("u3")], vec![DeviceRecord::new("u2")], &[conf.clone()]);
        let second = merge(vec![desc("u1"), desc("u3")], first.clone(), &[conf]);

        // Reconciling the same input twice must persist the same
        // document byte for byte. `discovered` is never serialized.
        let first_doc = serde_json::to_string_pretty(&first).unwrap();
        let second_doc = serde_json::to_string_pretty(&second).unwrap();
        assert_eq!(first_doc, second_doc);
    }

    #[test]
    fn first_seen_stamped_once_and_kept() {
        let first = merge(vec![desc("u1")], vec![], &[]);
        let stamp = first[0].first_seen;
        assert!(stamp.is_some());

        let second = merge(vec![desc("u1")], first, &[]);
        assert_eq!(second[0].first_seen, stamp);
    }

    #[test]
    fn usn_preserved_verbatim() {
        let merged = merge(
            vec![desc("uuid:AA-bb_0")],
            vec![DeviceRecord::new("uuid:CC")],
            &[],
        );
        let usns: Vec<_> = merged.iter().map(|d| d.usn.as_str()).collect();
        assert!(usns.contains(&"uuid:AA-bb_0"));
        assert!(usns.contains(&"uuid:CC"));
    }

    #[tokio::test]
    async fn reconcile_persists_and_exposes_merged_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::new(dir.path());
        let registry = DeviceRegistry::new(store.clone(), vec![]);

        registry.reconcile(vec![desc("u1")]).await.unwrap();
        assert_eq!(registry.devices().await.len(), 1);
        assert_eq!(store.load().unwrap().len(), 1);

        // Second pass without u1: carried forward, still persisted.
        registry.reconcile(vec![]).await.unwrap();
        let devices = registry.devices().await;
        assert_eq!(devices.len(), 1);
        assert!(!devices[0].discovered);
    }

    #[tokio::test]
    async fn record_token_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::new(dir.path());
        let registry = DeviceRegistry::new(store.clone(), vec![]);

        registry.reconcile(vec![desc("u1")]).await.unwrap();
        registry.record_token("u1", "TOK".to_string()).await.unwrap();

        assert_eq!(store.load().unwrap()[0].token.as_deref(), Some("TOK"));
        assert!(registry.record_token("nope", "x".to_string()).await.is_err());
    }
}

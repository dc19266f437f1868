//! Pairing coordination
//!
//! After a reconciliation pass, every device that was actually seen
//! this pass (and is not ignored) gets one pairing attempt. A failure
//! is logged and reported on the bus; it never blocks the other
//! devices, and the device simply stays token-less until a later pass
//! or a user-triggered retry.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::device::DeviceRecord;
use crate::registry::SharedRegistry;
use crate::remote::TvRemote;

pub struct PairingCoordinator {
    registry: SharedRegistry,
    remote: Arc<dyn TvRemote>,
    bus: SharedBus,
}

impl PairingCoordinator {
    pub fn new(registry: SharedRegistry, remote: Arc<dyn TvRemote>, bus: SharedBus) -> Self {
        Self {
            registry,
            remote,
            bus,
        }
    }

    /// Attempt pairing for each eligible record of one reconciliation
    /// pass: `discovered` this pass and not ignored. Carried-forward
    /// history is never paired. Returns how many devices paired.
    pub async fn pair_discovered(&self, devices: &[DeviceRecord]) -> usize {
        let mut paired = 0;

        for device in devices {
            if !device.discovered || device.ignore {
                continue;
            }

            match self.remote.get_pairing(device).await {
                Ok(token) => {
                    info!("Paired with {} ({})", device.name, device.usn);
                    if let Err(e) = self.registry.record_token(&device.usn, token).await {
                        warn!("Failed to persist token for {}: {:#}", device.usn, e);
                        continue;
                    }
                    self.bus.publish(BusEvent::PairingSucceeded {
                        usn: device.usn.clone(),
                    });
                    paired += 1;
                }
                Err(e) => {
                    warn!("Pairing failed for {} ({}): {}", device.name, device.usn, e);
                    self.bus.publish(BusEvent::PairingFailed {
                        usn: device.usn.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        paired
    }
}

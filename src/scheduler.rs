//! Periodic refresh
//!
//! Two independent timers, started once after initial registration:
//! a coarse re-discovery/reconcile pass and a fine per-device
//! reachability poll. The coarse pass does not re-attempt pairing and
//! does not create control points for devices that first appear after
//! startup; those get a control point on the next restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::control::ControlPoint;
use crate::discovery::Discovery;
use crate::registry::SharedRegistry;

pub const COARSE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const FINE_INTERVAL: Duration = Duration::from_secs(15);

pub struct RefreshScheduler {
    registry: SharedRegistry,
    discovery: Arc<dyn Discovery>,
    bus: SharedBus,
    shutdown: CancellationToken,
    coarse_interval: Duration,
    fine_interval: Duration,
}

impl RefreshScheduler {
    pub fn new(
        registry: SharedRegistry,
        discovery: Arc<dyn Discovery>,
        bus: SharedBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            discovery,
            bus,
            shutdown,
            coarse_interval: COARSE_INTERVAL,
            fine_interval: FINE_INTERVAL,
        }
    }

    /// Override the timer periods (short periods keep tests fast).
    pub fn with_intervals(mut self, coarse: Duration, fine: Duration) -> Self {
        self.coarse_interval = coarse;
        self.fine_interval = fine;
        self
    }

    /// Spawn the coarse reconcile task plus one fine poll task per
    /// control point. All tasks stop on the shutdown token.
    pub fn start(&self, points: &[Arc<ControlPoint>]) {
        let registry = self.registry.clone();
        let discovery = self.discovery.clone();
        let bus = self.bus.clone();
        let shutdown = self.shutdown.clone();
        let coarse = self.coarse_interval;

        tokio::spawn(async move {
            let mut ticker = interval(coarse);
            // interval fires immediately; the initial pass already ran.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Coarse refresh loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_coarse_pass(&registry, discovery.as_ref(), &bus).await;
                    }
                }
            }
        });

        for point in points {
            let point = point.clone();
            let shutdown = self.shutdown.clone();
            let fine = self.fine_interval;

            tokio::spawn(async move {
                let mut ticker = interval(fine);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            debug!("Fine poll loop for {} shutting down", point.usn());
                            break;
                        }
                        _ = ticker.tick() => {
                            point.refresh_active().await;
                        }
                    }
                }
            });
        }

        info!(
            "Refresh scheduler started ({} fine poll task(s), coarse every {:?})",
            points.len(),
            coarse
        );
    }
}

/// One coarse tick: re-discover and reconcile. Discovery failure yields
/// an empty pass (history carries forward); a reconcile failure keeps
/// the previous state.
async fn run_coarse_pass(registry: &SharedRegistry, discovery: &dyn Discovery, bus: &SharedBus) {
    let discovered = match discovery.discover().await {
        Ok(devices) => devices,
        Err(e) => {
            warn!("Discovery failed, carrying history forward: {:#}", e);
            Vec::new()
        }
    };

    match registry.reconcile(discovered).await {
        Ok(merged) => {
            bus.publish(BusEvent::DevicesReconciled {
                count: merged.len(),
            });
        }
        Err(e) => error!("Reconciliation pass failed, keeping previous state: {:#}", e),
    }
}

//! Control dispatcher
//!
//! One [`ControlPoint`] per non-ignored device translates abstract
//! control intents (power, volume, mute, brightness, keys, input
//! switching) into remote calls, applying capability gates and volume
//! control-mode selection. Remote failures propagate to the caller
//! unreshaped; nothing here retries.

pub mod keys;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::device::DeviceRecord;
use crate::inputs::{resolve_inputs, InputAction, InputSource};
use crate::registry::SharedRegistry;
use crate::remote::{RemoteError, TvRemote};

/// How long a non-tuner input activation stays the "current input"
/// before the indicator reverts to index 0. Most app and key-sequence
/// activations are momentary, not durable input changes.
pub const INPUT_REVERT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("control not offered by this device")]
    NotOffered,
    #[error("no such input index {0}")]
    NoSuchInput(usize),
    #[error("device {0} is no longer known")]
    UnknownDevice(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Which volume controls a device's control point offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeMode {
    /// No `GetVolume` capability: only relative stepping.
    RelativeOnly,
    /// Absolute get/set plus the relative step convenience.
    AbsoluteAndRelative,
}

pub fn volume_mode(device: &DeviceRecord) -> VolumeMode {
    if device.has_capability("GetVolume") {
        VolumeMode::AbsoluteAndRelative
    } else {
        VolumeMode::RelativeOnly
    }
}

/// Observable state mirrored to the control surface.
#[derive(Debug, Clone, Default)]
pub struct Observed {
    pub active: bool,
    pub volume: u8,
    pub muted: bool,
    pub input_index: usize,
}

pub struct ControlPoint {
    usn: String,
    registry: SharedRegistry,
    remote: Arc<dyn TvRemote>,
    bus: SharedBus,
    sources: Vec<InputSource>,
    observed: Arc<RwLock<Observed>>,
    /// Cancellation token of the pending input-revert timer, if any.
    pending_revert: Mutex<Option<CancellationToken>>,
    revert_delay: Duration,
}

impl ControlPoint {
    pub fn new(
        device: &DeviceRecord,
        registry: SharedRegistry,
        remote: Arc<dyn TvRemote>,
        bus: SharedBus,
    ) -> Self {
        Self {
            usn: device.usn.clone(),
            sources: resolve_inputs(device),
            registry,
            remote,
            bus,
            observed: Arc::new(RwLock::new(Observed::default())),
            pending_revert: Mutex::new(None),
            revert_delay: INPUT_REVERT_DELAY,
        }
    }

    /// Override the revert delay (short delays keep tests fast).
    pub fn with_revert_delay(mut self, delay: Duration) -> Self {
        self.revert_delay = delay;
        self
    }

    pub fn usn(&self) -> &str {
        &self.usn
    }

    /// The ordered, selectable input list.
    pub fn sources(&self) -> &[InputSource] {
        &self.sources
    }

    pub async fn observed(&self) -> Observed {
        self.observed.read().await.clone()
    }

    /// Current record snapshot; the registry refreshes it on every
    /// reconciliation pass.
    async fn record(&self) -> Result<DeviceRecord, ControlError> {
        self.registry
            .device(&self.usn)
            .await
            .ok_or_else(|| ControlError::UnknownDevice(self.usn.clone()))
    }

    // ------------------------------------------------------------------
    // Power
    // ------------------------------------------------------------------

    pub async fn get_active(&self) -> Result<bool, ControlError> {
        let device = self.record().await?;
        Ok(self.remote.get_active(&device).await?)
    }

    /// Issue the on/off call and immediately echo the requested state.
    /// The fine poll corrects the echo if reality disagrees.
    pub async fn set_active(&self, active: bool) -> Result<(), ControlError> {
        let device = self.record().await?;
        self.remote.set_active(&device, active).await?;
        self.observed.write().await.active = active;
        self.bus.publish(BusEvent::ActiveChanged {
            usn: self.usn.clone(),
            active,
        });
        Ok(())
    }

    /// One fine-poll tick: any failure reads as "off", never an error.
    pub async fn refresh_active(&self) {
        let active = match self.record().await {
            Ok(device) => self.remote.get_active(&device).await.unwrap_or(false),
            Err(_) => false,
        };
        self.observed.write().await.active = active;
        self.bus.publish(BusEvent::ActiveChanged {
            usn: self.usn.clone(),
            active,
        });
    }

    // ------------------------------------------------------------------
    // Volume and mute
    // ------------------------------------------------------------------

    pub async fn volume_mode(&self) -> Result<VolumeMode, ControlError> {
        Ok(volume_mode(&self.record().await?))
    }

    pub async fn get_volume(&self) -> Result<u8, ControlError> {
        let device = self.record().await?;
        if !device.has_capability("GetVolume") {
            return Err(ControlError::NotOffered);
        }
        Ok(self.remote.get_volume(&device).await?)
    }

    pub async fn set_volume(&self, volume: u8) -> Result<(), ControlError> {
        let device = self.record().await?;
        if !device.has_capability("GetVolume") {
            return Err(ControlError::NotOffered);
        }
        self.remote.set_volume(&device, volume).await?;
        self.after_volume_change(&device).await;
        Ok(())
    }

    /// Relative step, offered regardless of `GetVolume`.
    pub async fn volume_step(&self, up: bool) -> Result<(), ControlError> {
        let device = self.record().await?;
        if up {
            self.remote.volume_up(&device).await?;
        } else {
            self.remote.volume_down(&device).await?;
        }
        self.after_volume_change(&device).await;
        Ok(())
    }

    /// The device auto-unmutes on any volume change; mirror that, then
    /// re-read and republish the absolute volume where readable.
    async fn after_volume_change(&self, device: &DeviceRecord) {
        let was_muted = {
            let mut obs = self.observed.write().await;
            std::mem::replace(&mut obs.muted, false)
        };
        if was_muted {
            self.bus.publish(BusEvent::MuteChanged {
                usn: self.usn.clone(),
                muted: false,
            });
        }

        if device.has_capability("GetVolume") {
            match self.remote.get_volume(device).await {
                Ok(volume) => {
                    self.observed.write().await.volume = volume;
                    self.bus.publish(BusEvent::VolumeChanged {
                        usn: self.usn.clone(),
                        volume,
                    });
                }
                Err(e) => debug!("Volume read-back failed for {}: {}", self.usn, e),
            }
        }
    }

    /// "Not muted" when the device cannot report mute state.
    pub async fn get_mute(&self) -> Result<bool, ControlError> {
        let device = self.record().await?;
        if !device.has_capability("GetMute") {
            return Ok(false);
        }
        Ok(self.remote.get_mute(&device).await?)
    }

    /// Always offered.
    pub async fn set_mute(&self, muted: bool) -> Result<(), ControlError> {
        let device = self.record().await?;
        self.remote.set_mute(&device, muted).await?;
        self.observed.write().await.muted = muted;
        self.bus.publish(BusEvent::MuteChanged {
            usn: self.usn.clone(),
            muted,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Brightness (read and write gated independently)
    // ------------------------------------------------------------------

    pub async fn get_brightness(&self) -> Result<u8, ControlError> {
        let device = self.record().await?;
        if !device.has_capability("GetBrightness") {
            return Err(ControlError::NotOffered);
        }
        Ok(self.remote.get_brightness(&device).await?)
    }

    pub async fn set_brightness(&self, brightness: u8) -> Result<(), ControlError> {
        let device = self.record().await?;
        if !device.has_capability("SetBrightness") {
            return Err(ControlError::NotOffered);
        }
        self.remote.set_brightness(&device, brightness).await?;
        self.bus.publish(BusEvent::BrightnessChanged {
            usn: self.usn.clone(),
            brightness,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Keys and inputs
    // ------------------------------------------------------------------

    /// Dispatch an abstract key identifier through the fixed table.
    pub async fn press_key(&self, identifier: &str) -> Result<(), ControlError> {
        match keys::lookup(identifier) {
            keys::KeyAction::Send(key) => {
                let device = self.record().await?;
                Ok(self.remote.send_key(&device, key).await?)
            }
            keys::KeyAction::Ignore => {
                debug!("Ignoring key identifier {:?} for {}", identifier, self.usn);
                Ok(())
            }
        }
    }

    /// Activate an input source by index. Index 0 is the built-in
    /// return-to-live-TV action; any other successful activation
    /// schedules a revert of the observed input back to index 0, and a
    /// new activation cancels the pending revert.
    pub async fn select_input(&self, index: usize) -> Result<(), ControlError> {
        let device = self.record().await?;

        if index == 0 {
            self.cancel_pending_revert().await;
            self.remote.open_tv(&device).await?;
            self.publish_input(0).await;
            return Ok(());
        }

        let source = self
            .sources
            .get(index)
            .ok_or(ControlError::NoSuchInput(index))?;

        match &source.action {
            InputAction::None => {}
            InputAction::OpenTv => self.remote.open_tv(&device).await?,
            InputAction::OpenApp(app_id) => self.remote.open_app(&device, app_id).await?,
            InputAction::SendKeys(sequence) => self.remote.send_keys(&device, sequence).await?,
        }

        self.publish_input(index).await;
        self.schedule_revert().await;
        Ok(())
    }

    async fn publish_input(&self, index: usize) {
        self.observed.write().await.input_index = index;
        self.bus.publish(BusEvent::InputChanged {
            usn: self.usn.clone(),
            index,
        });
    }

    async fn cancel_pending_revert(&self) {
        if let Some(prev) = self.pending_revert.lock().await.take() {
            prev.cancel();
        }
    }

    async fn schedule_revert(&self) {
        let token = CancellationToken::new();
        {
            let mut pending = self.pending_revert.lock().await;
            if let Some(prev) = pending.take() {
                prev.cancel();
            }
            *pending = Some(token.clone());
        }

        let observed = self.observed.clone();
        let bus = self.bus.clone();
        let usn = self.usn.clone();
        let delay = self.revert_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    observed.write().await.input_index = 0;
                    bus.publish(BusEvent::InputChanged { usn, index: 0 });
                }
            }
        });
    }
}

/// Build one control point per non-ignored device in the registry's
/// current set.
pub async fn build_control_points(
    registry: SharedRegistry,
    remote: Arc<dyn TvRemote>,
    bus: SharedBus,
) -> Vec<Arc<ControlPoint>> {
    let mut points = Vec::new();
    for device in registry.devices().await {
        if device.ignore {
            debug!("Device {} is ignored, no control point", device.usn);
            continue;
        }
        if device.capabilities.is_none() {
            warn!(
                "Device {} has no reported capabilities, offering relative volume only",
                device.usn
            );
        }
        points.push(Arc::new(ControlPoint::new(
            &device,
            registry.clone(),
            remote.clone(),
            bus.clone(),
        )));
    }
    points
}

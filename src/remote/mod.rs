//! Remote-control transport boundary
//!
//! Everything the dispatcher needs from a TV is behind the [`TvRemote`]
//! trait: pairing, power, volume/mute/brightness, key presses, and app
//! launching. The default backend ([`NetworkRemote`]) speaks UPnP
//! RenderingControl for the level-style controls and the TV's TCP
//! remote port for keys and pairing.

mod network;
mod soap;
mod tcp;

pub use network::NetworkRemote;

use async_trait::async_trait;

use crate::device::DeviceRecord;

/// Failures surfaced by the remote-control transport. These propagate
/// to the control surface unreshaped; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("device is not paired")]
    NotPaired,
    #[error("pairing declined by the TV")]
    PairingDeclined,
    #[error("device has no usable address")]
    NoAddress,
    #[error("device {0} does not expose a RenderingControl service")]
    NoRenderingControl(String),
    #[error("remote call timed out")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Abstract remote-control surface for one TV.
///
/// All calls are one-shot network operations; pacing between the keys
/// of a sequence honors the record's `delay`.
#[async_trait]
pub trait TvRemote: Send + Sync {
    /// Negotiate an authorization token with the TV. May require the
    /// user to accept a prompt on screen.
    async fn get_pairing(&self, device: &DeviceRecord) -> Result<String, RemoteError>;

    /// Whether the TV is currently reachable/on.
    async fn get_active(&self, device: &DeviceRecord) -> Result<bool, RemoteError>;
    async fn set_active(&self, device: &DeviceRecord, active: bool) -> Result<(), RemoteError>;

    async fn get_volume(&self, device: &DeviceRecord) -> Result<u8, RemoteError>;
    async fn set_volume(&self, device: &DeviceRecord, volume: u8) -> Result<(), RemoteError>;
    async fn volume_up(&self, device: &DeviceRecord) -> Result<(), RemoteError>;
    async fn volume_down(&self, device: &DeviceRecord) -> Result<(), RemoteError>;

    async fn get_mute(&self, device: &DeviceRecord) -> Result<bool, RemoteError>;
    async fn set_mute(&self, device: &DeviceRecord, muted: bool) -> Result<(), RemoteError>;

    async fn get_brightness(&self, device: &DeviceRecord) -> Result<u8, RemoteError>;
    async fn set_brightness(&self, device: &DeviceRecord, brightness: u8)
        -> Result<(), RemoteError>;

    /// Send a single `KEY_*` identifier.
    async fn send_key(&self, device: &DeviceRecord, key: &str) -> Result<(), RemoteError>;

    /// Send a key sequence, pacing between keys by the record's delay.
    async fn send_keys(&self, device: &DeviceRecord, keys: &[String]) -> Result<(), RemoteError> {
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(device.delay)).await;
            }
            self.send_key(device, key).await?;
        }
        Ok(())
    }

    async fn open_app(&self, device: &DeviceRecord, app_id: &str) -> Result<(), RemoteError>;

    /// Switch back to the live TV tuner.
    async fn open_tv(&self, device: &DeviceRecord) -> Result<(), RemoteError> {
        self.send_key(device, "KEY_TV").await
    }
}

//! Default network backend for the [`TvRemote`] trait
//!
//! Volume, mute, and brightness go over UPnP RenderingControl SOAP;
//! keys and pairing over the TV's TCP remote port; power-on is a
//! Wake-on-LAN packet, power-off is `KEY_POWEROFF`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;

use super::soap::{self, master_channel_args, SOAP_TIMEOUT};
use super::tcp::{self, DEFAULT_REMOTE_PORT};
use super::{RemoteError, TvRemote};
use crate::device::DeviceRecord;

/// App-launch endpoint exposed by newer TVs.
const APP_CONTROL_PORT: u16 = 8001;

pub struct NetworkRemote {
    http: Client,
    /// RenderingControl control URLs keyed by usn, tagged with the
    /// description location they were resolved from. A device whose
    /// location moved between passes re-resolves instead of reusing
    /// the stale URL.
    control_urls: RwLock<HashMap<String, (String, String)>>,
}

impl NetworkRemote {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(SOAP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            control_urls: RwLock::new(HashMap::new()),
        }
    }

    fn ip(device: &DeviceRecord) -> Result<String, RemoteError> {
        if let Some(ip) = &device.last_known_ip {
            return Ok(ip.clone());
        }
        device
            .last_known_location
            .as_deref()
            .and_then(|loc| url::Url::parse(loc).ok())
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .ok_or(RemoteError::NoAddress)
    }

    fn remote_port(device: &DeviceRecord) -> u16 {
        device.remote_control_port.unwrap_or(DEFAULT_REMOTE_PORT)
    }

    fn token(device: &DeviceRecord) -> Result<&str, RemoteError> {
        device.token.as_deref().ok_or(RemoteError::NotPaired)
    }

    /// Resolve (and cache) the RenderingControl control URL.
    async fn rendering_control(&self, device: &DeviceRecord) -> Result<String, RemoteError> {
        let location = device
            .last_known_location
            .as_deref()
            .ok_or(RemoteError::NoAddress)?;

        if let Some((resolved_from, url)) = self.control_urls.read().await.get(&device.usn) {
            if resolved_from == location {
                return Ok(url.clone());
            }
        }

        let url = soap::locate_rendering_control(&self.http, location)
            .await?
            .ok_or_else(|| RemoteError::NoRenderingControl(device.usn.clone()))?;

        debug!("RenderingControl for {} at {}", device.usn, url);
        self.control_urls
            .write()
            .await
            .insert(device.usn.clone(), (location.to_string(), url.clone()));
        Ok(url)
    }

    /// Local address the TV sees us from; presented during pairing.
    async fn local_ip(device_ip: &str) -> Result<String, RemoteError> {
        let socket = tokio::net::UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect((device_ip, DEFAULT_REMOTE_PORT)).await?;
        Ok(socket.local_addr()?.ip().to_string())
    }
}

impl Default for NetworkRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TvRemote for NetworkRemote {
    async fn get_pairing(&self, device: &DeviceRecord) -> Result<String, RemoteError> {
        let ip = Self::ip(device)?;
        let mac = device.mac.as_deref().unwrap_or("00:00:00:00:00:00");
        let local = Self::local_ip(&ip).await?;
        tcp::pair(&ip, Self::remote_port(device), &local, mac).await
    }

    async fn get_active(&self, device: &DeviceRecord) -> Result<bool, RemoteError> {
        let ip = Self::ip(device)?;
        Ok(tcp::probe(&ip, Self::remote_port(device)).await)
    }

    async fn set_active(&self, device: &DeviceRecord, active: bool) -> Result<(), RemoteError> {
        if active {
            let mac = device.mac.as_deref().ok_or_else(|| {
                RemoteError::Protocol("cannot wake device without a MAC address".to_string())
            })?;
            tcp::wake_on_lan(mac).await
        } else {
            self.send_key(device, "KEY_POWEROFF").await
        }
    }

    async fn get_volume(&self, device: &DeviceRecord) -> Result<u8, RemoteError> {
        let url = self.rendering_control(device).await?;
        let response =
            soap::soap_call(&self.http, &url, "GetVolume", master_channel_args()).await?;
        soap::extract_xml_value(&response, "CurrentVolume")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| RemoteError::Protocol("GetVolume returned no volume".to_string()))
    }

    async fn set_volume(&self, device: &DeviceRecord, volume: u8) -> Result<(), RemoteError> {
        let url = self.rendering_control(device).await?;
        let args = format!(
            "{}<DesiredVolume>{}</DesiredVolume>",
            master_channel_args(),
            volume.min(100)
        );
        soap::soap_call(&self.http, &url, "SetVolume", &args).await?;
        Ok(())
    }

    async fn volume_up(&self, device: &DeviceRecord) -> Result<(), RemoteError> {
        self.send_key(device, "KEY_VOLUP").await
    }

    async fn volume_down(&self, device: &DeviceRecord) -> Result<(), RemoteError> {
        self.send_key(device, "KEY_VOLDOWN").await
    }

    async fn get_mute(&self, device: &DeviceRecord) -> Result<bool, RemoteError> {
        let url = self.rendering_control(device).await?;
        let response = soap::soap_call(&self.http, &url, "GetMute", master_channel_args()).await?;
        let value = soap::extract_xml_value(&response, "CurrentMute")
            .ok_or_else(|| RemoteError::Protocol("GetMute returned no state".to_string()))?;
        Ok(value == "1" || value.eq_ignore_ascii_case("true"))
    }

    async fn set_mute(&self, device: &DeviceRecord, muted: bool) -> Result<(), RemoteError> {
        let url = self.rendering_control(device).await?;
        let args = format!(
            "{}<DesiredMute>{}</DesiredMute>",
            master_channel_args(),
            if muted { "1" } else { "0" }
        );
        soap::soap_call(&self.http, &url, "SetMute", &args).await?;
        Ok(())
    }

    async fn get_brightness(&self, device: &DeviceRecord) -> Result<u8, RemoteError> {
        let url = self.rendering_control(device).await?;
        let response =
            soap::soap_call(&self.http, &url, "GetBrightness", "<InstanceID>0</InstanceID>").await?;
        soap::extract_xml_value(&response, "CurrentBrightness")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| RemoteError::Protocol("GetBrightness returned no value".to_string()))
    }

    async fn set_brightness(
        &self,
        device: &DeviceRecord,
        brightness: u8,
    ) -> Result<(), RemoteError> {
        let url = self.rendering_control(device).await?;
        let args = format!(
            "<InstanceID>0</InstanceID><DesiredBrightness>{}</DesiredBrightness>",
            brightness.min(100)
        );
        soap::soap_call(&self.http, &url, "SetBrightness", &args).await?;
        Ok(())
    }

    async fn send_key(&self, device: &DeviceRecord, key: &str) -> Result<(), RemoteError> {
        let ip = Self::ip(device)?;
        let token = Self::token(device)?;
        tcp::send_key(&ip, Self::remote_port(device), token, key).await
    }

    async fn open_app(&self, device: &DeviceRecord, app_id: &str) -> Result<(), RemoteError> {
        let ip = Self::ip(device)?;
        let url = format!("http://{ip}:{APP_CONTROL_PORT}/api/v2/applications/{app_id}");
        let response = self.http.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::Protocol(format!(
                "app launch returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

//! In-process TvRemote stand-in for dispatcher and pairing tests.
//!
//! Records every call, keeps a tiny device model (volume, mute,
//! active), and can be told to fail specific operations or deny
//! pairing for specific usns.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use tv_control_bridge::device::DeviceRecord;
use tv_control_bridge::remote::{RemoteError, TvRemote};

#[derive(Default)]
pub struct MockRemote {
    calls: Mutex<Vec<String>>,
    volume: Mutex<u8>,
    muted: Mutex<bool>,
    active: Mutex<bool>,
    brightness: Mutex<u8>,
    fail_ops: Mutex<HashSet<String>>,
    deny_pairing: Mutex<HashSet<String>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_device_state(&self, volume: u8, muted: bool, active: bool) {
        *self.volume.lock().unwrap() = volume;
        *self.muted.lock().unwrap() = muted;
        *self.active.lock().unwrap() = active;
    }

    /// Make the named operation fail from now on.
    pub fn fail_op(&self, op: &str) {
        self.fail_ops.lock().unwrap().insert(op.to_string());
    }

    pub fn deny_pairing_for(&self, usn: &str) {
        self.deny_pairing.lock().unwrap().insert(usn.to_string());
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: &str) -> Result<(), RemoteError> {
        if self.fail_ops.lock().unwrap().contains(op) {
            Err(RemoteError::Protocol(format!("mock failure in {op}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TvRemote for MockRemote {
    async fn get_pairing(&self, device: &DeviceRecord) -> Result<String, RemoteError> {
        self.log(format!("get_pairing:{}", device.usn));
        if self.deny_pairing.lock().unwrap().contains(&device.usn) {
            return Err(RemoteError::PairingDeclined);
        }
        Ok(format!("token-{}", device.usn))
    }

    async fn get_active(&self, device: &DeviceRecord) -> Result<bool, RemoteError> {
        self.log(format!("get_active:{}", device.usn));
        self.check("get_active")?;
        Ok(*self.active.lock().unwrap())
    }

    async fn set_active(&self, device: &DeviceRecord, active: bool) -> Result<(), RemoteError> {
        self.log(format!("set_active:{}:{}", device.usn, active));
        self.check("set_active")?;
        *self.active.lock().unwrap() = active;
        Ok(())
    }

    async fn get_volume(&self, device: &DeviceRecord) -> Result<u8, RemoteError> {
        self.log(format!("get_volume:{}", device.usn));
        self.check("get_volume")?;
        Ok(*self.volume.lock().unwrap())
    }

    async fn set_volume(&self, device: &DeviceRecord, volume: u8) -> Result<(), RemoteError> {
        self.log(format!("set_volume:{}:{}", device.usn, volume));
        self.check("set_volume")?;
        *self.volume.lock().unwrap() = volume;
        *self.muted.lock().unwrap() = false;
        Ok(())
    }

    async fn volume_up(&self, device: &DeviceRecord) -> Result<(), RemoteError> {
        self.log(format!("volume_up:{}", device.usn));
        self.check("volume_up")?;
        let mut volume = self.volume.lock().unwrap();
        *volume = volume.saturating_add(1);
        *self.muted.lock().unwrap() = false;
        Ok(())
    }

    async fn volume_down(&self, device: &DeviceRecord) -> Result<(), RemoteError> {
        self.log(format!("volume_down:{}", device.usn));
        self.check("volume_down")?;
        let mut volume = self.volume.lock().unwrap();
        *volume = volume.saturating_sub(1);
        *self.muted.lock().unwrap() = false;
        Ok(())
    }

    async fn get_mute(&self, device: &DeviceRecord) -> Result<bool, RemoteError> {
        self.log(format!("get_mute:{}", device.usn));
        self.check("get_mute")?;
        Ok(*self.muted.lock().unwrap())
    }

    async fn set_mute(&self, device: &DeviceRecord, muted: bool) -> Result<(), RemoteError> {
        self.log(format!("set_mute:{}:{}", device.usn, muted));
        self.check("set_mute")?;
        *self.muted.lock().unwrap() = muted;
        Ok(())
    }

    async fn get_brightness(&self, device: &DeviceRecord) -> Result<u8, RemoteError> {
        self.log(format!("get_brightness:{}", device.usn));
        self.check("get_brightness")?;
        Ok(*self.brightness.lock().unwrap())
    }

    async fn set_brightness(
        &self,
        device: &DeviceRecord,
        brightness: u8,
    ) -> Result<(), RemoteError> {
        self.log(format!("set_brightness:{}:{}", device.usn, brightness));
        self.check("set_brightness")?;
        *self.brightness.lock().unwrap() = brightness;
        Ok(())
    }

    async fn send_key(&self, device: &DeviceRecord, key: &str) -> Result<(), RemoteError> {
        self.log(format!("send_key:{}:{}", device.usn, key));
        self.check("send_key")?;
        Ok(())
    }

    async fn open_app(&self, device: &DeviceRecord, app_id: &str) -> Result<(), RemoteError> {
        self.log(format!("open_app:{}:{}", device.usn, app_id));
        self.check("open_app")?;
        Ok(())
    }
}

//! TV Control Bridge
//!
//! Discovers networked televisions over SSDP, reconciles them with
//! persisted state and user configuration, pairs with each one, and
//! exposes a capability-gated control surface per device:
//! - power on/off (Wake-on-LAN / power key)
//! - volume: absolute when the TV reports `GetVolume`, relative always
//! - mute, and brightness where reported
//! - a fixed navigation/media key sink
//! - an ordered, selectable input list with momentary-input revert

pub mod bus;
pub mod config;
pub mod control;
pub mod device;
pub mod discovery;
pub mod inputs;
pub mod pairing;
pub mod registry;
pub mod remote;
pub mod scheduler;
pub mod store;

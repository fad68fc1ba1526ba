//! Data models for Ring devices.
//!
//! - `DeviceList`: raw device-list response
//! - `Device`: closed set of device variants (`Doorbell`, `Chime`,
//!   `StickupCam`) built by a factory keyed on `DeviceKind`
//! - `RingDevice`: capabilities every device variant shares

pub mod device;

pub use device::{Chime, Device, DeviceInfo, DeviceKind, DeviceList, Devices, Doorbell, RingDevice, StickupCam};

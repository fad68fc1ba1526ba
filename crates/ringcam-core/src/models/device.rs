//! Device models built from the device-list response.
//!
//! Device objects are thin wrappers over the raw JSON entries; the only
//! field every entry is guaranteed to carry is `description`, used as the
//! device name.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Body of `GET /clients_api/ring_devices`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub doorbots: Vec<Value>,
    #[serde(default)]
    pub authorized_doorbots: Vec<Value>,
    #[serde(default)]
    pub stickup_cams: Vec<Value>,
    #[serde(default)]
    pub chimes: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Doorbell,
    Chime,
    StickupCam,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [DeviceKind::Doorbell, DeviceKind::Chime, DeviceKind::StickupCam];

    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::Doorbell => "doorbell",
            DeviceKind::Chime => "chime",
            DeviceKind::StickupCam => "stickup_cam",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl DeviceList {
    /// Raw entries for a kind, each paired with its shared (read-only) flag.
    pub fn entries(&self, kind: DeviceKind) -> Vec<(&Value, bool)> {
        match kind {
            DeviceKind::Doorbell => self
                .doorbots
                .iter()
                .map(|e| (e, false))
                .chain(self.authorized_doorbots.iter().map(|e| (e, true)))
                .collect(),
            DeviceKind::Chime => self.chimes.iter().map(|e| (e, false)).collect(),
            DeviceKind::StickupCam => self.stickup_cams.iter().map(|e| (e, false)).collect(),
        }
    }

    /// Build device objects of one kind, skipping entries without a name.
    pub fn devices(&self, kind: DeviceKind) -> Vec<Device> {
        self.entries(kind)
            .into_iter()
            .filter_map(|(entry, shared)| Device::from_entry(kind, entry, shared))
            .collect()
    }
}

/// Fields shared by every device variant.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub id: Option<u64>,
    pub name: String,
    pub attributes: Value,
}

impl DeviceInfo {
    fn from_entry(entry: &Value) -> Option<Self> {
        let name = entry.get("description").and_then(Value::as_str)?;
        Some(Self {
            id: entry.get("id").and_then(Value::as_u64),
            name: name.to_string(),
            attributes: entry.clone(),
        })
    }

    fn matches(&self, entry: &Value) -> bool {
        match self.id {
            Some(id) => entry.get("id").and_then(Value::as_u64) == Some(id),
            None => entry.get("description").and_then(Value::as_str) == Some(self.name.as_str()),
        }
    }
}

/// Capabilities common to all devices.
pub trait RingDevice {
    fn kind(&self) -> DeviceKind;
    fn info(&self) -> &DeviceInfo;
    fn info_mut(&mut self) -> &mut DeviceInfo;

    fn id(&self) -> Option<u64> {
        self.info().id
    }

    fn name(&self) -> &str {
        &self.info().name
    }

    fn attributes(&self) -> &Value {
        &self.info().attributes
    }

    /// Replace this device's attributes with its entry in a fresh listing.
    /// Returns false when the device is no longer listed.
    fn refresh_from(&mut self, list: &DeviceList) -> bool {
        let kind = self.kind();
        let fresh = list
            .entries(kind)
            .into_iter()
            .find(|(entry, _)| self.info().matches(entry))
            .and_then(|(entry, _)| DeviceInfo::from_entry(entry));

        match fresh {
            Some(info) => {
                *self.info_mut() = info;
                true
            }
            None => {
                warn!(kind = %kind, name = self.name(), "Device missing from refreshed listing");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Doorbell {
    info: DeviceInfo,
    shared: bool,
}

impl Doorbell {
    /// Doorbells shared with this account are read-only.
    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Chime {
    info: DeviceInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct StickupCam {
    info: DeviceInfo,
}

macro_rules! impl_ring_device {
    ($ty:ty, $kind:expr) => {
        impl RingDevice for $ty {
            fn kind(&self) -> DeviceKind {
                $kind
            }

            fn info(&self) -> &DeviceInfo {
                &self.info
            }

            fn info_mut(&mut self) -> &mut DeviceInfo {
                &mut self.info
            }
        }
    };
}

impl_ring_device!(Doorbell, DeviceKind::Doorbell);
impl_ring_device!(Chime, DeviceKind::Chime);
impl_ring_device!(StickupCam, DeviceKind::StickupCam);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Device {
    Doorbell(Doorbell),
    Chime(Chime),
    StickupCam(StickupCam),
}

impl Device {
    /// Factory keyed by kind. `None` if the entry has no `description`.
    pub fn from_entry(kind: DeviceKind, entry: &Value, shared: bool) -> Option<Self> {
        let Some(info) = DeviceInfo::from_entry(entry) else {
            warn!(kind = %kind, "Skipping device entry without description");
            return None;
        };
        Some(match kind {
            DeviceKind::Doorbell => Device::Doorbell(Doorbell { info, shared }),
            DeviceKind::Chime => Device::Chime(Chime { info }),
            DeviceKind::StickupCam => Device::StickupCam(StickupCam { info }),
        })
    }

    fn inner(&self) -> &dyn RingDevice {
        match self {
            Device::Doorbell(d) => d,
            Device::Chime(c) => c,
            Device::StickupCam(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RingDevice {
        match self {
            Device::Doorbell(d) => d,
            Device::Chime(c) => c,
            Device::StickupCam(s) => s,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Device::Doorbell(d) if d.is_shared())
    }
}

impl RingDevice for Device {
    fn kind(&self) -> DeviceKind {
        self.inner().kind()
    }

    fn info(&self) -> &DeviceInfo {
        self.inner().info()
    }

    fn info_mut(&mut self) -> &mut DeviceInfo {
        self.inner_mut().info_mut()
    }
}

/// All devices on the account, grouped by kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Devices {
    pub doorbells: Vec<Device>,
    pub chimes: Vec<Device>,
    pub stickup_cams: Vec<Device>,
}

impl Devices {
    pub fn from_list(list: &DeviceList) -> Self {
        Self {
            doorbells: list.devices(DeviceKind::Doorbell),
            chimes: list.devices(DeviceKind::Chime),
            stickup_cams: list.devices(DeviceKind::StickupCam),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.doorbells
            .iter()
            .chain(self.chimes.iter())
            .chain(self.stickup_cams.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.doorbells
            .iter_mut()
            .chain(self.chimes.iter_mut())
            .chain(self.stickup_cams.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.doorbells.len() + self.chimes.len() + self.stickup_cams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

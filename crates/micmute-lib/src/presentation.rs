//! Presentation state: what the indicator should show right now.
//!
//! Pure data plus one transition function. Only the reconciliation loop
//! creates new states; everything else reads snapshots.

use serde::Serialize;

use crate::audio::CaptureDevice;

/// Lifecycle of the optional lighting-peripheral connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralMode {
    Uninitialized,
    Active,
    Error,
}

impl std::fmt::Display for PeripheralMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeripheralMode::Uninitialized => write!(f, "uninitialized"),
            PeripheralMode::Active => write!(f, "active"),
            PeripheralMode::Error => write!(f, "error"),
        }
    }
}

/// Default capture device as seen by the indicator.
///
/// Name and mute state only exist while a device is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviceStatus {
    NoDevice,
    Present { name: String, muted: bool },
}

impl DeviceStatus {
    pub fn from_snapshot(snapshot: Option<&CaptureDevice>) -> Self {
        match snapshot {
            Some(dev) => DeviceStatus::Present {
                name: dev.name.clone(),
                muted: dev.muted,
            },
            None => DeviceStatus::NoDevice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationState {
    pub device: DeviceStatus,
    pub peripheral_mode: PeripheralMode,
}

impl PresentationState {
    /// Startup state: no device, no peripheral connection.
    pub fn initial() -> Self {
        Self {
            device: DeviceStatus::NoDevice,
            peripheral_mode: PeripheralMode::Uninitialized,
        }
    }

    /// Next state from a device snapshot and a peripheral mode.
    ///
    /// The result depends only on the arguments, so equal inputs give equal
    /// states and change detection is a plain `==`.
    pub fn apply(&self, snapshot: Option<&CaptureDevice>, mode: PeripheralMode) -> Self {
        Self {
            device: DeviceStatus::from_snapshot(snapshot),
            peripheral_mode: mode,
        }
    }

    /// Same device, different peripheral mode.
    pub fn with_mode(&self, mode: PeripheralMode) -> Self {
        Self {
            device: self.device.clone(),
            peripheral_mode: mode,
        }
    }

    pub fn is_device_present(&self) -> bool {
        matches!(self.device, DeviceStatus::Present { .. })
    }

    /// Mute state, `None` without a device.
    pub fn muted(&self) -> Option<bool> {
        match &self.device {
            DeviceStatus::Present { muted, .. } => Some(*muted),
            DeviceStatus::NoDevice => None,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        match &self.device {
            DeviceStatus::Present { name, .. } => Some(name),
            DeviceStatus::NoDevice => None,
        }
    }
}

impl Default for PresentationState {
    fn default() -> Self {
        Self::initial()
    }
}

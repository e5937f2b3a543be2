//! Default capture device tracking with a single live mute subscription.
//!
//! Two trigger sources feed the same `notify` callback: default-device
//! reassignment and mute changes on the tracked device. The owner reacts by
//! calling [`DeviceMuteWatcher::refresh`], which re-resolves the default
//! device and moves the mute subscription when the device identity changed.

use crate::audio::{AudioBackend, CaptureDevice, ChangeCallback, Result, Subscription};

/// Bound on re-reads when the default device keeps changing under us.
const MAX_RESOLVE_ROUNDS: usize = 3;

/// Mute subscription bound to one device identity.
struct MuteSubscription {
    device_id: String,
    _guard: Subscription,
}

pub struct DeviceMuteWatcher<A: AudioBackend> {
    backend: A,
    notify: ChangeCallback,
    // Field order matters: the mute subscription is released before the
    // default-device one when the watcher is dropped.
    mute_sub: Option<MuteSubscription>,
    _default_sub: Subscription,
    current: Option<CaptureDevice>,
}

impl<A: AudioBackend> DeviceMuteWatcher<A> {
    /// Subscribe to default-device changes and resolve the initial device.
    ///
    /// Errors here mean the audio subsystem itself is unusable.
    pub fn new(backend: A, notify: ChangeCallback) -> Result<Self> {
        let default_sub = backend.watch_default_device(notify.clone())?;
        let mut watcher = Self {
            backend,
            notify,
            mute_sub: None,
            _default_sub: default_sub,
            current: None,
        };
        watcher.refresh()?;
        Ok(watcher)
    }

    /// Last resolved default device, `None` when the OS reports none.
    pub fn current_device(&self) -> Option<&CaptureDevice> {
        self.current.as_ref()
    }

    /// Re-resolve the default device and return a fresh snapshot.
    ///
    /// The mute subscription follows the device: when the identity changes
    /// the previous subscription is dropped before the new one is created.
    ///
    /// After moving the subscription the device is read once more, so a
    /// mute change that landed between the first read and the new
    /// subscription is not lost.
    pub fn refresh(&mut self) -> Result<Option<CaptureDevice>> {
        let mut device = self.backend.default_capture_device()?;
        for _ in 0..MAX_RESOLVE_ROUNDS {
            if !self.track(device.as_ref()) {
                break;
            }
            device = self.backend.default_capture_device()?;
        }
        self.current = device.clone();
        Ok(device)
    }

    /// Point the mute subscription at `device`. Returns `true` when a new
    /// subscription was created.
    fn track(&mut self, device: Option<&CaptureDevice>) -> bool {
        let same = match (&self.mute_sub, device) {
            (Some(sub), Some(dev)) => sub.device_id == dev.id,
            (None, None) => true,
            _ => false,
        };
        if same {
            return false;
        }

        if let Some(old) = self.mute_sub.take() {
            log::debug!("releasing mute subscription for {}", old.device_id);
        }

        let Some(dev) = device else {
            log::info!("no default capture device");
            return false;
        };

        match self.backend.watch_mute(dev, self.notify.clone()) {
            Ok(guard) => {
                log::info!("tracking capture device: {}", dev.name);
                self.mute_sub = Some(MuteSubscription {
                    device_id: dev.id.clone(),
                    _guard: guard,
                });
                true
            }
            Err(e) => {
                log::warn!("could not watch mute state of {}: {e}", dev.name);
                false
            }
        }
    }

    /// Invert mute on the current default device.
    ///
    /// Returns `Ok(false)` without doing anything when there is no default
    /// device. The state change itself comes back through the mute
    /// notification, not through this call.
    pub fn toggle_mute(&self) -> Result<bool> {
        let Some(device) = self.backend.default_capture_device()? else {
            log::debug!("toggle ignored: no default capture device");
            return Ok(false);
        };
        self.backend.set_muted(&device, !device.muted)?;
        Ok(true)
    }
}

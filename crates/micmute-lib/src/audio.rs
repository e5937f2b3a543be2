//! Audio subsystem boundary: default capture device, mute control and
//! change notifications, with a Windows WASAPI backend, an optional
//! PulseAudio backend and a scriptable stub.

use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum AudioError {
    InitFailed(String),
    OperationFailed(String),
    /// No audio backend is available on this platform/build.
    Unsupported,
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::InitFailed(e) => write!(f, "Audio init failed: {e}"),
            AudioError::OperationFailed(e) => write!(f, "Audio operation failed: {e}"),
            AudioError::Unsupported => {
                write!(f, "No audio backend is available on this platform")
            }
        }
    }
}

impl std::error::Error for AudioError {}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Point-in-time snapshot of a capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    /// Backend-specific endpoint identity (WASAPI endpoint ID, Pulse source name).
    pub id: String,
    /// Human-readable name shown in the tooltip.
    pub name: String,
    pub muted: bool,
}

impl CaptureDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, muted: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            muted,
        }
    }
}

/// Callback fired by a backend when something it watches changes.
///
/// Carries no payload: the receiver re-resolves the default device itself.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// RAII guard for a backend notification registration.
///
/// Dropping the guard unregisters the callback.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { dispose: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// The OS audio subsystem as seen by the watcher.
pub trait AudioBackend {
    /// Resolve the current default capture device. `Ok(None)` when the OS
    /// reports no default device.
    fn default_capture_device(&self) -> Result<Option<CaptureDevice>>;

    /// Set the mute state of a specific device.
    fn set_muted(&self, device: &CaptureDevice, muted: bool) -> Result<()>;

    /// Register for default-capture-device reassignment.
    fn watch_default_device(&self, on_change: ChangeCallback) -> Result<Subscription>;

    /// Register for mute-state changes on one device.
    fn watch_mute(&self, device: &CaptureDevice, on_change: ChangeCallback) -> Result<Subscription>;
}

impl<T: AudioBackend + ?Sized> AudioBackend for Box<T> {
    fn default_capture_device(&self) -> Result<Option<CaptureDevice>> {
        (**self).default_capture_device()
    }

    fn set_muted(&self, device: &CaptureDevice, muted: bool) -> Result<()> {
        (**self).set_muted(device, muted)
    }

    fn watch_default_device(&self, on_change: ChangeCallback) -> Result<Subscription> {
        (**self).watch_default_device(on_change)
    }

    fn watch_mute(&self, device: &CaptureDevice, on_change: ChangeCallback) -> Result<Subscription> {
        (**self).watch_mute(device, on_change)
    }
}

/// Open the audio backend for the current platform.
///
/// Must be called on the thread that will use the backend (COM apartment on
/// Windows).
pub fn open_platform_backend() -> Result<Box<dyn AudioBackend>> {
    #[cfg(windows)]
    {
        Ok(Box::new(WasapiBackend::new()?))
    }
    #[cfg(all(target_os = "linux", feature = "pulse"))]
    {
        Ok(Box::new(PulseAudioBackend::new()?))
    }
    #[cfg(not(any(windows, all(target_os = "linux", feature = "pulse"))))]
    {
        Err(AudioError::Unsupported)
    }
}

/// Name of the backend [`open_platform_backend`] would open, if any.
pub fn platform_backend_name() -> Option<&'static str> {
    if cfg!(windows) {
        Some("wasapi")
    } else if cfg!(all(target_os = "linux", feature = "pulse")) {
        Some("pulseaudio")
    } else {
        None
    }
}

/// Last mute flag seen by an endpoint volume callback.
///
/// Volume notifications also fire on level changes; only a flip of the mute
/// flag is forwarded.
#[cfg(any(windows, test))]
struct MuteEdge(std::sync::atomic::AtomicBool);

#[cfg(any(windows, test))]
impl MuteEdge {
    fn new(muted: bool) -> Self {
        Self(std::sync::atomic::AtomicBool::new(muted))
    }

    /// Record `muted`. True when it differs from the previous value.
    fn observe(&self, muted: bool) -> bool {
        self.0.swap(muted, std::sync::atomic::Ordering::SeqCst) != muted
    }
}

/// Callbacks registered against a PulseAudio context subscription.
///
/// Server events reach default-source watchers; source events reach only the
/// mute watchers registered for that source index.
#[cfg(any(all(target_os = "linux", feature = "pulse"), test))]
#[derive(Default)]
struct SourceWatchers {
    next_id: u64,
    default: Vec<(u64, ChangeCallback)>,
    mute: Vec<(u64, u32, ChangeCallback)>,
}

#[cfg(any(all(target_os = "linux", feature = "pulse"), test))]
impl SourceWatchers {
    fn add_default(&mut self, on_change: ChangeCallback) -> u64 {
        self.next_id += 1;
        self.default.push((self.next_id, on_change));
        self.next_id
    }

    fn add_mute(&mut self, source_index: u32, on_change: ChangeCallback) -> u64 {
        self.next_id += 1;
        self.mute.push((self.next_id, source_index, on_change));
        self.next_id
    }

    fn remove(&mut self, id: u64) {
        self.default.retain(|(i, _)| *i != id);
        self.mute.retain(|(i, _, _)| *i != id);
    }

    fn server_event(&self) -> Vec<ChangeCallback> {
        self.default.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    fn source_event(&self, source_index: u32) -> Vec<ChangeCallback> {
        self.mute
            .iter()
            .filter(|(_, index, _)| *index == source_index)
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect()
    }
}

// ── Windows WASAPI implementation ──

#[cfg(windows)]
mod wasapi {
    use super::*;

    use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
    use windows::Win32::Foundation::PROPERTYKEY;
    use windows::Win32::Media::Audio::Endpoints::*;
    use windows::Win32::Media::Audio::*;
    use windows::Win32::System::Com::STGM_READ;
    use windows::Win32::System::Com::*;
    use windows::Win32::System::Variant::VT_LPWSTR;
    use windows::core::{HSTRING, PCWSTR, implement};

    /// COM callback that receives volume/mute change notifications.
    #[implement(IAudioEndpointVolumeCallback)]
    struct MuteCallback {
        last: MuteEdge,
        on_change: ChangeCallback,
    }

    impl IAudioEndpointVolumeCallback_Impl for MuteCallback_Impl {
        fn OnNotify(
            &self,
            pnotify: *mut AUDIO_VOLUME_NOTIFICATION_DATA,
        ) -> windows::core::Result<()> {
            if pnotify.is_null() {
                return Ok(());
            }
            let muted = unsafe { (*pnotify).bMuted.as_bool() };
            if self.last.observe(muted) {
                (self.on_change)();
            }
            Ok(())
        }
    }

    /// COM callback that receives endpoint notifications; only default
    /// capture reassignment is forwarded.
    #[implement(IMMNotificationClient)]
    struct DefaultDeviceCallback {
        on_change: ChangeCallback,
    }

    impl IMMNotificationClient_Impl for DefaultDeviceCallback_Impl {
        fn OnDeviceStateChanged(
            &self,
            _pwstrdeviceid: &PCWSTR,
            _dwnewstate: DEVICE_STATE,
        ) -> windows::core::Result<()> {
            Ok(())
        }

        fn OnDeviceAdded(&self, _pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
            Ok(())
        }

        fn OnDeviceRemoved(&self, _pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
            Ok(())
        }

        fn OnDefaultDeviceChanged(
            &self,
            flow: EDataFlow,
            role: ERole,
            _pwstrdefaultdeviceid: &PCWSTR,
        ) -> windows::core::Result<()> {
            // Fires once per role; eConsole is enough.
            if flow == eCapture && role == eConsole {
                (self.on_change)();
            }
            Ok(())
        }

        fn OnPropertyValueChanged(
            &self,
            _pwstrdeviceid: &PCWSTR,
            _key: &PROPERTYKEY,
        ) -> windows::core::Result<()> {
            Ok(())
        }
    }

    pub struct WasapiBackend {
        enumerator: IMMDeviceEnumerator,
    }

    impl WasapiBackend {
        /// Initialise COM on this thread and create the device enumerator.
        pub fn new() -> Result<Self> {
            com_init()?;
            let enumerator: IMMDeviceEnumerator = unsafe {
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| AudioError::InitFailed(format!("MMDeviceEnumerator: {e}")))?
            };
            Ok(Self { enumerator })
        }

        fn device_by_id(&self, id: &str) -> Result<IMMDevice> {
            let wide = HSTRING::from(id);
            unsafe {
                self.enumerator
                    .GetDevice(PCWSTR(wide.as_ptr()))
                    .map_err(|e| AudioError::OperationFailed(format!("GetDevice({id}): {e}")))
            }
        }

        fn endpoint_volume(device: &IMMDevice) -> Result<IAudioEndpointVolume> {
            unsafe {
                device
                    .Activate(CLSCTX_ALL, None)
                    .map_err(|e| AudioError::OperationFailed(format!("IAudioEndpointVolume: {e}")))
            }
        }

        fn snapshot(device: &IMMDevice) -> Result<CaptureDevice> {
            unsafe {
                let raw_id = device
                    .GetId()
                    .map_err(|e| AudioError::OperationFailed(format!("GetId: {e}")))?;
                let id = raw_id.to_string().unwrap_or_default();
                CoTaskMemFree(Some(raw_id.0 as *const _));

                let name = match device.OpenPropertyStore(STGM_READ) {
                    Ok(store) => match store.GetValue(&PKEY_Device_FriendlyName) {
                        Ok(prop) if prop.Anonymous.Anonymous.vt == VT_LPWSTR => prop
                            .Anonymous
                            .Anonymous
                            .Anonymous
                            .pwszVal
                            .to_string()
                            .ok(),
                        _ => None,
                    },
                    Err(_) => None,
                };

                let volume = Self::endpoint_volume(device)?;
                let muted = volume.GetMute().map(|b| b.as_bool()).unwrap_or(false);

                Ok(CaptureDevice {
                    name: name.unwrap_or_else(|| id.clone()),
                    id,
                    muted,
                })
            }
        }
    }

    impl AudioBackend for WasapiBackend {
        fn default_capture_device(&self) -> Result<Option<CaptureDevice>> {
            let device = unsafe { self.enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) };
            match device {
                Ok(device) => Self::snapshot(&device).map(Some),
                Err(e) => {
                    log::debug!("no default capture endpoint: {e}");
                    Ok(None)
                }
            }
        }

        fn set_muted(&self, device: &CaptureDevice, muted: bool) -> Result<()> {
            let endpoint = self.device_by_id(&device.id)?;
            let volume = Self::endpoint_volume(&endpoint)?;
            unsafe {
                volume
                    .SetMute(muted, std::ptr::null())
                    .map_err(|e| AudioError::OperationFailed(format!("SetMute: {e}")))
            }
        }

        fn watch_default_device(&self, on_change: ChangeCallback) -> Result<Subscription> {
            let client: IMMNotificationClient = DefaultDeviceCallback { on_change }.into();
            unsafe {
                self.enumerator
                    .RegisterEndpointNotificationCallback(&client)
                    .map_err(|e| {
                        AudioError::InitFailed(format!("RegisterEndpointNotificationCallback: {e}"))
                    })?;
            }
            let enumerator = self.enumerator.clone();
            Ok(Subscription::new(move || unsafe {
                let _ = enumerator.UnregisterEndpointNotificationCallback(&client);
            }))
        }

        fn watch_mute(
            &self,
            device: &CaptureDevice,
            on_change: ChangeCallback,
        ) -> Result<Subscription> {
            let endpoint = self.device_by_id(&device.id)?;
            let volume = Self::endpoint_volume(&endpoint)?;
            let callback: IAudioEndpointVolumeCallback = MuteCallback {
                last: MuteEdge::new(device.muted),
                on_change,
            }
            .into();
            unsafe {
                volume.RegisterControlChangeNotify(&callback).map_err(|e| {
                    AudioError::OperationFailed(format!("RegisterControlChangeNotify: {e}"))
                })?;
            }
            Ok(Subscription::new(move || unsafe {
                let _ = volume.UnregisterControlChangeNotify(&callback);
            }))
        }
    }

    /// Initialize COM for the current thread (multi-threaded apartment, so
    /// notification callbacks may arrive on COM worker threads).
    pub fn com_init() -> Result<()> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| AudioError::InitFailed(format!("CoInitializeEx: {e}")))
        }
    }
}

#[cfg(windows)]
pub use wasapi::{WasapiBackend, com_init};

// ── Linux PulseAudio implementation ──

#[cfg(all(target_os = "linux", feature = "pulse"))]
mod pulse {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use libpulse_binding::callbacks::ListResult;
    use libpulse_binding::context::subscribe::{Facility, InterestMaskSet};
    use libpulse_binding::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
    use libpulse_binding::mainloop::threaded::Mainloop;
    use libpulse_binding::operation::{Operation, State as OperationState};

    const DEFAULT_SOURCE: &str = "@DEFAULT_SOURCE@";

    struct PulseInner {
        mainloop: Mainloop,
        context: Context,
    }

    pub struct PulseAudioBackend {
        inner: Mutex<PulseInner>,
        watchers: Arc<Mutex<SourceWatchers>>,
    }

    /// Block until a PulseAudio operation leaves the `Running` state.
    fn wait_for<G: ?Sized>(mainloop: &mut Mainloop, op: &Operation<G>) {
        loop {
            mainloop.lock();
            let state = op.get_state();
            mainloop.unlock();
            if state != OperationState::Running {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    impl PulseAudioBackend {
        /// Connect to the PulseAudio/PipeWire server and subscribe to server
        /// (default source) and source (mute) events.
        pub fn new() -> Result<Self> {
            let mut mainloop = Mainloop::new().ok_or_else(|| {
                AudioError::InitFailed("PulseAudio mainloop creation failed".into())
            })?;

            let mut context = Context::new(&mainloop, "micmute").ok_or_else(|| {
                AudioError::InitFailed("PulseAudio context creation failed".into())
            })?;

            context
                .connect(None, ContextFlagSet::NOFLAGS, None)
                .map_err(|e| AudioError::InitFailed(format!("PulseAudio connect: {e}")))?;

            mainloop
                .start()
                .map_err(|e| AudioError::InitFailed(format!("PulseAudio mainloop start: {e}")))?;

            loop {
                mainloop.lock();
                let state = context.get_state();
                mainloop.unlock();
                match state {
                    ContextState::Ready => break,
                    ContextState::Failed | ContextState::Terminated => {
                        return Err(AudioError::InitFailed(
                            "PulseAudio context connection failed".into(),
                        ));
                    }
                    _ => std::thread::sleep(Duration::from_millis(10)),
                }
            }

            let watchers = Arc::new(Mutex::new(SourceWatchers::default()));

            mainloop.lock();
            let dispatch = Arc::clone(&watchers);
            context.set_subscribe_callback(Some(Box::new(move |facility, _operation, index| {
                let callbacks = match dispatch.lock() {
                    Ok(w) => match facility {
                        Some(Facility::Server) => w.server_event(),
                        Some(Facility::Source) => w.source_event(index),
                        _ => Vec::new(),
                    },
                    Err(_) => Vec::new(),
                };
                for cb in callbacks {
                    cb();
                }
            })));
            context.subscribe(InterestMaskSet::SERVER | InterestMaskSet::SOURCE, |_| {});
            mainloop.unlock();

            Ok(PulseAudioBackend {
                inner: Mutex::new(PulseInner { mainloop, context }),
                watchers,
            })
        }

        /// Register a callback. `source_index` selects a mute watcher; `None`
        /// watches the default source.
        fn register(&self, source_index: Option<u32>, on_change: ChangeCallback) -> Subscription {
            let Ok(mut w) = self.watchers.lock() else {
                return Subscription::noop();
            };
            let id = match source_index {
                Some(index) => w.add_mute(index, on_change),
                None => w.add_default(on_change),
            };
            let watchers = Arc::clone(&self.watchers);
            Subscription::new(move || {
                if let Ok(mut w) = watchers.lock() {
                    w.remove(id);
                }
            })
        }

        /// Server-side index of the source named `name`.
        fn source_index(&self, name: &str) -> Result<Option<u32>> {
            let mut inner = self.inner.lock().map_err(|e| {
                AudioError::OperationFailed(format!("PulseAudio mutex poisoned: {e}"))
            })?;
            let found: Arc<Mutex<Option<u32>>> = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&found);

            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let op = introspect.get_source_info_by_name(name, move |result| {
                if let ListResult::Item(info) = result {
                    if let Ok(mut slot) = sink.lock() {
                        *slot = Some(info.index);
                    }
                }
            });
            inner.mainloop.unlock();
            wait_for(&mut inner.mainloop, &op);

            let index = found.lock().ok().and_then(|mut slot| slot.take());
            Ok(index)
        }
    }

    impl AudioBackend for PulseAudioBackend {
        fn default_capture_device(&self) -> Result<Option<CaptureDevice>> {
            let mut inner = self.inner.lock().map_err(|e| {
                AudioError::OperationFailed(format!("PulseAudio mutex poisoned: {e}"))
            })?;
            let found: Arc<Mutex<Option<CaptureDevice>>> = Arc::new(Mutex::new(None));
            let sink = Arc::clone(&found);

            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let op = introspect.get_source_info_by_name(DEFAULT_SOURCE, move |result| {
                if let ListResult::Item(info) = result {
                    let id = info.name.as_deref().unwrap_or_default().to_string();
                    let name = info
                        .description
                        .as_deref()
                        .map(str::to_string)
                        .unwrap_or_else(|| id.clone());
                    if let Ok(mut slot) = sink.lock() {
                        *slot = Some(CaptureDevice {
                            id,
                            name,
                            muted: info.mute,
                        });
                    }
                }
            });
            inner.mainloop.unlock();
            wait_for(&mut inner.mainloop, &op);

            let device = found.lock().ok().and_then(|mut slot| slot.take());
            Ok(device)
        }

        fn set_muted(&self, device: &CaptureDevice, muted: bool) -> Result<()> {
            let mut inner = self.inner.lock().map_err(|e| {
                AudioError::OperationFailed(format!("PulseAudio mutex poisoned: {e}"))
            })?;
            inner.mainloop.lock();
            let mut introspect = inner.context.introspect();
            let op = introspect.set_source_mute_by_name(&device.id, muted, None);
            inner.mainloop.unlock();
            wait_for(&mut inner.mainloop, &op);
            Ok(())
        }

        fn watch_default_device(&self, on_change: ChangeCallback) -> Result<Subscription> {
            Ok(self.register(None, on_change))
        }

        fn watch_mute(
            &self,
            device: &CaptureDevice,
            on_change: ChangeCallback,
        ) -> Result<Subscription> {
            let index = self.source_index(&device.id)?.ok_or_else(|| {
                AudioError::OperationFailed(format!("source {} not found", device.id))
            })?;
            Ok(self.register(Some(index), on_change))
        }
    }

    impl Drop for PulseAudioBackend {
        fn drop(&mut self) {
            if let Ok(mut inner) = self.inner.lock() {
                inner.mainloop.lock();
                inner.context.disconnect();
                inner.mainloop.unlock();
                inner.mainloop.stop();
            }
        }
    }
}

#[cfg(all(target_os = "linux", feature = "pulse"))]
pub use pulse::PulseAudioBackend;

// ── Test stub ──

/// Scriptable [`AudioBackend`] for unit and integration tests.
///
/// Clones share state, so a test can keep one handle while the watcher owns
/// another. Callbacks fire synchronously on the thread that changes the state.
pub mod stub {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubState {
        default: Option<CaptureDevice>,
        next_id: u64,
        default_watchers: Vec<(u64, ChangeCallback)>,
        mute_watchers: Vec<(u64, String, ChangeCallback)>,
        set_muted_calls: usize,
    }

    #[derive(Clone, Default)]
    pub struct StubAudio {
        state: Arc<Mutex<StubState>>,
    }

    impl StubAudio {
        /// Create a stub whose default capture device is `default`.
        pub fn new(default: Option<CaptureDevice>) -> Self {
            Self {
                state: Arc::new(Mutex::new(StubState {
                    default,
                    ..StubState::default()
                })),
            }
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Reassign the default device and fire default-device watchers.
        pub fn set_default(&self, device: Option<CaptureDevice>) {
            let callbacks: Vec<ChangeCallback> = {
                let mut s = self.lock();
                s.default = device;
                s.default_watchers
                    .iter()
                    .map(|(_, cb)| Arc::clone(cb))
                    .collect()
            };
            for cb in callbacks {
                cb();
            }
        }

        /// Change the mute state of the current default device (as if another
        /// application did it) and fire its mute watchers.
        pub fn set_device_muted(&self, muted: bool) {
            let callbacks: Vec<ChangeCallback> = {
                let mut s = self.lock();
                let Some(dev) = s.default.as_mut() else {
                    return;
                };
                dev.muted = muted;
                let id = dev.id.clone();
                s.mute_watchers
                    .iter()
                    .filter(|(_, dev_id, _)| *dev_id == id)
                    .map(|(_, _, cb)| Arc::clone(cb))
                    .collect()
            };
            for cb in callbacks {
                cb();
            }
        }

        /// Current default device, as the OS sees it.
        pub fn current(&self) -> Option<CaptureDevice> {
            self.lock().default.clone()
        }

        /// Number of live mute subscriptions across all devices.
        pub fn mute_subscriptions(&self) -> usize {
            self.lock().mute_watchers.len()
        }

        /// Number of live mute subscriptions for one device.
        pub fn mute_subscriptions_for(&self, device_id: &str) -> usize {
            self.lock()
                .mute_watchers
                .iter()
                .filter(|(_, id, _)| id == device_id)
                .count()
        }

        /// Number of live default-device subscriptions.
        pub fn default_subscriptions(&self) -> usize {
            self.lock().default_watchers.len()
        }

        /// How many times `set_muted` was called through the trait.
        pub fn set_muted_calls(&self) -> usize {
            self.lock().set_muted_calls
        }
    }

    impl AudioBackend for StubAudio {
        fn default_capture_device(&self) -> Result<Option<CaptureDevice>> {
            Ok(self.lock().default.clone())
        }

        fn set_muted(&self, device: &CaptureDevice, muted: bool) -> Result<()> {
            {
                let mut s = self.lock();
                s.set_muted_calls += 1;
                match s.default.as_ref() {
                    Some(d) if d.id == device.id => {}
                    _ => {
                        return Err(AudioError::OperationFailed(format!(
                            "stub: unknown device {}",
                            device.id
                        )));
                    }
                }
            }
            self.set_device_muted(muted);
            Ok(())
        }

        fn watch_default_device(&self, on_change: ChangeCallback) -> Result<Subscription> {
            let id = {
                let mut s = self.lock();
                s.next_id += 1;
                let id = s.next_id;
                s.default_watchers.push((id, on_change));
                id
            };
            let state = Arc::clone(&self.state);
            Ok(Subscription::new(move || {
                if let Ok(mut s) = state.lock() {
                    s.default_watchers.retain(|(i, _)| *i != id);
                }
            }))
        }

        fn watch_mute(
            &self,
            device: &CaptureDevice,
            on_change: ChangeCallback,
        ) -> Result<Subscription> {
            let id = {
                let mut s = self.lock();
                s.next_id += 1;
                let id = s.next_id;
                s.mute_watchers.push((id, device.id.clone(), on_change));
                id
            };
            let state = Arc::clone(&self.state);
            Ok(Subscription::new(move || {
                if let Ok(mut s) = state.lock() {
                    s.mute_watchers.retain(|(i, _, _)| *i != id);
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StubAudio;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            count,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn subscription_disposes_once_on_drop() {
        let (count, cb) = counter();
        let sub = Subscription::new(move || cb());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(sub);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_subscription_drops_cleanly() {
        let sub = Subscription::noop();
        assert!(format!("{sub:?}").contains("active: false"));
    }

    #[test]
    fn display_unsupported() {
        assert_eq!(
            AudioError::Unsupported.to_string(),
            "No audio backend is available on this platform"
        );
    }

    #[test]
    fn boxed_backend_delegates() {
        let stub = StubAudio::new(Some(CaptureDevice::new("mic-1", "Mic", false)));
        let boxed: Box<dyn AudioBackend> = Box::new(stub.clone());
        let dev = boxed.default_capture_device().unwrap().unwrap();
        boxed.set_muted(&dev, true).unwrap();
        assert!(stub.current().unwrap().muted);
    }

    // ── Notification filtering ──

    #[test]
    fn mute_edge_reports_only_flips() {
        let edge = MuteEdge::new(false);
        assert!(!edge.observe(false));
        assert!(!edge.observe(false));
        assert!(edge.observe(true));
        assert!(!edge.observe(true));
        assert!(edge.observe(false));
    }

    #[test]
    fn source_event_reaches_only_that_source() {
        let mut w = SourceWatchers::default();
        let (count_mic, cb_mic) = counter();
        let (count_other, cb_other) = counter();
        let (count_default, cb_default) = counter();
        w.add_mute(3, cb_mic);
        w.add_mute(7, cb_other);
        w.add_default(cb_default);

        for cb in w.source_event(3) {
            cb();
        }
        assert_eq!(count_mic.load(Ordering::SeqCst), 1);
        assert_eq!(count_other.load(Ordering::SeqCst), 0);
        assert_eq!(count_default.load(Ordering::SeqCst), 0);
        assert!(w.source_event(12).is_empty());

        for cb in w.server_event() {
            cb();
        }
        assert_eq!(count_default.load(Ordering::SeqCst), 1);
        assert_eq!(count_mic.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_source_watcher_is_not_dispatched() {
        let mut w = SourceWatchers::default();
        let (_count, cb) = counter();
        let id = w.add_mute(3, cb);
        w.remove(id);
        assert!(w.source_event(3).is_empty());
    }

    // ── StubAudio ──

    #[test]
    fn stub_reports_no_device() {
        let stub = StubAudio::new(None);
        assert!(stub.default_capture_device().unwrap().is_none());
    }

    #[test]
    fn stub_default_change_fires_watchers() {
        let stub = StubAudio::new(None);
        let (count, cb) = counter();
        let _sub = stub.watch_default_device(cb).unwrap();
        stub.set_default(Some(CaptureDevice::new("a", "A", false)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stub_mute_change_fires_only_matching_device() {
        let stub = StubAudio::new(Some(CaptureDevice::new("a", "A", false)));
        let (count_a, cb_a) = counter();
        let (count_b, cb_b) = counter();
        let _sa = stub
            .watch_mute(&CaptureDevice::new("a", "A", false), cb_a)
            .unwrap();
        let _sb = stub
            .watch_mute(&CaptureDevice::new("b", "B", false), cb_b)
            .unwrap();
        stub.set_device_muted(true);
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stub_dropping_subscription_unregisters() {
        let stub = StubAudio::new(Some(CaptureDevice::new("a", "A", false)));
        let (_count, cb) = counter();
        let sub = stub
            .watch_mute(&CaptureDevice::new("a", "A", false), cb)
            .unwrap();
        assert_eq!(stub.mute_subscriptions(), 1);
        drop(sub);
        assert_eq!(stub.mute_subscriptions(), 0);
    }

    #[test]
    fn stub_set_muted_unknown_device_fails() {
        let stub = StubAudio::new(Some(CaptureDevice::new("a", "A", false)));
        let err = stub
            .set_muted(&CaptureDevice::new("zzz", "Z", false), true)
            .unwrap_err();
        assert!(err.to_string().contains("unknown device"));
        assert!(!stub.current().unwrap().muted);
    }
}

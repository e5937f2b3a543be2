//! Reconciliation: merge device events and usage polls into one state.
//!
//! [`Reconciler`] is the synchronous state machine. It owns the device
//! watcher, the usage probe, both sinks and the current
//! [`PresentationState`], and is driven by three inputs: a device/mute
//! change, a timer tick and a toggle request.
//!
//! [`ReconciliationLoop`] runs a reconciler on its own thread as a single
//! actor. Every input arrives over one channel, so no two transitions ever
//! run concurrently. Messages that pile up while a transition is running are
//! drained as one batch:
//!
//! - toggles execute in arrival order
//! - any number of device events collapse into one refresh of the latest snapshot
//! - a tick runs after the refresh
//!
//! Ticks are never queued. A tick request made while the previous tick is
//! still pending is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::{self, AudioBackend, AudioError, ChangeCallback};
use crate::config::Config;
use crate::error::Result;
use crate::lighting::{self, LightingSdk};
use crate::presentation::{PeripheralMode, PresentationState};
use crate::reconnect::{ReconnectConfig, ReconnectState};
use crate::sink::{IconSink, IconView, LightingSink};
use crate::usage::{UsageProbe, UsageStatus, UsageStore};
use crate::watcher::DeviceMuteWatcher;

// ── State machine ──

pub struct Reconciler<A, S, L, I>
where
    A: AudioBackend,
    S: UsageStore,
    L: LightingSdk,
    I: IconSink,
{
    watcher: DeviceMuteWatcher<A>,
    probe: UsageProbe<S>,
    lighting: LightingSink<L>,
    icon: I,
    reconnect: ReconnectState,
    state: PresentationState,
}

impl<A, S, L, I> Reconciler<A, S, L, I>
where
    A: AudioBackend,
    S: UsageStore,
    L: LightingSdk,
    I: IconSink,
{
    /// Starts from [`PresentationState::initial`]. Nothing is rendered until
    /// the first [`handle_device_event`](Self::handle_device_event).
    pub fn new(
        watcher: DeviceMuteWatcher<A>,
        probe: UsageProbe<S>,
        lighting: LightingSink<L>,
        icon: I,
    ) -> Self {
        Self {
            watcher,
            probe,
            lighting,
            icon,
            reconnect: ReconnectState::with_defaults(),
            state: PresentationState::initial(),
        }
    }

    /// Replace the reconnect backoff schedule.
    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = ReconnectState::new(config);
        self
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    /// Device or mute change: re-resolve the device and render.
    ///
    /// The peripheral mode is carried over untouched; only ticks move it.
    /// The icon is always rendered. The lighting pattern is pushed only while
    /// the peripheral is active, and a failed push moves the mode to `Error`.
    pub fn handle_device_event(&mut self) {
        let snapshot = match self.watcher.refresh() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("could not resolve default capture device: {e}");
                None
            }
        };
        self.state = self
            .state
            .apply(snapshot.as_ref(), self.state.peripheral_mode);

        let view = IconView::from_state(&self.state);
        log::debug!("render icon {:?} ({})", view.kind, view.label);
        self.icon.render(&view);

        if self.state.peripheral_mode == PeripheralMode::Active {
            self.refresh_lighting();
        }
    }

    /// Timer tick: probe usage and drive the peripheral connection.
    ///
    /// Never renders the icon.
    pub fn handle_tick(&mut self) -> UsageStatus {
        let usage = self.probe.probe();
        match (usage, self.state.peripheral_mode) {
            (UsageStatus::NotInUse, PeripheralMode::Active) => {
                self.lighting.teardown();
                self.set_mode(PeripheralMode::Uninitialized);
            }
            (UsageStatus::NotInUse, _) => {}
            (UsageStatus::InUse, PeripheralMode::Active) => self.refresh_lighting(),
            (UsageStatus::InUse, _) => {
                if self.connect_lighting() {
                    self.refresh_lighting();
                }
            }
        }
        usage
    }

    /// Ask the audio backend to invert mute on the default device.
    ///
    /// Does not touch the presentation state: the resulting mute event comes
    /// back through [`handle_device_event`](Self::handle_device_event).
    pub fn toggle_mute(&mut self) -> bool {
        match self.watcher.toggle_mute() {
            Ok(toggled) => toggled,
            Err(e) => {
                log::warn!("mute toggle failed: {e}");
                false
            }
        }
    }

    /// Tear down the peripheral connection before exit.
    pub fn shutdown(&mut self) {
        self.lighting.teardown();
        self.set_mode(PeripheralMode::Uninitialized);
    }

    fn connect_lighting(&mut self) -> bool {
        if !self.reconnect.should_attempt() {
            log::trace!(
                "lighting reconnect deferred ({:.1}s backoff)",
                self.reconnect.current_delay().as_secs_f64()
            );
            return false;
        }
        match self.lighting.connect() {
            Ok(()) => {
                self.reconnect.record_success();
                self.set_mode(PeripheralMode::Active);
                true
            }
            Err(e) => {
                self.reconnect.record_failure();
                log::warn!(
                    "lighting unavailable: {e} (attempt {}, retry in {:.1}s)",
                    self.reconnect.consecutive_failures(),
                    self.reconnect.current_delay().as_secs_f64()
                );
                self.set_mode(PeripheralMode::Error);
                false
            }
        }
    }

    fn refresh_lighting(&mut self) {
        let Some(muted) = self.state.muted() else {
            return;
        };
        if let Err(e) = self.lighting.push(muted) {
            log::warn!("lighting update failed: {e}");
            self.lighting.teardown();
            self.reconnect.record_failure();
            self.set_mode(PeripheralMode::Error);
        }
    }

    fn set_mode(&mut self, mode: PeripheralMode) {
        if self.state.peripheral_mode != mode {
            log::info!("peripheral mode: {} -> {mode}", self.state.peripheral_mode);
            self.state = self.state.with_mode(mode);
        }
    }
}

// ── Actor loop ──

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Tick period; `None` means ticks only happen through [`LoopControl::tick`].
    pub tick_interval: Option<Duration>,
}

impl LoopConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            tick_interval: Some(interval),
        }
    }

    pub fn manual() -> Self {
        Self {
            tick_interval: None,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::every(Duration::from_millis(crate::config::DEFAULT_TICK_INTERVAL_MS))
    }
}

enum Msg {
    AudioChanged,
    Tick,
    ToggleMute,
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct Batch {
    toggles: usize,
    audio_changed: bool,
    tick: bool,
    flushes: Vec<Sender<()>>,
    shutdown: bool,
}

impl Batch {
    fn add(&mut self, msg: Msg) {
        match msg {
            Msg::AudioChanged => self.audio_changed = true,
            Msg::Tick => self.tick = true,
            Msg::ToggleMute => self.toggles += 1,
            Msg::Flush(reply) => self.flushes.push(reply),
            Msg::Shutdown => self.shutdown = true,
        }
    }
}

/// Cloneable control surface of a running loop.
#[derive(Clone)]
pub struct LoopControl {
    tx: Sender<Msg>,
    tick_pending: Arc<AtomicBool>,
    snapshot: Arc<Mutex<PresentationState>>,
}

impl LoopControl {
    /// Queue a mute toggle. Returns `false` if the loop has stopped.
    pub fn toggle_mute(&self) -> bool {
        self.tx.send(Msg::ToggleMute).is_ok()
    }

    /// Request a tick. Returns `false` when skipped because the previous tick
    /// has not finished yet, or when the loop has stopped.
    pub fn tick(&self) -> bool {
        if self
            .tick_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("tick skipped: previous tick still running");
            return false;
        }
        if self.tx.send(Msg::Tick).is_err() {
            self.tick_pending.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Block until every input queued before this call, and every event
    /// those inputs triggered synchronously, has been processed.
    pub fn flush(&self) -> bool {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.tx.send(Msg::Flush(reply_tx)).is_err() {
            return false;
        }
        reply_rx.recv().is_ok()
    }

    /// State published after the last processed batch.
    pub fn snapshot(&self) -> PresentationState {
        match self.snapshot.lock() {
            Ok(s) => s.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }
}

struct Timer {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owner of a running reconciliation loop. Dropping it shuts the loop down.
pub struct LoopHandle {
    control: LoopControl,
    worker: Option<JoinHandle<()>>,
    timer: Option<Timer>,
}

impl LoopHandle {
    pub fn control(&self) -> LoopControl {
        self.control.clone()
    }

    pub fn toggle_mute(&self) -> bool {
        self.control.toggle_mute()
    }

    pub fn tick(&self) -> bool {
        self.control.tick()
    }

    pub fn flush(&self) -> bool {
        self.control.flush()
    }

    pub fn snapshot(&self) -> PresentationState {
        self.control.snapshot()
    }

    /// Stop the timer, tear down the peripheral connection and join the loop.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            let _ = timer.stop.send(());
            let _ = timer.handle.join();
        }
        if let Some(worker) = self.worker.take() {
            let _ = self.control.tx.send(Msg::Shutdown);
            if worker.join().is_err() {
                log::error!("reconciliation thread panicked");
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct ReconciliationLoop;

impl ReconciliationLoop {
    /// Start the loop.
    ///
    /// `build` runs on the loop thread, so backends that must stay on the
    /// thread that created them (COM objects) never cross threads. It gets
    /// the change callback to hand to the device watcher. An error from
    /// `build` is returned here and the loop never starts.
    ///
    /// Once built, the loop resolves the device and renders the icon once
    /// before `spawn` returns.
    pub fn spawn<F, A, S, L, I>(config: LoopConfig, build: F) -> Result<LoopHandle>
    where
        F: FnOnce(ChangeCallback) -> Result<Reconciler<A, S, L, I>> + Send + 'static,
        A: AudioBackend + 'static,
        S: UsageStore + 'static,
        L: LightingSdk + 'static,
        I: IconSink + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let tick_pending = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(Mutex::new(PresentationState::initial()));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let notify_tx = tx.clone();
        let notify: ChangeCallback = Arc::new(move || {
            let _ = notify_tx.send(Msg::AudioChanged);
        });

        let worker = {
            let tick_pending = Arc::clone(&tick_pending);
            let snapshot = Arc::clone(&snapshot);
            thread::Builder::new()
                .name("micmute-reconcile".into())
                .spawn(move || {
                    let mut reconciler = match build(notify) {
                        Ok(r) => r,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    reconciler.handle_device_event();
                    publish(&snapshot, reconciler.state());
                    let _ = ready_tx.send(Ok(()));
                    run(reconciler, rx, &tick_pending, &snapshot);
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(AudioError::InitFailed(
                    "reconciliation thread exited during startup".into(),
                )
                .into());
            }
        }

        let mut handle = LoopHandle {
            control: LoopControl {
                tx,
                tick_pending,
                snapshot,
            },
            worker: Some(worker),
            timer: None,
        };

        if let Some(interval) = config.tick_interval {
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let control = handle.control();
            let timer = thread::Builder::new()
                .name("micmute-tick".into())
                .spawn(move || {
                    while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                        control.tick();
                    }
                })?;
            handle.timer = Some(Timer {
                stop: stop_tx,
                handle: timer,
            });
        }

        Ok(handle)
    }
}

fn publish(snapshot: &Mutex<PresentationState>, state: &PresentationState) {
    match snapshot.lock() {
        Ok(mut s) => *s = state.clone(),
        Err(e) => *e.into_inner() = state.clone(),
    }
}

fn run<A, S, L, I>(
    mut reconciler: Reconciler<A, S, L, I>,
    rx: Receiver<Msg>,
    tick_pending: &AtomicBool,
    snapshot: &Mutex<PresentationState>,
) where
    A: AudioBackend,
    S: UsageStore,
    L: LightingSdk,
    I: IconSink,
{
    let mut pending: Vec<Msg> = Vec::new();
    let mut waiters: Vec<Sender<()>> = Vec::new();

    loop {
        if pending.is_empty() {
            match rx.recv() {
                Ok(msg) => pending.push(msg),
                Err(_) => break,
            }
        }
        let mut batch = Batch::default();
        for msg in pending.drain(..).chain(rx.try_iter()) {
            batch.add(msg);
        }

        for _ in 0..batch.toggles {
            reconciler.toggle_mute();
        }
        if batch.audio_changed {
            reconciler.handle_device_event();
        }
        if batch.tick {
            reconciler.handle_tick();
            tick_pending.store(false, Ordering::Release);
        }
        publish(snapshot, reconciler.state());
        waiters.append(&mut batch.flushes);

        if batch.shutdown {
            break;
        }

        // Flush waiters are answered only once nothing is left, so events
        // fired by this batch are processed first.
        pending.extend(rx.try_iter());
        if pending.is_empty() {
            for w in waiters.drain(..) {
                let _ = w.send(());
            }
        }
    }

    reconciler.shutdown();
    publish(snapshot, reconciler.state());
    for w in waiters {
        let _ = w.send(());
    }
    log::debug!("reconciliation loop stopped");
}

/// Start a loop on the platform audio backend.
///
/// Lighting and tick period come from `config`; the usage store and icon
/// sink are supplied by the caller.
pub fn spawn_platform<S, I>(config: &Config, usage: S, icon: I) -> Result<LoopHandle>
where
    S: UsageStore + Send + 'static,
    I: IconSink + Send + 'static,
{
    let patterns = lighting::patterns_from_config(config);
    let lighting_config = config.clone();
    let loop_config = LoopConfig::every(config.tick_interval());
    ReconciliationLoop::spawn(loop_config, move |notify| {
        let backend = audio::open_platform_backend()?;
        let watcher = DeviceMuteWatcher::new(backend, notify)?;
        let sdk = lighting::sdk_from_config(&lighting_config);
        Ok(Reconciler::new(
            watcher,
            UsageProbe::new(usage),
            LightingSink::new(sdk, patterns),
            icon,
        ))
    })
}

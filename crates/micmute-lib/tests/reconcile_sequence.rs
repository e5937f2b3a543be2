//! Integration tests: reconciliation sequences through the public API.
//!
//! Every collaborator is a stub from the library itself, so these run on
//! any platform without audio hardware or a lighting service.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use micmute_lib::audio::CaptureDevice;
use micmute_lib::audio::stub::StubAudio;
use micmute_lib::audio::ChangeCallback;
use micmute_lib::hotkey::{
    HotkeyAction, HotkeyError, HotkeyToggleController, KeyCombo, MemoryRegistrar,
};
use micmute_lib::lighting::stub::StubLighting;
use micmute_lib::lighting::{self, LightingConnection, LightingPattern, LightingSdk, PatternSet};
use micmute_lib::presentation::{PeripheralMode, PresentationState};
use micmute_lib::reconcile::{LoopConfig, LoopHandle, ReconciliationLoop, Reconciler};
use micmute_lib::sink::{IconKind, IconView, LightingSink, RecordingIconSink};
use micmute_lib::usage::stub::StubUsageStore;
use micmute_lib::usage::UsageProbe;
use micmute_lib::watcher::DeviceMuteWatcher;

fn mic(id: &str, name: &str, muted: bool) -> CaptureDevice {
    CaptureDevice::new(id, name, muted)
}

fn view(kind: IconKind, label: &str) -> IconView {
    IconView {
        kind,
        label: label.to_string(),
    }
}

/// Spawn a manually ticked loop over the given stubs.
fn spawn_loop<L: LightingSdk + Send + 'static>(
    audio: &StubAudio,
    usage: &StubUsageStore,
    sdk: L,
    icon: &RecordingIconSink,
) -> LoopHandle {
    let audio = audio.clone();
    let usage = usage.clone();
    let icon = icon.clone();
    ReconciliationLoop::spawn(LoopConfig::manual(), move |notify| {
        let watcher = DeviceMuteWatcher::new(audio, notify)?;
        Ok(Reconciler::new(
            watcher,
            UsageProbe::new(usage),
            LightingSink::new(sdk, PatternSet::default()),
            icon,
        ))
    })
    .expect("loop starts")
}

// ── End-to-end ──

#[test]
fn end_to_end_in_use_toggle_then_idle() {
    let audio = StubAudio::new(Some(mic("{mic}", "Studio Mic", false)));
    let usage = StubUsageStore::in_use();
    let lighting = StubLighting::new();
    let icon = RecordingIconSink::new();
    let handle = spawn_loop(&audio, &usage, lighting.clone(), &icon);
    let patterns = PatternSet::default();

    // Present, unmuted, in use.
    assert!(handle.tick());
    assert!(handle.flush());
    assert_eq!(icon.last(), Some(view(IconKind::On, "Studio Mic")));
    assert_eq!(lighting.last_pattern(), Some(patterns.unmuted.clone()));
    assert_eq!(handle.snapshot().peripheral_mode, PeripheralMode::Active);

    // Toggle: the device event flows back and re-renders.
    assert!(handle.toggle_mute());
    assert!(handle.flush());
    assert_eq!(icon.last(), Some(view(IconKind::Off, "Studio Mic")));
    assert_eq!(lighting.last_pattern(), Some(patterns.muted.clone()));
    assert_eq!(handle.snapshot().peripheral_mode, PeripheralMode::Active);
    assert!(audio.current().unwrap().muted);

    // Next tick with nobody capturing: connection torn down, icon untouched.
    let renders_before = icon.renders().len();
    usage.set_in_use(false);
    assert!(handle.tick());
    assert!(handle.flush());
    assert_eq!(handle.snapshot().peripheral_mode, PeripheralMode::Uninitialized);
    assert_eq!(lighting.live_connections(), 0);
    assert_eq!(lighting.uninitializes(), 1);
    assert_eq!(icon.renders().len(), renders_before);
    assert_eq!(icon.last(), Some(view(IconKind::Off, "Studio Mic")));

    handle.shutdown();
}

#[test]
fn device_unplugged_shows_error_icon() {
    let audio = StubAudio::new(Some(mic("{mic}", "USB Mic", false)));
    let usage = StubUsageStore::idle();
    let icon = RecordingIconSink::new();
    let handle = spawn_loop(&audio, &usage, StubLighting::new(), &icon);

    audio.set_default(None);
    assert!(handle.flush());
    assert_eq!(icon.last(), Some(view(IconKind::Error, "< No device >")));
    assert!(!handle.snapshot().is_device_present());
    assert_eq!(audio.mute_subscriptions(), 0);

    // Toggling with no device is a silent no-op.
    assert!(handle.toggle_mute());
    assert!(handle.flush());
    assert_eq!(audio.set_muted_calls(), 0);

    handle.shutdown();
}

#[test]
fn lighting_outage_recovers_on_later_tick() {
    let audio = StubAudio::new(Some(mic("{mic}", "Mic", true)));
    let usage = StubUsageStore::in_use();
    let lighting = StubLighting::new();
    lighting.set_fail_connect(true);
    let icon = RecordingIconSink::new();
    let handle = spawn_loop(&audio, &usage, lighting.clone(), &icon);

    assert!(handle.tick());
    assert!(handle.flush());
    assert_eq!(handle.snapshot().peripheral_mode, PeripheralMode::Error);

    lighting.set_fail_connect(false);
    assert!(handle.tick());
    assert!(handle.flush());
    assert_eq!(handle.snapshot().peripheral_mode, PeripheralMode::Active);
    assert_eq!(lighting.last_pattern(), Some(PatternSet::default().muted));

    handle.shutdown();
    assert_eq!(lighting.live_connections(), 0);
}

#[test]
fn lighting_recovers_after_consecutive_failures() {
    let audio = StubAudio::new(Some(mic("{mic}", "Mic", false)));
    let usage = StubUsageStore::in_use();
    let lighting = StubLighting::new();
    lighting.set_fail_connect(true);
    let icon = RecordingIconSink::new();
    let handle = spawn_loop(&audio, &usage, lighting.clone(), &icon);

    for _ in 0..2 {
        assert!(handle.tick());
        assert!(handle.flush());
        assert_eq!(handle.snapshot().peripheral_mode, PeripheralMode::Error);
    }

    lighting.set_fail_connect(false);
    assert!(handle.tick());
    assert!(handle.flush());
    assert_eq!(handle.snapshot().peripheral_mode, PeripheralMode::Active);
    assert_eq!(lighting.last_pattern(), Some(PatternSet::default().unmuted));

    handle.shutdown();
}

// ── Device swap race ──

/// Lighting SDK whose first `create_connection` blocks until released.
struct GatedSdk {
    inner: StubLighting,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl LightingSdk for GatedSdk {
    fn create_connection(&self) -> lighting::Result<Box<dyn LightingConnection>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        self.inner.create_connection()
    }
}

#[test]
fn device_swap_during_tick_renders_latest_device_once() {
    let audio = StubAudio::new(Some(mic("a", "Mic A", false)));
    let usage = StubUsageStore::in_use();
    let lighting = StubLighting::new();
    let icon = RecordingIconSink::new();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let sdk = GatedSdk {
        inner: lighting.clone(),
        gate: Mutex::new(Some((entered_tx, release_rx))),
    };
    let handle = spawn_loop(&audio, &usage, sdk, &icon);

    assert!(handle.tick());
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("tick reached the lighting connect");

    // Ticks are not queued behind the one in flight.
    assert!(!handle.tick());

    // Swap the default device while initialization is pending.
    audio.set_default(Some(mic("b", "Mic B", false)));
    release_tx.send(()).unwrap();
    assert!(handle.flush());

    assert_eq!(
        icon.renders(),
        vec![view(IconKind::On, "Mic A"), view(IconKind::On, "Mic B")]
    );
    let state = handle.snapshot();
    assert_eq!(state.device_name(), Some("Mic B"));
    assert_eq!(state.peripheral_mode, PeripheralMode::Active);
    assert_eq!(audio.mute_subscriptions_for("a"), 0);
    assert_eq!(audio.mute_subscriptions_for("b"), 1);
    assert_eq!(lighting.connects(), 1);

    // The tick is finished, so the next one is accepted again.
    assert!(handle.tick());
    assert!(handle.flush());

    handle.shutdown();
}

// ── Determinism ──

#[derive(Clone)]
enum Step {
    SetDefault(Option<CaptureDevice>),
    SetMuted(bool),
    SetInUse(bool),
    FailConnect(bool),
    FailSend(bool),
    Toggle,
    Tick,
}

struct Replay {
    state: PresentationState,
    renders: Vec<IconView>,
    pushed: Vec<LightingPattern>,
}

fn replay(steps: &[Step]) -> Replay {
    let audio = StubAudio::new(Some(mic("a", "Mic A", false)));
    let usage = StubUsageStore::idle();
    let lighting = StubLighting::new();
    let icon = RecordingIconSink::new();

    // Device events are delivered through a flag the replay drains after
    // every step, the way the loop coalesces them.
    let dirty = Arc::new(Mutex::new(false));
    let d = Arc::clone(&dirty);
    let notify: ChangeCallback = Arc::new(move || *d.lock().unwrap() = true);

    let watcher = DeviceMuteWatcher::new(audio.clone(), notify).unwrap();
    let mut r = Reconciler::new(
        watcher,
        UsageProbe::new(usage.clone()),
        LightingSink::new(lighting.clone(), PatternSet::default()),
        icon.clone(),
    );
    r.handle_device_event();

    for step in steps {
        match step.clone() {
            Step::SetDefault(dev) => audio.set_default(dev),
            Step::SetMuted(m) => audio.set_device_muted(m),
            Step::SetInUse(u) => usage.set_in_use(u),
            Step::FailConnect(f) => lighting.set_fail_connect(f),
            Step::FailSend(f) => lighting.set_fail_send(f),
            Step::Toggle => {
                r.toggle_mute();
            }
            Step::Tick => {
                r.handle_tick();
            }
        }
        let fire = std::mem::take(&mut *dirty.lock().unwrap());
        if fire {
            r.handle_device_event();
        }
    }

    Replay {
        state: r.state().clone(),
        renders: icon.renders(),
        pushed: lighting.pushed(),
    }
}

#[test]
fn replaying_a_sequence_is_deterministic() {
    let steps = vec![
        Step::Tick,
        Step::SetInUse(true),
        Step::Tick,
        Step::Toggle,
        Step::SetDefault(Some(mic("b", "Mic B", true))),
        Step::Tick,
        Step::FailSend(true),
        Step::SetMuted(false),
        Step::Tick,
        Step::FailSend(false),
        Step::FailConnect(true),
        Step::Tick,
        Step::FailConnect(false),
        Step::Tick,
        Step::SetDefault(None),
        Step::Toggle,
        Step::Tick,
        Step::SetInUse(false),
        Step::Tick,
        Step::SetDefault(Some(mic("a", "Mic A", false))),
    ];

    let first = replay(&steps);
    let second = replay(&steps);
    assert_eq!(first.state, second.state);
    assert_eq!(first.renders, second.renders);
    assert_eq!(first.pushed, second.pushed);

    assert_eq!(first.state.device_name(), Some("Mic A"));
    assert_eq!(first.state.peripheral_mode, PeripheralMode::Uninitialized);
}

#[test]
fn rendering_unchanged_state_twice_is_identical() {
    let steps = vec![Step::SetInUse(true), Step::Tick];
    let base = replay(&steps);

    let mut with_dupes = steps.clone();
    with_dupes.push(Step::SetMuted(false));
    with_dupes.push(Step::SetMuted(false));
    let duped = replay(&with_dupes);

    assert_eq!(duped.state, base.state);
    let extra = &duped.renders[base.renders.len()..];
    assert_eq!(extra.len(), 2);
    assert!(extra.iter().all(|v| Some(v) == base.renders.last()));
    let extra_pushes = &duped.pushed[base.pushed.len()..];
    assert!(extra_pushes.iter().all(|p| Some(p) == base.pushed.last()));
}

// ── Hotkey ──

#[test]
fn hotkey_conflict_then_rebind_and_trigger() {
    let audio = StubAudio::new(Some(mic("a", "Mic A", false)));
    let usage = StubUsageStore::idle();
    let icon = RecordingIconSink::new();
    let handle = spawn_loop(&audio, &usage, StubLighting::new(), &icon);

    let table = MemoryRegistrar::new();
    let mut controller = HotkeyToggleController::new(table.clone(), handle.control());
    let x = KeyCombo::parse("Ctrl+Shift+M").unwrap();

    controller.bind(x.clone(), HotkeyAction::ToggleMute).unwrap();
    assert!(matches!(
        controller.bind(x.clone(), HotkeyAction::ToggleMute),
        Err(HotkeyError::AlreadyBound(_))
    ));

    // A second program on the same desktop cannot take it either.
    let mut other = HotkeyToggleController::new(table, handle.control());
    assert!(matches!(
        other.bind(KeyCombo::parse("control+shift+m").unwrap(), HotkeyAction::ToggleMute),
        Err(HotkeyError::AlreadyBound(_))
    ));

    assert!(controller.unbind(&x).unwrap());
    other.bind(x.clone(), HotkeyAction::ToggleMute).unwrap();

    assert!(other.trigger(&x));
    assert!(handle.flush());
    assert_eq!(handle.snapshot().muted(), Some(true));
    assert_eq!(icon.last(), Some(view(IconKind::Off, "Mic A")));

    drop(other);
    drop(controller);
    handle.shutdown();
}

//! Shared tray state and business logic used by both Windows and Linux tray apps.
//!
//! Platform-specific event loops live in `windows.rs` / `linux.rs`.
//! This module provides:
//! - `TrayState` (hotkey binding, persistence, mute toggle)
//! - Menu + tray icon construction (`build_tray_menu`, `build_tray_icon`)
//! - The channel icon sink the reconciliation loop renders into

mod hotkey;
mod icon;
mod menu;

pub use hotkey::GlobalRegistrar;
pub(crate) use menu::{show_notification, show_startup_warnings};
pub use menu::{TrayMenu, apply_view, build_tray_icon, build_tray_menu};

use std::sync::mpsc;

use micmute_lib::hotkey::{
    HotkeyError, HotkeyRegistrar, HotkeyStore, HotkeyToggleController, KeyCombo, MuteToggle,
};
use micmute_lib::sink::{IconSink, IconView};
use micmute_lib::MicmuteError;
use muda::MenuEvent;
use tray_icon::{MouseButton, MouseButtonState, TrayIconEvent};

use crate::hotkey_dialog::{self, HotkeyChoice};

// ── Icon sink ──

/// Forwards rendered icons to the UI thread, which owns the tray icon.
pub struct ChannelIconSink {
    tx: mpsc::Sender<IconView>,
}

impl ChannelIconSink {
    pub fn new(tx: mpsc::Sender<IconView>) -> Self {
        Self { tx }
    }
}

impl IconSink for ChannelIconSink {
    fn render(&mut self, view: &IconView) {
        if self.tx.send(view.clone()).is_err() {
            log::debug!("tray gone, icon update dropped");
        }
    }
}

// ── Shared tray state ──

/// Hotkey binding plus where it is persisted.
pub struct TrayState<R: HotkeyRegistrar, T: MuteToggle, S: HotkeyStore> {
    controller: HotkeyToggleController<R, T>,
    store: S,
}

impl<R: HotkeyRegistrar, T: MuteToggle, S: HotkeyStore> TrayState<R, T, S> {
    /// Bind the persisted hotkey, if any.
    pub fn init(registrar: R, toggle: T, store: S) -> Self {
        let mut controller = HotkeyToggleController::new(registrar, toggle);
        if let Some(combo) = controller.restore(&store) {
            log::info!("restored hotkey {combo}");
        }
        Self { controller, store }
    }

    pub fn hotkey(&self) -> Option<String> {
        self.controller.current().map(|b| b.combo.to_string())
    }

    pub fn toggle(&self) {
        if !self.controller.toggle() {
            log::warn!("toggle request not delivered");
        }
    }

    pub fn on_hotkey_pressed(&self, combo: &KeyCombo) -> bool {
        self.controller.trigger(combo)
    }

    /// Bind or clear as the dialog asked, persisting on success.
    pub fn apply_choice(&mut self, choice: HotkeyChoice) -> micmute_lib::error::Result<()> {
        match choice {
            HotkeyChoice::Set(combo) => self.controller.bind_and_store(combo, &mut self.store),
            HotkeyChoice::Clear => self.controller.clear_and_store(&mut self.store),
        }
    }

    /// Release the OS registration without touching the stored value.
    pub fn release(&mut self) {
        if let Err(e) = self.controller.clear() {
            log::warn!("could not release hotkey: {e}");
        }
    }

    pub fn registrar(&self) -> &R {
        self.controller.registrar()
    }
}

/// Run the hotkey dialog until the user cancels or a choice sticks.
///
/// A refused combination reopens the dialog with the reason shown.
pub fn edit_hotkey<R, T, S>(state: &mut TrayState<R, T, S>, menu: &TrayMenu)
where
    R: HotkeyRegistrar,
    T: MuteToggle,
    S: HotkeyStore,
{
    let mut error: Option<String> = None;
    let mut text = state.hotkey().unwrap_or_default();
    loop {
        let Some(choice) = hotkey_dialog::show_hotkey_dialog(&text, error.take()) else {
            return;
        };
        if let HotkeyChoice::Set(ref combo) = choice {
            text = combo.to_string();
        }
        match state.apply_choice(choice) {
            Ok(()) => {
                menu.set_hotkey_label(state.hotkey().as_deref());
                return;
            }
            Err(MicmuteError::Hotkey(e @ HotkeyError::AlreadyBound(_))) => {
                log::warn!("{e}");
                error = Some(e.to_string());
            }
            Err(e) => {
                log::error!("hotkey change failed: {e}");
                error = Some(e.to_string());
            }
        }
    }
}

/// Handle a menu event from the tray context menu.
///
/// Returns `true` if the event was a quit request.
pub fn handle_menu_event<R, T, S>(
    event: &MenuEvent,
    menu: &TrayMenu,
    state: &mut TrayState<R, T, S>,
) -> bool
where
    R: HotkeyRegistrar,
    T: MuteToggle,
    S: HotkeyStore,
{
    if event.id() == menu.quit_item.id() {
        return true;
    } else if event.id() == menu.toggle_item.id() {
        state.toggle();
    } else if event.id() == menu.hotkey_item.id() {
        edit_hotkey(state, menu);
    }
    false
}

/// Left click on the icon toggles mute.
pub fn is_toggle_click(event: &TrayIconEvent) -> bool {
    matches!(
        event,
        TrayIconEvent::Click {
            button: MouseButton::Left,
            button_state: MouseButtonState::Up,
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use micmute_lib::config::ConfigStore;
    use micmute_lib::hotkey::MemoryRegistrar;
    use micmute_lib::sink::IconKind;

    #[derive(Clone, Default)]
    struct CountingToggle(Arc<AtomicUsize>);

    impl MuteToggle for CountingToggle {
        fn toggle_mute(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn combo(s: &str) -> KeyCombo {
        KeyCombo::parse(s).unwrap()
    }

    #[test]
    fn icon_sink_forwards_views() {
        let (tx, rx) = mpsc::channel();
        let mut sink = ChannelIconSink::new(tx);
        let view = IconView {
            kind: IconKind::Off,
            label: "Mic".into(),
        };
        sink.render(&view);
        assert_eq!(rx.try_recv().unwrap(), view);
    }

    #[test]
    fn icon_sink_survives_closed_channel() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut sink = ChannelIconSink::new(tx);
        sink.render(&IconView {
            kind: IconKind::On,
            label: "Mic".into(),
        });
    }

    #[test]
    fn init_restores_stored_hotkey() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path().join("config.toml"));
        store.store(&combo("Ctrl+Alt+M")).unwrap();

        let registrar = MemoryRegistrar::new();
        let state = TrayState::init(registrar.clone(), CountingToggle::default(), store);
        assert_eq!(state.hotkey().as_deref(), Some("Ctrl+Alt+M"));
        assert!(registrar.is_registered(&combo("Ctrl+Alt+M")));
    }

    #[test]
    fn conflict_keeps_previous_binding_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let registrar = MemoryRegistrar::new();
        let toggle = CountingToggle::default();
        let mut state = TrayState::init(registrar.clone(), toggle.clone(), ConfigStore::new(&path));

        state.apply_choice(HotkeyChoice::Set(combo("Ctrl+Shift+M"))).unwrap();

        // Another program holds Alt+F9.
        let mut other = registrar.clone();
        other.register(&combo("Alt+F9")).unwrap();
        let err = state
            .apply_choice(HotkeyChoice::Set(combo("Alt+F9")))
            .unwrap_err();
        assert!(matches!(
            err,
            MicmuteError::Hotkey(HotkeyError::AlreadyBound(_))
        ));
        assert_eq!(state.hotkey().as_deref(), Some("Ctrl+Shift+M"));
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("Ctrl+Shift+M"));

        assert!(state.on_hotkey_pressed(&combo("Ctrl+Shift+M")));
        assert!(!state.on_hotkey_pressed(&combo("Alt+F9")));
        assert_eq!(toggle.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn saving_the_current_hotkey_again_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let registrar = MemoryRegistrar::new();
        let toggle = CountingToggle::default();
        let mut state = TrayState::init(registrar.clone(), toggle.clone(), ConfigStore::new(&path));

        state.apply_choice(HotkeyChoice::Set(combo("Ctrl+Alt+M"))).unwrap();
        state.apply_choice(HotkeyChoice::Set(combo("Ctrl+Alt+M"))).unwrap();

        assert_eq!(state.hotkey().as_deref(), Some("Ctrl+Alt+M"));
        assert!(registrar.is_registered(&combo("Ctrl+Alt+M")));
        assert!(std::fs::read_to_string(&path).unwrap().contains("Ctrl+Alt+M"));
        assert!(state.on_hotkey_pressed(&combo("Ctrl+Alt+M")));
        assert_eq!(toggle.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_removes_binding_and_stored_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let registrar = MemoryRegistrar::new();
        let mut state = TrayState::init(
            registrar.clone(),
            CountingToggle::default(),
            ConfigStore::new(&path),
        );
        state.apply_choice(HotkeyChoice::Set(combo("F9"))).unwrap();
        state.apply_choice(HotkeyChoice::Clear).unwrap();
        assert_eq!(state.hotkey(), None);
        assert!(registrar.is_empty());
        assert!(!std::fs::read_to_string(&path).unwrap().contains("hotkey"));
    }

    #[test]
    fn release_keeps_stored_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let registrar = MemoryRegistrar::new();
        let mut state = TrayState::init(
            registrar.clone(),
            CountingToggle::default(),
            ConfigStore::new(&path),
        );
        state.apply_choice(HotkeyChoice::Set(combo("F9"))).unwrap();
        state.release();
        assert!(registrar.is_empty());
        assert!(std::fs::read_to_string(&path).unwrap().contains("F9"));
    }
}

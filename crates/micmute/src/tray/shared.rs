//! Shared tray event loop. Platform-specific behavior is injected via the
//! [`PlatformAdapter`] trait.

use std::sync::atomic::Ordering;
use std::sync::mpsc;

use global_hotkey::{GlobalHotKeyEvent, HotKeyState};
use micmute_lib::config::{Config, ConfigStore};
use micmute_lib::reconcile;
use micmute_lib::sink::IconView;
use micmute_lib::usage;
use muda::MenuEvent;
use tray_icon::TrayIconEvent;

use super::state::{self, ChannelIconSink, GlobalRegistrar, TrayState};
use crate::RUNNING;

/// Platform-specific hooks that differ between Windows and Linux.
pub trait PlatformAdapter {
    /// One-time platform init (GTK etc.). Called before anything else.
    fn platform_init() -> micmute_lib::error::Result<()>;

    /// Pump platform-specific events (Win32 messages, GTK iterations).
    fn pump_events();

    /// Block until the next platform event or a reasonable timeout.
    fn wait_for_events();
}

/// Shared tray event loop.
///
/// Loads config, starts the reconciliation loop, builds the menu and icon,
/// binds the stored hotkey, then routes UI events until Quit.
pub fn run_core<P: PlatformAdapter>() -> micmute_lib::error::Result<()> {
    P::platform_init()?;

    let (config, warnings) = Config::load_with_warnings();
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    state::show_startup_warnings(&warnings);
    if let Err(errs) = config.validate() {
        for e in &errs {
            log::warn!("[config] {e}");
        }
    }

    // The loop renders its initial state before `spawn_platform` returns,
    // so the first view is already queued.
    let (icon_tx, icon_rx) = mpsc::channel::<IconView>();
    let handle = reconcile::spawn_platform(
        &config,
        usage::platform_store(),
        ChannelIconSink::new(icon_tx),
    )?;
    let mut view = IconView::from_state(&handle.snapshot());
    while let Ok(v) = icon_rx.try_recv() {
        view = v;
    }

    let store = ConfigStore::platform().ok_or_else(|| {
        micmute_lib::MicmuteError::Config("no config directory available".into())
    })?;
    let mut tray_state = TrayState::init(GlobalRegistrar::new()?, handle.control(), store);

    let (menu, tray_menu) = state::build_tray_menu(&view, tray_state.hotkey().as_deref());
    let tray = state::build_tray_icon(&view, menu)?;

    let menu_rx = MenuEvent::receiver();
    let hotkey_rx = GlobalHotKeyEvent::receiver();
    let tray_rx = TrayIconEvent::receiver();

    while RUNNING.load(Ordering::SeqCst) {
        // 1. Platform event pump
        P::pump_events();

        // 2. Icon updates from the reconciliation loop
        while let Ok(v) = icon_rx.try_recv() {
            state::apply_view(&v, &tray, &tray_menu);
        }

        // 3. Menu events
        while let Ok(event) = menu_rx.try_recv() {
            if state::handle_menu_event(&event, &tray_menu, &mut tray_state) {
                RUNNING.store(false, Ordering::SeqCst);
                break;
            }
        }

        // 4. Left click on the icon
        while let Ok(event) = tray_rx.try_recv() {
            if state::is_toggle_click(&event) {
                tray_state.toggle();
            }
        }

        // 5. Hotkey presses
        while let Ok(event) = hotkey_rx.try_recv() {
            if event.state != HotKeyState::Pressed {
                continue;
            }
            let combo = tray_state.registrar().combo_for_id(event.id).cloned();
            if let Some(combo) = combo {
                tray_state.on_hotkey_pressed(&combo);
            }
        }

        // 6. Wait for events (platform-specific sleep/block)
        P::wait_for_events();
    }

    tray_state.release();
    drop(tray_state);
    handle.shutdown();
    drop(tray);
    Ok(())
}

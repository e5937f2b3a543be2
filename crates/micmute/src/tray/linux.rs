//! Linux system tray: GTK event loop.

use super::shared::{self, PlatformAdapter};

/// Detect if running under Wayland (global hotkeys may not work).
fn is_wayland() -> bool {
    std::env::var("XDG_SESSION_TYPE")
        .map(|v| v.eq_ignore_ascii_case("wayland"))
        .unwrap_or(false)
}

pub struct LinuxAdapter;

impl PlatformAdapter for LinuxAdapter {
    fn platform_init() -> micmute_lib::error::Result<()> {
        gtk::init().map_err(|e| {
            micmute_lib::MicmuteError::Config(format!("Failed to initialize GTK: {e}"))
        })?;
        // Periodic wakeup so `gtk::main_iteration_do(true)` returns at least
        // every 50ms, keeping the event loop responsive to non-GTK events
        // (icon updates, menu events, hotkeys).
        gtk::glib::timeout_add_local(std::time::Duration::from_millis(50), || {
            gtk::glib::ControlFlow::Continue
        });
        if is_wayland() {
            log::warn!(
                "Global hotkey may not work on Wayland. \
                 Click the tray icon to toggle mute."
            );
        }
        Ok(())
    }

    fn pump_events() {
        while gtk::events_pending() {
            gtk::main_iteration_do(false);
        }
    }

    fn wait_for_events() {
        // The 50ms timer registered in platform_init() bounds this wait.
        gtk::main_iteration_do(true);
    }
}

pub fn run() -> micmute_lib::error::Result<()> {
    shared::run_core::<LinuxAdapter>()
}

//! Tray menu construction, notifications, and icon updates.

use micmute_lib::sink::{IconKind, IconView};
use muda::{Menu, MenuItem, PredefinedMenuItem};

use super::icon::tray_icon_for;

pub(crate) const APP_NAME: &str = "MicMute";

// ── Menu construction ──

/// All menu items the tray uses, returned from `build_tray_menu`.
pub struct TrayMenu {
    pub status_item: MenuItem,
    pub toggle_item: MenuItem,
    pub hotkey_item: MenuItem,
    pub quit_item: MenuItem,
}

impl TrayMenu {
    pub fn set_hotkey_label(&self, hotkey: Option<&str>) {
        self.toggle_item.set_text(toggle_label(hotkey));
    }
}

fn toggle_label(hotkey: Option<&str>) -> String {
    match hotkey {
        Some(h) => format!("Toggle Mute\t{h}"),
        None => "Toggle Mute".to_string(),
    }
}

/// Status line shown at the top of the menu.
pub(crate) fn status_text(view: &IconView) -> String {
    match view.kind {
        IconKind::On => format!("Live: {}", view.label),
        IconKind::Off => format!("Muted: {}", view.label),
        IconKind::Error => view.label.clone(),
    }
}

/// Hover text for the tray icon: the device name or the no-device label.
pub(crate) fn tooltip(view: &IconView) -> String {
    view.label.clone()
}

pub fn build_tray_menu(view: &IconView, hotkey: Option<&str>) -> (Menu, TrayMenu) {
    let menu = Menu::new();
    let status_item = MenuItem::new(status_text(view), false, None);
    let toggle_item = MenuItem::new(toggle_label(hotkey), view.kind != IconKind::Error, None);
    let hotkey_item = MenuItem::new("Hotkey...", true, None);
    let quit_item = MenuItem::new("Quit", true, None);

    let _ = menu.append(&status_item);
    let _ = menu.append(&PredefinedMenuItem::separator());
    let _ = menu.append(&toggle_item);
    let _ = menu.append(&hotkey_item);
    let _ = menu.append(&PredefinedMenuItem::separator());
    let _ = menu.append(&quit_item);

    (
        menu,
        TrayMenu {
            status_item,
            toggle_item,
            hotkey_item,
            quit_item,
        },
    )
}

/// Build the tray icon showing `view`.
///
/// The menu opens on right click only; left click is reserved for toggling.
pub fn build_tray_icon(view: &IconView, menu: Menu) -> micmute_lib::error::Result<tray_icon::TrayIcon> {
    let mut builder = tray_icon::TrayIconBuilder::new()
        .with_tooltip(tooltip(view))
        .with_menu(Box::new(menu))
        .with_menu_on_left_click(false);
    if let Some(icon) = tray_icon_for(view.kind) {
        builder = builder.with_icon(icon);
    }
    builder.build().map_err(|e| {
        micmute_lib::MicmuteError::Config(format!("Failed to create tray icon: {e}"))
    })
}

/// Show config warnings as a desktop notification.
pub(crate) fn show_startup_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    let body = warnings.join("\n");
    show_notification(&format!("Config warnings:\n{body}"));
}

/// Show a desktop notification with the given body text.
pub(crate) fn show_notification(body: &str) {
    let mut n = notify_rust::Notification::new();
    n.summary(APP_NAME);
    n.body(body);
    if let Err(e) = n.show() {
        log::debug!("notification failed: {e}");
    }
}

/// Bring the tray icon and menu in line with `view`.
pub fn apply_view(view: &IconView, tray: &tray_icon::TrayIcon, menu: &TrayMenu) {
    if let Some(icon) = tray_icon_for(view.kind) {
        if let Err(e) = tray.set_icon(Some(icon)) {
            log::warn!("could not update tray icon: {e}");
        }
    }
    if let Err(e) = tray.set_tooltip(Some(tooltip(view))) {
        log::warn!("could not update tooltip: {e}");
    }
    menu.status_item.set_text(status_text(view));
    menu.toggle_item.set_enabled(view.kind != IconKind::Error);
}

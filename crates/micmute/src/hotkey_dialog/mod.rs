//! Hotkey dialog: small egui window for choosing the toggle hotkey.
//!
//! Returns `Some(choice)` on Save or Clear, `None` on Cancel/close.

use micmute_lib::hotkey::KeyCombo;

mod ui;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyChoice {
    Set(KeyCombo),
    Clear,
}

/// Turn the text field into a choice. Blank text means "no hotkey".
pub(crate) fn parse_input(text: &str) -> Result<HotkeyChoice, String> {
    if text.trim().is_empty() {
        return Ok(HotkeyChoice::Clear);
    }
    KeyCombo::parse(text)
        .map(HotkeyChoice::Set)
        .map_err(|e| e.to_string())
}

/// Show the hotkey dialog, prefilled with `current` and an optional error
/// from a previous attempt.
///
/// This is modal and blocks the calling thread until the dialog is closed.
///
/// Must be called from the main thread (eframe/winit requirement).
pub fn show_hotkey_dialog(current: &str, error: Option<String>) -> Option<HotkeyChoice> {
    use std::sync::{Arc, Mutex};

    let result: Arc<Mutex<Option<HotkeyChoice>>> = Arc::new(Mutex::new(None));
    let result_for_app = result.clone();
    let text = current.to_string();

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([360.0, 170.0])
            .with_resizable(false)
            .with_title("MicMute Hotkey")
            .with_icon(crate::icon::app_icon()),
        ..Default::default()
    };
    if let Err(e) = eframe::run_native(
        "MicMute Hotkey",
        options,
        Box::new(move |cc| Ok(Box::new(ui::HotkeyApp::new(text, error, result_for_app, cc)))),
    ) {
        log::error!("hotkey dialog failed: {e}");
    }

    // Extract result after run_native returns (window closed)
    result.lock().ok().and_then(|mut guard| guard.take())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_means_clear() {
        assert_eq!(parse_input("   "), Ok(HotkeyChoice::Clear));
    }

    #[test]
    fn valid_text_is_normalized() {
        assert_eq!(
            parse_input("shift+ctrl+m"),
            Ok(HotkeyChoice::Set(KeyCombo::new("Ctrl+Shift+M")))
        );
    }

    #[test]
    fn invalid_text_reports_reason() {
        let err = parse_input("Ctrl+").unwrap_err();
        assert!(err.starts_with("Invalid hotkey"), "{err}");
    }
}

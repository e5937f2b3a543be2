//! MicMute: tray indicator and hotkey toggle for the default microphone.
//!
//! GUI subsystem: double-click from Explorer launches the system tray.
//! If run from a terminal with arguments, redirects the user to micmute-cli.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

#[cfg(any(windows, target_os = "linux"))]
mod hotkey_dialog;
#[cfg(any(windows, target_os = "linux"))]
mod icon;
#[cfg(any(windows, target_os = "linux"))]
mod tray;

#[cfg(any(windows, target_os = "linux"))]
use std::sync::atomic::AtomicBool;

/// Shared shutdown flag, set by tray quit.
#[cfg(any(windows, target_os = "linux"))]
pub static RUNNING: AtomicBool = AtomicBool::new(true);

/// Check if we were launched from an interactive console (PowerShell, cmd, etc.).
#[cfg(windows)]
fn has_parent_console() -> bool {
    use windows::Win32::System::Console::{ATTACH_PARENT_PROCESS, AttachConsole, FreeConsole};

    unsafe {
        if AttachConsole(ATTACH_PARENT_PROCESS).is_ok() {
            // We successfully attached, so there's a parent console.
            // Detach immediately since this is the tray binary.
            let _ = FreeConsole();
            true
        } else {
            false
        }
    }
}

/// Initialize the tray app logger, directing output to `micmute.log` in the
/// config directory. Returns the log path when the file could be opened;
/// otherwise output stays on stderr.
fn init_tray_logger() -> Option<std::path::PathBuf> {
    use micmute_lib::config::Config;

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_target(false);

    let log_file = Config::log_path().and_then(|path| {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).ok()?;
        }
        let file = std::fs::File::create(&path).ok()?;
        Some((path, file))
    });
    let path = log_file.map(|(path, file)| {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        path
    });

    builder.init();
    path
}

fn main() {
    let log_path = init_tray_logger();
    log::info!(
        "MicMute {} starting (log: {})",
        env!("CARGO_PKG_VERSION"),
        log_path
            .as_deref()
            .map_or_else(|| "stderr".to_string(), |p| p.display().to_string())
    );

    #[cfg(not(any(windows, target_os = "linux")))]
    {
        eprintln!("The tray app is only available on Windows and Linux.");
        eprintln!("Use micmute-cli for command-line usage.");
        std::process::exit(1);
    }

    #[cfg(windows)]
    {
        let args: Vec<String> = std::env::args().collect();

        // If launched with CLI arguments from a terminal, redirect to micmute-cli
        if args.len() > 1 && has_parent_console() {
            eprintln!("Hint: Use micmute-cli.exe for command-line usage.");
            eprintln!("  Example: micmute-cli.exe {}", args[1..].join(" "));
            return;
        }
    }

    #[cfg(any(windows, target_os = "linux"))]
    {
        if let Err(e) = tray::run() {
            let msg = format!("Error: {e}");
            eprintln!("{msg}");
            show_fatal_error(&msg);
            std::process::exit(1);
        }
    }
}

/// Show a fatal error to the user. The tray binary usually has no console,
/// so Windows gets a MessageBox and Linux a desktop notification.
#[cfg(windows)]
fn show_fatal_error(msg: &str) {
    use windows::Win32::UI::WindowsAndMessaging::{MB_ICONERROR, MB_OK, MessageBoxW};
    use windows::core::PCWSTR;

    let wide_msg: Vec<u16> = msg.encode_utf16().chain(std::iter::once(0)).collect();
    let title: Vec<u16> = "MicMute"
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    unsafe {
        let _ = MessageBoxW(
            None,
            PCWSTR(wide_msg.as_ptr()),
            PCWSTR(title.as_ptr()),
            MB_ICONERROR | MB_OK,
        );
    }
}

#[cfg(target_os = "linux")]
fn show_fatal_error(msg: &str) {
    tray::state::show_notification(msg);
}

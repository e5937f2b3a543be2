//! `watch` subcommand: run the indicator headless until Ctrl+C.
//!
//! Icon changes are printed to stdout; keyboard lighting follows the mute
//! state unless disabled.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{RUNNING, Result, load_config, usage};
use micmute_lib::reconcile;
use micmute_lib::sink::{IconKind, IconSink, IconView};
use micmute_lib::usage::{JsonUsageStore, UsageStore};

/// Prints each rendered icon as one line.
struct StdoutIconSink;

fn icon_line(view: &IconView) -> String {
    let kind = match view.kind {
        IconKind::On => "on",
        IconKind::Off => "off",
        IconKind::Error => "error",
    };
    format!("[{kind:<5}] {}", view.label)
}

impl IconSink for StdoutIconSink {
    fn render(&mut self, view: &IconView) {
        println!("{}", icon_line(view));
    }
}

pub(super) fn cmd_watch(
    config_path: Option<&Path>,
    usage_file: Option<&Path>,
    no_lighting: bool,
) -> Result<()> {
    let mut config = load_config(config_path);
    if no_lighting {
        config.lighting_enabled = false;
    }

    let store: Box<dyn UsageStore + Send> = match usage_file {
        Some(p) => Box::new(JsonUsageStore::new(p)),
        None => usage::platform_store(),
    };

    let handle = reconcile::spawn_platform(&config, store, StdoutIconSink)?;
    eprintln!("Watching the default microphone. Press Ctrl+C to stop.");

    while RUNNING.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    let last = handle.snapshot();
    handle.shutdown();
    log::info!(
        "stopped (device: {}, lighting: {})",
        last.device_name().unwrap_or("none"),
        last.peripheral_mode
    );
    Ok(())
}

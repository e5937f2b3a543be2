//! `toggle`, `mute` and `unmute` subcommands.

use super::{MuteOutput, Result, audio, kv, kv_width, print_json};
use micmute_lib::audio::AudioBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MuteAction {
    Toggle,
    Mute,
    Unmute,
}

impl MuteAction {
    /// Target mute state given the current one.
    fn target(self, current: bool) -> bool {
        match self {
            MuteAction::Toggle => !current,
            MuteAction::Mute => true,
            MuteAction::Unmute => false,
        }
    }
}

/// Apply `action` to the default device of `backend`.
fn apply(backend: &impl AudioBackend, action: MuteAction) -> Result<MuteOutput> {
    let Some(device) = backend.default_capture_device()? else {
        return Ok(MuteOutput {
            device: None,
            muted: None,
            changed: false,
        });
    };
    let target = action.target(device.muted);
    let changed = target != device.muted;
    if changed {
        backend.set_muted(&device, target)?;
        log::debug!("{}: muted {} -> {target}", device.name, device.muted);
    }
    Ok(MuteOutput {
        device: Some(device.name),
        muted: Some(target),
        changed,
    })
}

pub(super) fn cmd_set_mute(action: MuteAction, json: bool) -> Result<()> {
    let backend = audio::open_platform_backend()?;
    let output = apply(&backend, action)?;

    if json {
        return print_json(&output);
    }
    match (&output.device, output.muted) {
        (Some(name), Some(muted)) => {
            let w = kv_width(&["Device:", "Muted:"], &[]);
            kv("Device:", name, w);
            kv("Muted:", if muted { "yes" } else { "no" }, w);
            if !output.changed {
                println!("(already {})", if muted { "muted" } else { "unmuted" });
            }
        }
        _ => println!("No default capture device; nothing to do."),
    }
    Ok(())
}

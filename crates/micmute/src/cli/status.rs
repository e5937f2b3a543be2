//! `status` subcommand: show microphone, usage and settings status.

use std::path::Path;

use super::{
    MicrophoneJson, Result, StatusOutput, UsageJson, audio, kv, kv_indent, kv_width, load_config,
    print_json, usage,
};
use micmute_lib::usage::{UsageProbe, UsageStatus};

/// Query the default capture device. `None` when there is no device or no
/// usable backend; the reason is logged.
fn get_microphone() -> Option<MicrophoneJson> {
    let backend = match audio::open_platform_backend() {
        Ok(b) => b,
        Err(e) => {
            log::info!("audio backend unavailable: {e}");
            return None;
        }
    };
    match backend.default_capture_device() {
        Ok(dev) => dev.map(|d| MicrophoneJson {
            id: d.id,
            name: d.name,
            muted: d.muted,
        }),
        Err(e) => {
            log::warn!("could not read default capture device: {e}");
            None
        }
    }
}

pub(super) fn usage_json(status: UsageStatus, source: String, consumers: Vec<String>) -> UsageJson {
    UsageJson {
        status: match status {
            UsageStatus::InUse => "in_use",
            UsageStatus::NotInUse => "not_in_use",
        },
        in_use: status.is_in_use(),
        source,
        consumers,
    }
}

fn platform_usage_source() -> &'static str {
    if cfg!(windows) { "registry" } else { "none" }
}

pub(super) fn cmd_status(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let microphone = get_microphone();
    let probe = UsageProbe::new(usage::platform_store());
    let status = probe.probe();
    let consumers = probe.active_consumers();

    if json {
        let output = StatusOutput {
            version: env!("CARGO_PKG_VERSION").to_string(),
            audio_backend: audio::platform_backend_name().map(str::to_string),
            microphone,
            usage: usage_json(status, platform_usage_source().to_string(), consumers),
            hotkey: config.hotkey.clone(),
            lighting_enabled: config.lighting_enabled,
        };
        return print_json(&output);
    }

    let w = kv_width(
        &["Microphone:", "Usage:", "Hotkey:", "Lighting:", "Backend:"],
        &["Name:", "Muted:", "Consumer:"],
    );
    kv(
        "Backend:",
        audio::platform_backend_name().unwrap_or("none"),
        w,
    );
    match &microphone {
        Some(mic) => {
            kv("Microphone:", "present", w);
            kv_indent("Name:", &mic.name, w);
            kv_indent("Muted:", if mic.muted { "yes" } else { "no" }, w);
        }
        None => kv("Microphone:", micmute_lib::sink::NO_DEVICE_LABEL, w),
    }
    kv("Usage:", status, w);
    for c in &consumers {
        kv_indent("Consumer:", c, w);
    }
    kv("Hotkey:", config.hotkey.as_deref().unwrap_or("(none)"), w);
    kv(
        "Lighting:",
        if config.lighting_enabled {
            format!("enabled ({})", config.chroma_url)
        } else {
            "disabled".to_string()
        },
        w,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_json_in_use() {
        let u = usage_json(UsageStatus::InUse, "file".into(), vec!["app".into()]);
        assert_eq!(u.status, "in_use");
        assert!(u.in_use);
        assert_eq!(u.consumers, vec!["app".to_string()]);
    }

    #[test]
    fn usage_json_not_in_use() {
        let u = usage_json(UsageStatus::NotInUse, "none".into(), vec![]);
        assert_eq!(u.status, "not_in_use");
        assert!(!u.in_use);
    }
}
